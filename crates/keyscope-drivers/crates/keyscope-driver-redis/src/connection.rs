//! Shared Redis connection implementing `CommandExecutor`

use crate::{RedisClientConfig, RedisWireClient};
use async_trait::async_trait;
use keyscope_core::{CommandExecutor, KeyscopeError, RespValue, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// Redis connection wrapper shared between jobs.
///
/// Callers are queued on an async mutex, so exactly one command is on the
/// wire at any time even when several jobs (or a discovery job's metadata
/// fan-out) use the connection concurrently.
pub struct RedisConnection {
    client: Mutex<RedisWireClient>,
    database: u16,
    closed: AtomicBool,
}

impl RedisConnection {
    /// Open and authenticate a new connection
    pub async fn connect(config: &RedisClientConfig) -> Result<Self> {
        let client = RedisWireClient::connect(config).await?;
        Ok(Self::new(client, config.database))
    }

    /// Wrap an already connected client
    pub fn new(client: RedisWireClient, database: u16) -> Self {
        Self {
            client: Mutex::new(client),
            database,
            closed: AtomicBool::new(false),
        }
    }

    /// Selected logical database
    pub fn database(&self) -> u16 {
        self.database
    }

    /// Drop the socket; later commands fail with `CONNECTION_CLOSED`
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.client.lock().await.close();
    }
}

#[async_trait]
impl CommandExecutor for RedisConnection {
    async fn execute(&self, parts: &[Vec<u8>]) -> Result<RespValue> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(KeyscopeError::ConnectionClosed);
        }

        let command = parts
            .first()
            .map(|c| String::from_utf8_lossy(c).to_ascii_uppercase())
            .unwrap_or_default();
        let start = std::time::Instant::now();

        let mut client = self.client.lock().await;
        let result = client.execute(parts).await;
        if client.is_closed() {
            self.closed.store(true, Ordering::SeqCst);
        }
        drop(client);

        // Only the command name is logged; arguments may hold key names or values
        match &result {
            Ok(reply) => tracing::debug!(
                command = %command,
                reply = reply.kind(),
                duration_ms = start.elapsed().as_millis() as u64,
                "command completed"
            ),
            Err(e) => tracing::debug!(
                command = %command,
                error_code = e.code(),
                duration_ms = start.elapsed().as_millis() as u64,
                "command failed"
            ),
        }

        result
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{self, reply};
    use keyscope_core::command;
    use std::sync::Arc;
    use std::time::Duration;

    async fn connect(port: u16) -> RedisConnection {
        let mut config = RedisClientConfig::new("127.0.0.1", port);
        config.command_timeout = Duration::from_secs(2);
        RedisConnection::connect(&config).await.unwrap()
    }

    #[tokio::test]
    async fn test_concurrent_callers_are_serialized() {
        let (port, server) = test_server::spawn(vec![
            reply(b"+PONG\r\n"),
            reply(b"$1\r\na\r\n"),
            reply(b"$1\r\nb\r\n"),
        ])
        .await;

        let conn = Arc::new(connect(port).await);
        let get_x = command(["GET", "x"]);
        let get_y = command(["GET", "y"]);
        let (first, second) = tokio::join!(conn.execute(&get_x), conn.execute(&get_y));

        let mut replies = vec![
            first.unwrap().into_text().unwrap(),
            second.unwrap().into_text().unwrap(),
        ];
        replies.sort();
        assert_eq!(replies, vec!["a", "b"]);

        drop(conn);
        assert_eq!(server.await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_close_marks_connection_closed() {
        let (port, _server) = test_server::spawn(vec![reply(b"+PONG\r\n")]).await;

        let conn = connect(port).await;
        conn.close().await;

        assert!(conn.is_closed());
        let err = conn.execute(&command(["PING"])).await.unwrap_err();
        assert_eq!(err.code(), "CONNECTION_CLOSED");
    }

    #[tokio::test]
    async fn test_timeout_closes_shared_connection() {
        let (port, _server) =
            test_server::spawn(vec![reply(b"+PONG\r\n"), test_server::Reply::Silent]).await;

        let mut config = RedisClientConfig::new("127.0.0.1", port);
        config.command_timeout = Duration::from_millis(100);
        let conn = RedisConnection::connect(&config).await.unwrap();

        let err = conn.execute(&command(["GET", "k"])).await;
        assert_eq!(err.unwrap_err().code(), "TIMEOUT");
        assert!(conn.is_closed());
    }
}
