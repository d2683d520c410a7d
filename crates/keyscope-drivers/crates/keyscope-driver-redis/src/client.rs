//! Single-connection Redis client

use crate::resp;
use crate::tls::RedisTlsConnector;
use keyscope_core::{
    ConnectionSettings, FramedStream, KeyscopeError, RespValue, Result, TlsConfig, connect_tcp,
};
use std::time::{Duration, Instant};

/// Default Redis port
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Everything needed to open and authenticate a Redis connection
#[derive(Clone)]
pub struct RedisClientConfig {
    pub host: String,
    pub port: u16,
    /// ACL user name; only sent together with a password
    pub username: Option<String>,
    pub password: Option<String>,
    /// Logical database selected after the handshake (0 = leave as is)
    pub database: u16,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub tls: TlsConfig,
}

impl Default for RedisClientConfig {
    fn default() -> Self {
        let timeouts = ConnectionSettings::default();
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_REDIS_PORT,
            username: None,
            password: None,
            database: 0,
            connect_timeout: timeouts.connect_timeout(),
            command_timeout: timeouts.command_timeout(),
            tls: TlsConfig::default(),
        }
    }
}

impl RedisClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_database(mut self, database: u16) -> Self {
        self.database = database;
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// Apply timeouts from the loaded configuration
    pub fn with_timeouts(mut self, settings: &ConnectionSettings) -> Self {
        self.connect_timeout = settings.connect_timeout();
        self.command_timeout = settings.command_timeout();
        self
    }
}

// Credentials must never end up in logs
impl std::fmt::Debug for RedisClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisClientConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("connect_timeout", &self.connect_timeout)
            .field("command_timeout", &self.command_timeout)
            .field("tls", &self.tls.mode)
            .finish()
    }
}

/// An open, authenticated Redis socket.
///
/// Commands run strictly one at a time: `execute` takes `&mut self` and
/// reads the complete reply before returning. If a caller abandons a command
/// halfway (drops the future), the reply may still be on the wire, so every
/// later command fails with `CONNECTION_BUSY` and the client has to be
/// replaced. A command timeout destroys the socket outright.
#[derive(Debug)]
pub struct RedisWireClient {
    stream: Option<FramedStream>,
    in_flight: bool,
    command_timeout: Duration,
}

impl RedisWireClient {
    /// Connect, authenticate and verify the server with `PING`.
    ///
    /// TCP connect plus TLS handshake are bounded by `connect_timeout`; the
    /// handshake commands by `command_timeout`. On any failure the socket is
    /// dropped and nothing is retried.
    #[tracing::instrument(skip(config), fields(host = %config.host, port = config.port, tls = config.tls.is_enabled()))]
    pub async fn connect(config: &RedisClientConfig) -> Result<Self> {
        tracing::debug!("connecting to Redis");
        let start = Instant::now();

        let stream = match tokio::time::timeout(config.connect_timeout, open_stream(config)).await
        {
            Ok(stream) => stream?,
            Err(_) => {
                return Err(KeyscopeError::Timeout(format!(
                    "connecting to {}:{} took longer than {}ms",
                    config.host,
                    config.port,
                    config.connect_timeout.as_millis()
                )));
            }
        };

        let mut client = Self {
            stream: Some(stream),
            in_flight: false,
            command_timeout: config.command_timeout,
        };
        client.handshake(config).await?;

        tracing::debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            "Redis connection verified with PING"
        );
        Ok(client)
    }

    async fn handshake(&mut self, config: &RedisClientConfig) -> Result<()> {
        if let Some(password) = &config.password {
            let mut auth = vec!["AUTH".to_string()];
            if let Some(username) = &config.username {
                auth.push(username.clone());
            }
            auth.push(password.clone());

            if let RespValue::Error(message) = self.execute(&auth).await? {
                return Err(KeyscopeError::AuthFailed(message));
            }
        }

        match self.execute(&["PING"]).await? {
            RespValue::SimpleString(s) if s == "PONG" => {}
            RespValue::Error(message) if is_auth_error(&message) => {
                return Err(KeyscopeError::AuthFailed(message));
            }
            other => {
                return Err(KeyscopeError::invalid_response(
                    "PING",
                    format!("expected PONG, got {}", other),
                ));
            }
        }

        if config.database != 0 {
            let select = ["SELECT".to_string(), config.database.to_string()];
            if let RespValue::Error(message) = self.execute(&select).await? {
                return Err(KeyscopeError::CommandFailed(message));
            }
        }

        Ok(())
    }

    /// Send one command and decode exactly one reply.
    ///
    /// A server error reply comes back as `RespValue::Error`; `Err` means the
    /// exchange itself failed, in which case the socket has been discarded.
    pub async fn execute<S: AsRef<[u8]>>(&mut self, parts: &[S]) -> Result<RespValue> {
        if parts.is_empty() {
            return Err(KeyscopeError::CommandFailed("empty command".to_string()));
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(KeyscopeError::ConnectionClosed);
        };
        if self.in_flight {
            return Err(KeyscopeError::ConnectionBusy);
        }

        self.in_flight = true;
        let timeout = self.command_timeout;
        let request = resp::encode_command(parts);

        let exchange = async {
            stream.write_all(&request).await?;
            stream.read_frame(resp::parse).await
        };
        let result = match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(KeyscopeError::Timeout(format!(
                "no reply within {}ms",
                timeout.as_millis()
            ))),
        };

        match result {
            Ok(value) => {
                self.in_flight = false;
                Ok(value)
            }
            Err(e) => {
                // The stream position is unknown after a failed exchange
                tracing::debug!(error_code = e.code(), "discarding Redis socket");
                self.destroy();
                Err(e)
            }
        }
    }

    /// Drop the socket without sending anything
    pub fn close(&mut self) {
        if self.stream.is_some() {
            tracing::debug!("Redis connection closed");
        }
        self.destroy();
    }

    /// True once the socket has been closed or destroyed
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    /// True while a command's reply has not been fully read
    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    fn destroy(&mut self) {
        self.stream = None;
        self.in_flight = false;
    }
}

async fn open_stream(config: &RedisClientConfig) -> Result<FramedStream> {
    let tcp = connect_tcp(&config.host, config.port, config.connect_timeout).await?;

    if !config.tls.is_enabled() {
        return Ok(FramedStream::new(tcp, config.command_timeout));
    }

    let tls = RedisTlsConnector::handshake(tcp, &config.host, &config.tls).await?;
    Ok(FramedStream::new(tls, config.command_timeout))
}

fn is_auth_error(message: &str) -> bool {
    message.starts_with("NOAUTH") || message.starts_with("WRONGPASS")
}
