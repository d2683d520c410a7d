//! Memcached ASCII protocol client

use crate::keys::validate_key;
use keyscope_core::{ConnectionSettings, FramedStream, KeyscopeError, Result, connect_tcp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Default Memcached port
pub const DEFAULT_MEMCACHED_PORT: u16 = 11211;

/// Largest value accepted in a `VALUE` header
const MAX_VALUE_BYTES: usize = 1024 * 1024 * 1024;

/// Authentication mode
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum MemcachedAuth {
    #[default]
    None,
    /// SASL needs the binary protocol, which this client does not speak
    Sasl { username: String, password: String },
}

impl std::fmt::Debug for MemcachedAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemcachedAuth::None => write!(f, "None"),
            MemcachedAuth::Sasl { username, .. } => f
                .debug_struct("Sasl")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

/// Connection settings for one Memcached server
#[derive(Debug, Clone)]
pub struct MemcachedConfig {
    pub host: String,
    pub port: u16,
    pub auth: MemcachedAuth,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

impl Default for MemcachedConfig {
    fn default() -> Self {
        let timeouts = ConnectionSettings::default();
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_MEMCACHED_PORT,
            auth: MemcachedAuth::None,
            connect_timeout: timeouts.connect_timeout(),
            command_timeout: timeouts.command_timeout(),
        }
    }
}

impl MemcachedConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_auth(mut self, auth: MemcachedAuth) -> Self {
        self.auth = auth;
        self
    }

    /// Apply timeouts from the loaded configuration
    pub fn with_timeouts(mut self, settings: &ConnectionSettings) -> Self {
        self.connect_timeout = settings.connect_timeout();
        self.command_timeout = settings.command_timeout();
        self
    }
}

/// A cached item returned by `get`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemcachedItem {
    pub key: String,
    pub flags: u32,
    pub value: Vec<u8>,
    pub cas: Option<u64>,
}

/// An open Memcached socket running one request at a time
#[derive(Debug)]
pub struct MemcachedWireClient {
    stream: Option<FramedStream>,
    in_flight: bool,
    command_timeout: Duration,
}

impl MemcachedWireClient {
    /// Connect and verify the server answers `version`.
    ///
    /// SASL is rejected with `AUTH_FAILED` before any socket is opened.
    #[tracing::instrument(skip(config), fields(host = %config.host, port = config.port))]
    pub async fn connect(config: &MemcachedConfig) -> Result<Self> {
        if let MemcachedAuth::Sasl { .. } = config.auth {
            return Err(KeyscopeError::AuthFailed(
                "SASL authentication is not supported over the ASCII protocol".to_string(),
            ));
        }

        tracing::debug!("connecting to Memcached");
        let start = Instant::now();

        let tcp = connect_tcp(&config.host, config.port, config.connect_timeout).await?;
        let mut client = Self {
            stream: Some(FramedStream::new(tcp, config.command_timeout)),
            in_flight: false,
            command_timeout: config.command_timeout,
        };
        let version = client.version().await?;

        tracing::debug!(
            version = %version,
            duration_ms = start.elapsed().as_millis() as u64,
            "Memcached connection verified"
        );
        Ok(client)
    }

    /// Fetch one item; `None` on a miss
    pub async fn get(&mut self, key: &str) -> Result<Option<MemcachedItem>> {
        validate_key(key)?;
        let request = format!("get {}\r\n", key).into_bytes();
        let timeout = self.command_timeout;

        let stream = self.begin()?;
        let exchange = async {
            stream.write_all(&request).await?;
            read_get_reply(stream, key).await
        };
        let result = tokio::time::timeout(timeout, exchange).await;
        self.finish(result)
    }

    /// Store an item; anything but `STORED` is an error
    pub async fn set(&mut self, key: &str, flags: u32, exptime: u32, value: &[u8]) -> Result<()> {
        validate_key(key)?;
        let mut request =
            format!("set {} {} {} {}\r\n", key, flags, exptime, value.len()).into_bytes();
        request.extend_from_slice(value);
        request.extend_from_slice(b"\r\n");
        let timeout = self.command_timeout;

        let stream = self.begin()?;
        let exchange = async {
            stream.write_all(&request).await?;
            let line = stream.read_line().await?;
            if line == "STORED" {
                return Ok(());
            }
            if line == "NOT_STORED" || is_error_line(&line) {
                return Err(KeyscopeError::CommandFailed(line));
            }
            Err(KeyscopeError::Protocol(format!(
                "unexpected reply to set: {:?}",
                line
            )))
        };
        let result = tokio::time::timeout(timeout, exchange).await;
        self.finish(result)
    }

    /// All `STAT name value` pairs
    pub async fn stats(&mut self) -> Result<BTreeMap<String, String>> {
        let timeout = self.command_timeout;

        let stream = self.begin()?;
        let exchange = async {
            stream.write_all(b"stats\r\n").await?;
            let mut stats = BTreeMap::new();
            loop {
                let line = stream.read_line().await?;
                if line == "END" {
                    return Ok(stats);
                }
                if is_error_line(&line) {
                    return Err(KeyscopeError::CommandFailed(line));
                }
                let mut parts = line.splitn(3, ' ');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some("STAT"), Some(name), value) => {
                        stats.insert(name.to_string(), value.unwrap_or_default().to_string());
                    }
                    _ => {
                        return Err(KeyscopeError::invalid_response(
                            "stats",
                            format!("unexpected line {:?}", line),
                        ));
                    }
                }
            }
        };
        let result = tokio::time::timeout(timeout, exchange).await;
        self.finish(result)
    }

    /// Server version string
    pub async fn version(&mut self) -> Result<String> {
        let timeout = self.command_timeout;

        let stream = self.begin()?;
        let exchange = async {
            stream.write_all(b"version\r\n").await?;
            let line = stream.read_line().await?;
            if let Some(version) = line.strip_prefix("VERSION ") {
                return Ok(version.trim().to_string());
            }
            if is_error_line(&line) {
                return Err(KeyscopeError::CommandFailed(line));
            }
            Err(KeyscopeError::invalid_response(
                "version",
                format!("expected VERSION, got {:?}", line),
            ))
        };
        let result = tokio::time::timeout(timeout, exchange).await;
        self.finish(result)
    }

    /// Drop the socket without sending anything
    pub fn close(&mut self) {
        self.stream = None;
        self.in_flight = false;
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    fn begin(&mut self) -> Result<&mut FramedStream> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(KeyscopeError::ConnectionClosed);
        };
        if self.in_flight {
            return Err(KeyscopeError::ConnectionBusy);
        }
        self.in_flight = true;
        Ok(stream)
    }

    fn finish<T>(
        &mut self,
        result: std::result::Result<Result<T>, tokio::time::error::Elapsed>,
    ) -> Result<T> {
        let result = result.unwrap_or_else(|_| {
            Err(KeyscopeError::Timeout(format!(
                "no reply within {}ms",
                self.command_timeout.as_millis()
            )))
        });

        match &result {
            // Error replies are complete lines; the stream is still in sync
            Ok(_) | Err(KeyscopeError::CommandFailed(_)) => self.in_flight = false,
            Err(e) => {
                tracing::debug!(error_code = e.code(), "discarding Memcached socket");
                self.close();
            }
        }
        result
    }
}

async fn read_get_reply(stream: &mut FramedStream, key: &str) -> Result<Option<MemcachedItem>> {
    let header = stream.read_line().await?;
    if header == "END" {
        return Ok(None);
    }
    if is_error_line(&header) {
        return Err(KeyscopeError::CommandFailed(header));
    }

    let (item_key, flags, len, cas) = parse_value_header(&header)?;
    if item_key != key {
        return Err(KeyscopeError::Protocol(format!(
            "reply is for key {:?}, expected {:?}",
            item_key, key
        )));
    }

    let value = stream.read_exact(len).await?;
    if stream.read_exact(2).await? != b"\r\n" {
        return Err(KeyscopeError::Protocol(
            "value is not terminated by CRLF".to_string(),
        ));
    }
    let end = stream.read_line().await?;
    if end != "END" {
        return Err(KeyscopeError::Protocol(format!(
            "expected END after value, got {:?}",
            end
        )));
    }

    Ok(Some(MemcachedItem {
        key: item_key.to_string(),
        flags,
        value,
        cas,
    }))
}

/// `VALUE <key> <flags> <bytes> [<cas>]`
fn parse_value_header(line: &str) -> Result<(&str, u32, usize, Option<u64>)> {
    let malformed = || KeyscopeError::Protocol(format!("malformed VALUE line {:?}", line));

    let mut parts = line.split(' ');
    if parts.next() != Some("VALUE") {
        return Err(malformed());
    }
    let key = parts.next().ok_or_else(malformed)?;
    let flags = parts
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(malformed)?;
    let len = parts
        .next()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|len| *len <= MAX_VALUE_BYTES)
        .ok_or_else(malformed)?;
    let cas = match parts.next() {
        Some(s) => Some(s.parse::<u64>().map_err(|_| malformed())?),
        None => None,
    };
    if parts.next().is_some() {
        return Err(malformed());
    }

    Ok((key, flags, len, cas))
}

fn is_error_line(line: &str) -> bool {
    line == "ERROR" || line.starts_with("CLIENT_ERROR") || line.starts_with("SERVER_ERROR")
}
