//! Buffered socket framing shared by the wire clients
//!
//! Replies from both Redis and Memcached can arrive split across any number
//! of TCP packets. `FramedStream` owns a read buffer and offers the three
//! primitives the protocol decoders need:
//!
//! - `read_line` - bytes up to the next `\r\n`
//! - `read_exact` - exactly N bytes
//! - `read_frame` - repeatedly offer the buffer to a parse-if-complete
//!   function until it yields a value
//!
//! Every socket read is bounded by the stream's read timeout.

use crate::{KeyscopeError, Result};
use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

/// Longest line accepted before the peer is considered to be misbehaving
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Initial read buffer capacity
const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Any async byte stream usable as a wire transport (plain TCP, TLS, or an
/// in-memory duplex in tests)
pub trait WireIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> WireIo for T {}

/// Open a TCP connection, racing it against `timeout`.
#[tracing::instrument(skip(timeout), fields(timeout_ms = timeout.as_millis() as u64))]
pub async fn connect_tcp(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let stream = match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "tcp connect failed");
            return Err(KeyscopeError::from(e));
        }
        Err(_) => {
            return Err(KeyscopeError::Timeout(format!(
                "connecting to {}:{} took longer than {}ms",
                host,
                port,
                timeout.as_millis()
            )));
        }
    };

    if let Err(e) = stream.set_nodelay(true) {
        tracing::warn!(error = %e, "failed to set TCP_NODELAY");
    }

    Ok(stream)
}

/// A byte stream with a read buffer and framing helpers
pub struct FramedStream {
    io: Box<dyn WireIo>,
    buffer: BytesMut,
    read_timeout: Duration,
}

impl FramedStream {
    /// Wrap a transport; `read_timeout` bounds each individual socket read
    pub fn new(io: impl WireIo + 'static, read_timeout: Duration) -> Self {
        Self {
            io: Box::new(io),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            read_timeout,
        }
    }

    /// Get the per-read timeout
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Number of bytes received but not yet consumed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Write and flush a complete request
    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let io = &mut self.io;
        let write = async move {
            io.write_all(bytes).await?;
            io.flush().await
        };
        match tokio::time::timeout(self.read_timeout, write).await {
            Ok(result) => result.map_err(KeyscopeError::from),
            Err(_) => Err(KeyscopeError::Timeout(format!(
                "write did not complete within {}ms",
                self.read_timeout.as_millis()
            ))),
        }
    }

    /// Read one `\r\n`-terminated line, without the terminator
    pub async fn read_line(&mut self) -> Result<String> {
        loop {
            if let Some(pos) = find_crlf(&self.buffer) {
                let line = self.buffer.split_to(pos);
                self.buffer.advance(2);
                return String::from_utf8(line.to_vec()).map_err(|_| {
                    KeyscopeError::Protocol("reply line is not valid UTF-8".to_string())
                });
            }
            if self.buffer.len() > MAX_LINE_LENGTH {
                return Err(KeyscopeError::Protocol(format!(
                    "reply line exceeds {} bytes without a terminator",
                    MAX_LINE_LENGTH
                )));
            }
            self.fill().await?;
        }
    }

    /// Read exactly `len` bytes
    pub async fn read_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        while self.buffer.len() < len {
            self.fill().await?;
        }
        Ok(self.buffer.split_to(len).to_vec())
    }

    /// Decode one value with a parse-if-complete function.
    ///
    /// `parse` receives everything buffered so far and returns `Ok(None)` when
    /// more bytes are needed, or the value plus the number of bytes it used.
    pub async fn read_frame<T, F>(&mut self, mut parse: F) -> Result<T>
    where
        F: FnMut(&[u8]) -> Result<Option<(T, usize)>>,
    {
        loop {
            if !self.buffer.is_empty()
                && let Some((value, used)) = parse(&self.buffer)?
            {
                self.buffer.advance(used);
                return Ok(value);
            }
            self.fill().await?;
        }
    }

    /// Pull more bytes from the socket into the buffer
    async fn fill(&mut self) -> Result<()> {
        let read = tokio::time::timeout(self.read_timeout, self.io.read_buf(&mut self.buffer));
        let n = match read.await {
            Ok(result) => result?,
            Err(_) => {
                return Err(KeyscopeError::Timeout(format!(
                    "no reply within {}ms",
                    self.read_timeout.as_millis()
                )));
            }
        };
        if n == 0 {
            return Err(KeyscopeError::Connection(
                "connection closed by server".to_string(),
            ));
        }
        Ok(())
    }

    /// Shut down the write half; errors are ignored since the stream is
    /// being discarded anyway
    pub async fn shutdown(&mut self) {
        let _ = self.io.shutdown().await;
    }
}

impl std::fmt::Debug for FramedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedStream")
            .field("buffered", &self.buffer.len())
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

/// Position of the first `\r\n` in `buf`
pub fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}
