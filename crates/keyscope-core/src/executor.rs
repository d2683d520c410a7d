//! Command executor trait

use crate::{RespValue, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// A connected, authenticated Redis server that runs one command at a time.
///
/// Implementations must keep request/response ordering strict: concurrent
/// callers are queued so that each command's reply is fully decoded before the
/// next command is written. Jobs only ever talk to a server through this seam,
/// which is also what the tests replace with scripted replies.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Send one command (as argument vector) and return the decoded reply.
    ///
    /// Arguments are raw bytes, so keys that are not valid UTF-8 go back to
    /// the server exactly as SCAN returned them. Server error replies
    /// (`-ERR ...`) are returned as `RespValue::Error`; `Err` is reserved for
    /// transport and framing failures.
    async fn execute(&self, parts: &[Vec<u8>]) -> Result<RespValue>;

    /// Check if the underlying connection has been closed
    fn is_closed(&self) -> bool {
        false
    }
}

#[async_trait]
impl<T: CommandExecutor + ?Sized> CommandExecutor for Arc<T> {
    async fn execute(&self, parts: &[Vec<u8>]) -> Result<RespValue> {
        (**self).execute(parts).await
    }

    fn is_closed(&self) -> bool {
        (**self).is_closed()
    }
}

/// Build an argument vector from string slices
pub fn command<I, S>(parts: I) -> Vec<Vec<u8>>
where
    I: IntoIterator<Item = S>,
    S: Into<Vec<u8>>,
{
    parts.into_iter().map(Into::into).collect()
}

/// Build `name key args...` for a key held as raw bytes
pub fn key_command(name: &str, key: &[u8], args: &[&str]) -> Vec<Vec<u8>> {
    let mut parts = Vec::with_capacity(args.len() + 2);
    parts.push(name.as_bytes().to_vec());
    parts.push(key.to_vec());
    parts.extend(args.iter().map(|arg| arg.as_bytes().to_vec()));
    parts
}

/// Printable form of an argument vector, for logs and error messages
pub fn display_command(parts: &[Vec<u8>]) -> String {
    parts
        .iter()
        .map(|part| String::from_utf8_lossy(part))
        .collect::<Vec<_>>()
        .join(" ")
}
