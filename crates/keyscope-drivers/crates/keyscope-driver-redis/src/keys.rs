//! Redis key introspection module
//!
//! Typed wrappers over the handful of commands used to browse keys:
//! - `SCAN` pages (cursor-based iteration)
//! - `TYPE` of a key
//! - `TTL` of a key
//!
//! plus the reply parsing shared by the SCAN-family commands (`HSCAN`,
//! `SSCAN`, `ZSCAN`).

use keyscope_core::{CommandExecutor, KeyscopeError, RespValue, Result, command, key_command};
use serde::{Deserialize, Serialize};

/// Redis key types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// String value
    String,
    /// List (linked list)
    List,
    /// Set (unordered unique strings)
    Set,
    /// Sorted set (ordered by score)
    Zset,
    /// Hash (field-value pairs)
    Hash,
    /// Stream (append-only log)
    Stream,
    /// Key doesn't exist
    None,
}

impl KeyType {
    /// Parse a `TYPE` reply; unknown (module) types yield `None`
    pub fn from_redis_type(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "string" => Some(KeyType::String),
            "list" => Some(KeyType::List),
            "set" => Some(KeyType::Set),
            "zset" => Some(KeyType::Zset),
            "hash" => Some(KeyType::Hash),
            "stream" => Some(KeyType::Stream),
            "none" => Some(KeyType::None),
            _ => None,
        }
    }

    /// Get the Redis type string
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::String => "string",
            KeyType::List => "list",
            KeyType::Set => "set",
            KeyType::Zset => "zset",
            KeyType::Hash => "hash",
            KeyType::Stream => "stream",
            KeyType::None => "none",
        }
    }
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One page of a SCAN-family command
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPage {
    /// Cursor for the next call; `"0"` once iteration is complete
    pub cursor: String,
    /// Raw page elements (keys, or field/value / member/score pairs)
    pub items: Vec<RespValue>,
}

impl ScanPage {
    pub fn is_last(&self) -> bool {
        self.cursor == "0"
    }
}

/// Split a `[cursor, [items...]]` reply.
///
/// `command` names the SCAN variant for the `INVALID_<CMD>_RESPONSE` code.
pub fn parse_scan_reply(command: &'static str, reply: RespValue) -> Result<ScanPage> {
    let parts = match reply {
        RespValue::Array(parts) => parts,
        RespValue::Error(message) => return Err(KeyscopeError::CommandFailed(message)),
        other => {
            return Err(KeyscopeError::invalid_response(
                command,
                format!("expected a two element array, got {}", other.kind()),
            ));
        }
    };

    let [cursor, items]: [RespValue; 2] = parts.try_into().map_err(|parts: Vec<RespValue>| {
        KeyscopeError::invalid_response(
            command,
            format!("expected 2 elements, got {}", parts.len()),
        )
    })?;

    let cursor = cursor
        .into_text()
        .filter(|c| !c.is_empty() && c.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| KeyscopeError::invalid_response(command, "cursor is not a number"))?;

    let items = items
        .into_array()
        .ok_or_else(|| KeyscopeError::invalid_response(command, "page is not an array"))?;

    Ok(ScanPage { cursor, items })
}

/// `SCAN cursor MATCH pattern COUNT count`, returning key names as the
/// server sent them
pub async fn scan_keys<E>(
    exec: &E,
    cursor: &str,
    pattern: &str,
    count: u32,
) -> Result<(String, Vec<Vec<u8>>)>
where
    E: CommandExecutor + ?Sized,
{
    let count = count.to_string();
    let reply = exec
        .execute(&command([
            "SCAN",
            cursor,
            "MATCH",
            pattern,
            "COUNT",
            count.as_str(),
        ]))
        .await?;

    let page = parse_scan_reply("SCAN", reply)?;
    let keys = page
        .items
        .into_iter()
        .map(|item| {
            item.into_bytes()
                .ok_or_else(|| KeyscopeError::invalid_response("SCAN", "key is not a string"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((page.cursor, keys))
}

/// Get the type of a key
pub async fn key_type<E>(exec: &E, key: impl AsRef<[u8]>) -> Result<KeyType>
where
    E: CommandExecutor + ?Sized,
{
    match exec.execute(&key_command("TYPE", key.as_ref(), &[])).await? {
        RespValue::Error(message) => Err(KeyscopeError::CommandFailed(message)),
        reply => {
            let name = reply.as_text().ok_or_else(|| {
                KeyscopeError::invalid_response(
                    "TYPE",
                    format!("unexpected {} reply", reply.kind()),
                )
            })?;
            KeyType::from_redis_type(&name).ok_or_else(|| {
                KeyscopeError::invalid_response("TYPE", format!("unsupported type {:?}", name))
            })
        }
    }
}

/// Get the TTL of a key in seconds
///
/// Returns:
/// - Positive value: TTL in seconds
/// - -1: Key exists but has no expiry
/// - -2: Key does not exist
pub async fn key_ttl<E>(exec: &E, key: impl AsRef<[u8]>) -> Result<i64>
where
    E: CommandExecutor + ?Sized,
{
    match exec.execute(&key_command("TTL", key.as_ref(), &[])).await? {
        RespValue::Integer(ttl) => Ok(ttl),
        RespValue::Error(message) => Err(KeyscopeError::CommandFailed(message)),
        other => Err(KeyscopeError::invalid_response(
            "TTL",
            format!("expected an integer, got {}", other.kind()),
        )),
    }
}

/// Read an integer reply (`HLEN`, `LLEN`, `SCARD`, `ZCARD`, `XLEN`)
pub async fn count_reply<E>(exec: &E, name: &'static str, key: impl AsRef<[u8]>) -> Result<u64>
where
    E: CommandExecutor + ?Sized,
{
    match exec.execute(&key_command(name, key.as_ref(), &[])).await? {
        RespValue::Integer(n) if n >= 0 => Ok(n as u64),
        RespValue::Error(message) => Err(KeyscopeError::CommandFailed(message)),
        other => Err(KeyscopeError::invalid_response(
            name,
            format!("expected a non-negative integer, got {}", other),
        )),
    }
}
