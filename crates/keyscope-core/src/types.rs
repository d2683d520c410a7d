//! Core types for Keyscope

use crate::{KeyscopeError, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Which configured limit truncated a result.
///
/// Hitting a cap is a normal outcome, not an error: the partial result is
/// still returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapReason {
    /// String value longer than the preview byte budget
    StringPreviewLimit,
    /// Collection has more entries than `max_entries`
    CollectionEntryLimit,
    /// Collection entries exceed the preview byte budget
    CollectionByteLimit,
    /// Discovery found more keys than `max_keys`
    DiscoveryKeyLimit,
    /// Discovery ran longer than `max_duration_ms`
    DiscoveryTimeLimit,
}

impl CapReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapReason::StringPreviewLimit => "STRING_PREVIEW_LIMIT",
            CapReason::CollectionEntryLimit => "COLLECTION_ENTRY_LIMIT",
            CapReason::CollectionByteLimit => "COLLECTION_BYTE_LIMIT",
            CapReason::DiscoveryKeyLimit => "DISCOVERY_KEY_LIMIT",
            CapReason::DiscoveryTimeLimit => "DISCOVERY_TIME_LIMIT",
        }
    }
}

impl std::fmt::Display for CapReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully decoded RESP reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// `+OK\r\n`
    SimpleString(String),
    /// `-ERR message\r\n`
    Error(String),
    /// `:42\r\n`
    Integer(i64),
    /// `$3\r\nfoo\r\n` (binary safe)
    BulkString(Vec<u8>),
    /// `$-1\r\n`
    Null,
    /// `*2\r\n...` with nested values
    Array(Vec<RespValue>),
    /// `*-1\r\n`
    NullArray,
}

impl RespValue {
    /// Build a bulk string from anything byte-like
    pub fn bulk(data: impl Into<Vec<u8>>) -> Self {
        RespValue::BulkString(data.into())
    }

    /// Check for either null form
    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null | RespValue::NullArray)
    }

    /// Check if the server replied with an error
    pub fn is_error(&self) -> bool {
        matches!(self, RespValue::Error(_))
    }

    /// Text view of a simple or bulk string (lossy for non-UTF-8 bulk data)
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            RespValue::SimpleString(s) => Some(Cow::Borrowed(s.as_str())),
            RespValue::BulkString(data) => Some(String::from_utf8_lossy(data)),
            _ => None,
        }
    }

    /// Owned text of a simple or bulk string
    pub fn into_text(self) -> Option<String> {
        match self {
            RespValue::SimpleString(s) => Some(s),
            RespValue::BulkString(data) => Some(match String::from_utf8(data) {
                Ok(s) => s,
                Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
            }),
            _ => None,
        }
    }

    /// Integer reply, or a string reply holding an integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            RespValue::Integer(n) => Some(*n),
            RespValue::SimpleString(_) | RespValue::BulkString(_) => {
                self.as_text().and_then(|s| s.trim().parse().ok())
            }
            _ => None,
        }
    }

    /// Raw bytes of a bulk or simple string
    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            RespValue::SimpleString(s) => Some(s.into_bytes()),
            RespValue::BulkString(data) => Some(data),
            _ => None,
        }
    }

    /// Elements of an array reply
    pub fn into_array(self) -> Option<Vec<RespValue>> {
        match self {
            RespValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Turn an error reply into `COMMAND_FAILED`, passing other values through
    pub fn into_result(self) -> Result<RespValue> {
        match self {
            RespValue::Error(message) => Err(KeyscopeError::CommandFailed(message)),
            other => Ok(other),
        }
    }

    /// Short type name used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            RespValue::SimpleString(_) => "simple string",
            RespValue::Error(_) => "error",
            RespValue::Integer(_) => "integer",
            RespValue::BulkString(_) => "bulk string",
            RespValue::Null => "null",
            RespValue::Array(_) => "array",
            RespValue::NullArray => "null array",
        }
    }
}

impl std::fmt::Display for RespValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "{}", s),
            RespValue::Error(e) => write!(f, "(error) {}", e),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => write!(f, "\"{}\"", String::from_utf8_lossy(data)),
            RespValue::Null | RespValue::NullArray => write!(f, "(nil)"),
            RespValue::Array(items) => write!(f, "<array of {} items>", items.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_accessors() {
        assert_eq!(
            RespValue::SimpleString("PONG".into()).as_text().as_deref(),
            Some("PONG")
        );
        assert_eq!(
            RespValue::bulk("hello").into_text(),
            Some("hello".to_string())
        );
        assert_eq!(RespValue::Integer(3).as_text(), None);
    }

    #[test]
    fn test_binary_bulk_is_lossy() {
        let value = RespValue::bulk(vec![0x66, 0xff, 0x6f]);
        assert_eq!(value.into_text(), Some("f\u{fffd}o".to_string()));
    }

    #[test]
    fn test_integer_from_bulk() {
        assert_eq!(RespValue::Integer(-2).as_integer(), Some(-2));
        assert_eq!(RespValue::bulk("17").as_integer(), Some(17));
        assert_eq!(RespValue::bulk("x").as_integer(), None);
    }

    #[test]
    fn test_cap_reason_wire_names() {
        let json = serde_json::to_string(&CapReason::CollectionByteLimit).unwrap();
        assert_eq!(json, "\"COLLECTION_BYTE_LIMIT\"");
        assert_eq!(CapReason::DiscoveryTimeLimit.to_string(), "DISCOVERY_TIME_LIMIT");
    }

    #[test]
    fn test_into_result_maps_error_reply() {
        let err = RespValue::Error("WRONGTYPE Operation".into())
            .into_result()
            .unwrap_err();
        assert_eq!(err.code(), "COMMAND_FAILED");
        assert!(RespValue::Null.into_result().unwrap().is_null());
    }
}
