//! RESP (REdis Serialization Protocol) codec
//!
//! Requests are always arrays of bulk strings. Replies are decoded by
//! [`parse`], a pure function over whatever bytes have arrived so far: it
//! returns `Ok(None)` until a complete value is buffered, so it can be driven
//! by `FramedStream::read_frame` no matter how the server's reply was split
//! into packets.

use keyscope_core::wire::find_crlf;
use keyscope_core::{KeyscopeError, RespValue, Result};

/// Deepest array nesting accepted in a reply
pub const MAX_NESTING_DEPTH: usize = 32;

/// Largest bulk string accepted (Redis' own proto-max-bulk-len default)
pub const MAX_BULK_LENGTH: i64 = 512 * 1024 * 1024;

/// Largest element count accepted for a single array
pub const MAX_ARRAY_LENGTH: i64 = 16 * 1024 * 1024;

/// Longest header line accepted before the reply is considered malformed
const MAX_HEADER_LENGTH: usize = 64 * 1024;

/// Encode a command as a RESP array of bulk strings
pub fn encode_command<S: AsRef<[u8]>>(parts: &[S]) -> Vec<u8> {
    let payload: usize = parts.iter().map(|p| p.as_ref().len() + 16).sum();
    let mut out = Vec::with_capacity(payload + 16);

    out.extend_from_slice(format!("*{}\r\n", parts.len()).as_bytes());
    for part in parts {
        let bytes = part.as_ref();
        out.extend_from_slice(format!("${}\r\n", bytes.len()).as_bytes());
        out.extend_from_slice(bytes);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Decode one reply from the front of `buf`.
///
/// Returns the value and the number of bytes it occupied, or `None` when the
/// buffer does not yet hold a complete reply.
pub fn parse(buf: &[u8]) -> Result<Option<(RespValue, usize)>> {
    parse_value(buf, 0)
}

fn parse_value(buf: &[u8], depth: usize) -> Result<Option<(RespValue, usize)>> {
    if depth > MAX_NESTING_DEPTH {
        return Err(KeyscopeError::Protocol(format!(
            "reply nests deeper than {} levels",
            MAX_NESTING_DEPTH
        )));
    }

    let Some(line_end) = find_crlf(buf) else {
        if buf.len() > MAX_HEADER_LENGTH {
            return Err(KeyscopeError::Protocol(
                "reply header is missing its terminator".to_string(),
            ));
        }
        return Ok(None);
    };
    if line_end == 0 {
        return Err(KeyscopeError::Protocol("empty reply header".to_string()));
    }

    let line = &buf[1..line_end];
    let body_start = line_end + 2;

    match buf[0] {
        b'+' => Ok(Some((RespValue::SimpleString(text(line)?), body_start))),
        b'-' => Ok(Some((RespValue::Error(text(line)?), body_start))),
        b':' => Ok(Some((RespValue::Integer(integer(line)?), body_start))),
        b'$' => parse_bulk(buf, integer(line)?, body_start),
        b'*' => parse_array(buf, integer(line)?, body_start, depth),
        other => Err(KeyscopeError::Protocol(format!(
            "unexpected reply type byte 0x{:02x}",
            other
        ))),
    }
}

fn parse_bulk(buf: &[u8], len: i64, start: usize) -> Result<Option<(RespValue, usize)>> {
    if len == -1 {
        return Ok(Some((RespValue::Null, start)));
    }
    if !(0..=MAX_BULK_LENGTH).contains(&len) {
        return Err(KeyscopeError::Protocol(format!(
            "invalid bulk string length {}",
            len
        )));
    }

    let end = start + len as usize;
    if buf.len() < end + 2 {
        return Ok(None);
    }
    if &buf[end..end + 2] != b"\r\n" {
        return Err(KeyscopeError::Protocol(
            "bulk string is not terminated by CRLF".to_string(),
        ));
    }

    Ok(Some((RespValue::BulkString(buf[start..end].to_vec()), end + 2)))
}

fn parse_array(
    buf: &[u8],
    count: i64,
    start: usize,
    depth: usize,
) -> Result<Option<(RespValue, usize)>> {
    if count == -1 {
        return Ok(Some((RespValue::NullArray, start)));
    }
    if !(0..=MAX_ARRAY_LENGTH).contains(&count) {
        return Err(KeyscopeError::Protocol(format!(
            "invalid array length {}",
            count
        )));
    }

    let count = count as usize;
    let mut items = Vec::with_capacity(count.min(1024));
    let mut pos = start;

    for _ in 0..count {
        match parse_value(&buf[pos..], depth + 1)? {
            Some((item, used)) => {
                items.push(item);
                pos += used;
            }
            None => return Ok(None),
        }
    }

    Ok(Some((RespValue::Array(items), pos)))
}

fn text(line: &[u8]) -> Result<String> {
    String::from_utf8(line.to_vec())
        .map_err(|_| KeyscopeError::Protocol("status line is not valid UTF-8".to_string()))
}

fn integer(line: &[u8]) -> Result<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            KeyscopeError::Protocol(format!(
                "expected an integer, got {:?}",
                String::from_utf8_lossy(line)
            ))
        })
}
