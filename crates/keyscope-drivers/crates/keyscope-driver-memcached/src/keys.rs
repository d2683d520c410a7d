//! Memcached key validation

use keyscope_core::{KeyscopeError, Result};

/// Longest key the server accepts, in bytes
pub const MAX_KEY_LENGTH: usize = 250;

/// Check a key before any bytes are written.
///
/// Keys are interpolated straight into command lines, so whitespace or
/// control characters would let a key inject a second command.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(KeyscopeError::InvalidKey("key is empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(KeyscopeError::InvalidKey(format!(
            "key is {} bytes, the limit is {}",
            key.len(),
            MAX_KEY_LENGTH
        )));
    }
    if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(KeyscopeError::InvalidKey(
            "key contains whitespace or control characters".to_string(),
        ));
    }
    Ok(())
}
