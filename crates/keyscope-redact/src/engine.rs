//! Redaction engine

use crate::RedactionMetadata;
use crate::patterns::{
    MASK, is_sensitive_name, mask_bearer_tokens, mask_high_entropy, mask_jwts,
    mask_sensitive_pairs,
};
use serde::{Deserialize, Serialize};

/// Masked text plus a record of what was masked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactedText {
    pub text: String,
    pub metadata: RedactionMetadata,
}

type Pass = fn(&str) -> (String, usize);

const PASSES: [Pass; 4] = [
    mask_sensitive_pairs,
    mask_jwts,
    mask_bearer_tokens,
    mask_high_entropy,
];

/// Run every masking pass over `text`, in order
pub fn redact(text: &str) -> RedactedText {
    let mut current = text.to_string();
    let mut segments = 0;

    for pass in PASSES {
        let (next, count) = pass(&current);
        if count > 0 {
            current = next;
            segments += count;
        }
    }

    RedactedText {
        text: current,
        metadata: RedactionMetadata::with_segments(segments),
    }
}

/// Redact the value stored under `field`.
///
/// A value filed under a sensitive name (`password`, `api_key`, ...) is
/// masked whole; anything else goes through [`redact`].
pub fn redact_field(field: &str, value: &str) -> RedactedText {
    if !is_sensitive_name(field) || value.is_empty() || value == MASK {
        return redact(value);
    }
    RedactedText {
        text: MASK.to_string(),
        metadata: RedactionMetadata::with_segments(1),
    }
}

/// Redacted text that fits a byte budget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundedText {
    pub text: String,
    pub metadata: RedactionMetadata,
    /// True when the input, or the masked output, had to be cut short
    pub truncated: bool,
}

/// Cut `text` to at most `max_bytes` without splitting a character
pub fn truncate_on_char_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Truncate to `max_bytes`, redact, then clamp again if masking made the
/// text longer than the budget
pub fn redact_bounded(text: &str, max_bytes: usize) -> BoundedText {
    let clipped = truncate_on_char_boundary(text, max_bytes);
    let mut truncated = clipped.len() < text.len();

    let RedactedText {
        text: mut masked,
        metadata,
    } = redact(clipped);

    if masked.len() > max_bytes {
        let end = clamp_outside_mask(&masked, max_bytes);
        masked.truncate(end);
        truncated = true;
    }

    BoundedText {
        text: masked,
        metadata,
        truncated,
    }
}

// Never cut inside a mask; back off to where it starts
fn clamp_outside_mask(text: &str, max_bytes: usize) -> usize {
    let end = truncate_on_char_boundary(text, max_bytes).len();
    text.match_indices(MASK)
        .map(|(start, _)| start)
        .find(|&start| start < end && end < start + MASK.len())
        .unwrap_or(end)
}

/// Handle for code that wants to hold "the redactor" as a value.
///
/// The engine has no state; every call is equivalent to [`redact`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RedactionEngine;

impl RedactionEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn redact(&self, text: &str) -> RedactedText {
        redact(text)
    }

    /// Redact raw bytes, decoding them as UTF-8 (lossy for binary data)
    pub fn redact_bytes(&self, bytes: &[u8]) -> RedactedText {
        redact(&String::from_utf8_lossy(bytes))
    }

    pub fn redact_bounded(&self, text: &str, max_bytes: usize) -> BoundedText {
        redact_bounded(text, max_bytes)
    }

    /// [`redact_field`] over raw bytes, both decoded lossily
    pub fn redact_field_bytes(&self, field: &[u8], value: &[u8]) -> RedactedText {
        redact_field(
            &String::from_utf8_lossy(field),
            &String::from_utf8_lossy(value),
        )
    }
}
