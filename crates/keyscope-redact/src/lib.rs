//! Keyscope Redact - secret masking for previewed values
//!
//! Every piece of text that Keyscope surfaces from a server (string bodies,
//! hash values, list items, set members, stream fields, Memcached values)
//! passes through [`redact`] first. The engine is pure and stateless: the same
//! input always yields the same output, and re-redacting already masked text
//! finds nothing new.
//!
//! Passes run in a fixed order and are counted independently:
//!
//! 1. sensitive `key=value` / `key: value` pairs (value only, quoting kept)
//! 2. JWT-shaped tokens
//! 3. `Bearer <token>` credentials (token only)
//! 4. long high-entropy tokens
//!
//! # Example
//!
//! ```
//! use keyscope_redact::redact;
//!
//! let result = redact("password=secret-value-1234567890");
//! assert_eq!(result.text, "password=[REDACTED]");
//! assert_eq!(result.metadata.redacted_segments, 1);
//! ```

mod engine;
mod metadata;
mod patterns;

pub use engine::{
    BoundedText, RedactedText, RedactionEngine, redact, redact_bounded, redact_field,
    truncate_on_char_boundary,
};
pub use metadata::{POLICY_ID, POLICY_VERSION, RedactionMetadata};
pub use patterns::MASK;
