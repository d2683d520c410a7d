//! Redaction metadata attached to every text preview

use serde::{Deserialize, Serialize};

/// Identifier of the built-in masking policy
pub const POLICY_ID: &str = "keyscope-default";

/// Version of the built-in masking policy
pub const POLICY_VERSION: &str = "1";

/// What the redaction engine did to one piece of text (or, after merging, to
/// every value of a collection preview).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionMetadata {
    pub policy_id: String,
    pub policy_version: String,
    /// Number of masked spans across all passes
    pub redacted_segments: usize,
    /// True when at least one span was masked
    pub redaction_applied: bool,
}

impl RedactionMetadata {
    /// Metadata for text in which nothing was masked
    pub fn none() -> Self {
        Self::with_segments(0)
    }

    pub(crate) fn with_segments(redacted_segments: usize) -> Self {
        Self {
            policy_id: POLICY_ID.to_string(),
            policy_version: POLICY_VERSION.to_string(),
            redacted_segments,
            redaction_applied: redacted_segments > 0,
        }
    }

    /// Fold another record into this one
    pub fn merge(&mut self, other: &RedactionMetadata) {
        self.redacted_segments += other.redacted_segments;
        self.redaction_applied = self.redacted_segments > 0;
    }

    /// Combine the records of many values into one
    pub fn merged<'a>(items: impl IntoIterator<Item = &'a RedactionMetadata>) -> Self {
        items.into_iter().fold(Self::none(), |mut acc, item| {
            acc.merge(item);
            acc
        })
    }
}

impl Default for RedactionMetadata {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_has_policy() {
        let metadata = RedactionMetadata::none();
        assert_eq!(metadata.policy_id, "keyscope-default");
        assert_eq!(metadata.policy_version, "1");
        assert!(!metadata.redaction_applied);
    }

    #[test]
    fn test_merge_accumulates() {
        let records = [
            RedactionMetadata::with_segments(2),
            RedactionMetadata::none(),
            RedactionMetadata::with_segments(1),
        ];
        let merged = RedactionMetadata::merged(&records);
        assert_eq!(merged.redacted_segments, 3);
        assert!(merged.redaction_applied);

        let empty = RedactionMetadata::merged(std::iter::empty());
        assert_eq!(empty, RedactionMetadata::none());
    }
}
