//! Inspection result shapes, one per Redis type

use keyscope_core::CapReason;
use keyscope_redact::RedactionMetadata;
use serde::{Deserialize, Serialize};

/// Completeness flags shared by every result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviewStatus {
    pub ttl_seconds: Option<i64>,
    /// The preview does not hold the whole value
    pub is_partial: bool,
    pub cap_reached: bool,
    pub cap_reason: Option<CapReason>,
    /// Entries (or, for strings, values) fetched so far
    pub fetched_count: usize,
    /// More data exists on the server than was fetched
    pub has_more: bool,
}

impl PreviewStatus {
    pub(crate) fn new(ttl_seconds: Option<i64>) -> Self {
        Self {
            ttl_seconds,
            ..Self::default()
        }
    }

    pub(crate) fn with_cap(mut self, cap: Option<CapReason>) -> Self {
        self.cap_reached = cap.is_some();
        self.cap_reason = cap;
        self
    }
}

/// Preview of one key, tagged by its Redis type.
///
/// Rebuilt on every page; the last one emitted is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InspectionResult {
    None(MissingKey),
    String(StringPreview),
    Hash(HashPreview),
    List(ListPreview),
    Set(SetPreview),
    Zset(ZsetPreview),
    Stream(StreamPreview),
}

impl InspectionResult {
    pub fn status(&self) -> &PreviewStatus {
        match self {
            InspectionResult::None(r) => &r.status,
            InspectionResult::String(r) => &r.status,
            InspectionResult::Hash(r) => &r.status,
            InspectionResult::List(r) => &r.status,
            InspectionResult::Set(r) => &r.status,
            InspectionResult::Zset(r) => &r.status,
            InspectionResult::Stream(r) => &r.status,
        }
    }

    fn status_mut(&mut self) -> &mut PreviewStatus {
        match self {
            InspectionResult::None(r) => &mut r.status,
            InspectionResult::String(r) => &mut r.status,
            InspectionResult::Hash(r) => &mut r.status,
            InspectionResult::List(r) => &mut r.status,
            InspectionResult::Set(r) => &mut r.status,
            InspectionResult::Zset(r) => &mut r.status,
            InspectionResult::Stream(r) => &mut r.status,
        }
    }

    /// The same preview, flagged as incomplete
    pub(crate) fn into_partial(mut self) -> Self {
        self.status_mut().is_partial = true;
        self
    }

    /// Redaction applied to the surfaced text; `None` for missing keys
    pub fn redaction(&self) -> Option<&RedactionMetadata> {
        match self {
            InspectionResult::None(_) => None,
            InspectionResult::String(r) => Some(&r.redaction),
            InspectionResult::Hash(r) => Some(&r.redaction),
            InspectionResult::List(r) => Some(&r.redaction),
            InspectionResult::Set(r) => Some(&r.redaction),
            InspectionResult::Zset(r) => Some(&r.redaction),
            InspectionResult::Stream(r) => Some(&r.redaction),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissingKey {
    pub key: String,
    #[serde(flatten)]
    pub status: PreviewStatus,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringPreview {
    pub key: String,
    #[serde(flatten)]
    pub status: PreviewStatus,
    /// Length of the stored value in bytes
    pub total_bytes: usize,
    pub value: String,
    pub redaction: RedactionMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashEntry {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashPreview {
    pub key: String,
    #[serde(flatten)]
    pub status: PreviewStatus,
    pub total_fields: u64,
    /// Sorted by field
    pub entries: Vec<HashEntry>,
    pub redaction: RedactionMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListItem {
    pub index: u64,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListPreview {
    pub key: String,
    #[serde(flatten)]
    pub status: PreviewStatus,
    pub total_count: u64,
    /// In server order
    pub items: Vec<ListItem>,
    pub redaction: RedactionMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetPreview {
    pub key: String,
    #[serde(flatten)]
    pub status: PreviewStatus,
    pub total_count: u64,
    /// Sorted
    pub members: Vec<String>,
    pub redaction: RedactionMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZsetMember {
    pub member: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZsetPreview {
    pub key: String,
    #[serde(flatten)]
    pub status: PreviewStatus,
    pub total_count: u64,
    /// Sorted by member
    pub members: Vec<ZsetMember>,
    pub redaction: RedactionMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamField {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEntry {
    pub id: String,
    pub fields: Vec<StreamField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamPreview {
    pub key: String,
    #[serde(flatten)]
    pub status: PreviewStatus,
    pub total_count: u64,
    /// Newest first
    pub entries: Vec<StreamEntry>,
    pub redaction: RedactionMetadata,
}
