//! Shaping raw Memcached replies into preview results

use crate::MemcachedItem;
use keyscope_core::CapReason;
use keyscope_redact::{RedactionMetadata, redact_bounded};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The handful of `stats` fields worth showing at a glance.
///
/// Fields the server did not report, or reported in an unexpected format,
/// are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSummary {
    pub version: Option<String>,
    pub uptime_seconds: Option<u64>,
    pub current_items: Option<u64>,
    pub bytes_used: Option<u64>,
    pub bytes_limit: Option<u64>,
    pub current_connections: Option<u64>,
    pub get_hits: Option<u64>,
    pub get_misses: Option<u64>,
    /// `get_hits / (get_hits + get_misses)`, absent before the first get
    pub hit_ratio: Option<f64>,
}

impl StatsSummary {
    pub fn from_stats(stats: &BTreeMap<String, String>) -> Self {
        let number = |name: &str| stats.get(name).and_then(|v| v.trim().parse::<u64>().ok());

        let get_hits = number("get_hits");
        let get_misses = number("get_misses");
        let hit_ratio = match (get_hits, get_misses) {
            (Some(hits), Some(misses)) if hits + misses > 0 => {
                Some(hits as f64 / (hits + misses) as f64)
            }
            _ => None,
        };

        Self {
            version: stats.get("version").cloned(),
            uptime_seconds: number("uptime"),
            current_items: number("curr_items"),
            bytes_used: number("bytes"),
            bytes_limit: number("limit_maxbytes"),
            current_connections: number("curr_connections"),
            get_hits,
            get_misses,
            hit_ratio,
        }
    }
}

/// A redacted, size-bounded view of one cached value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuePreview {
    pub key: String,
    pub flags: u32,
    /// Size of the stored value, before truncation
    pub total_bytes: usize,
    /// Preview text (lossy UTF-8 for binary values)
    pub value: String,
    pub is_partial: bool,
    pub cap_reached: bool,
    pub cap_reason: Option<CapReason>,
    pub redaction: RedactionMetadata,
}

impl ValuePreview {
    pub fn from_item(item: &MemcachedItem, max_bytes: usize) -> Self {
        let text = String::from_utf8_lossy(&item.value);
        let bounded = redact_bounded(&text, max_bytes);

        Self {
            key: item.key.clone(),
            flags: item.flags,
            total_bytes: item.value.len(),
            value: bounded.text,
            is_partial: bounded.truncated,
            cap_reached: bounded.truncated,
            cap_reason: bounded.truncated.then_some(CapReason::StringPreviewLimit),
            redaction: bounded.metadata,
        }
    }
}
