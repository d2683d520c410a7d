//! Key discovery job
//!
//! Walks the key space with `SCAN`, emitting each page's new keys as they
//! arrive, optionally enriching them with `TYPE`/`TTL`, and stopping at the
//! first of: cursor exhausted, cancellation, time budget, key budget.

use crate::events::Emitter;
use crate::handle::spawn_job;
use crate::{
    CancellationToken, Continuation, ContinuationHint, EventSink, JobHandle, JobId, JobRegistry,
    JobStatus, build_scan_match_pattern,
};
use futures::StreamExt;
use keyscope_core::{CapReason, CommandExecutor, DiscoveryLimits, ErrorInfo};
use keyscope_driver_redis::{KeyType, key_ttl, key_type, scan_keys};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;

/// TYPE/TTL enrichment status of a discovered key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataState {
    Pending,
    Ready,
    Unavailable,
}

/// A key seen by the discovery scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryItem {
    /// Printable key name; invalid UTF-8 is replaced with U+FFFD
    pub key: String,
    /// The exact key bytes, present only when `key` could not hold them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_key: Option<Vec<u8>>,
    /// The key split on `:`, for tree views
    pub prefix_segments: Vec<String>,
    pub key_type: Option<KeyType>,
    /// Seconds to expiry as reported by `TTL` (`-1` means no expiry)
    pub ttl_seconds: Option<i64>,
    pub metadata_state: MetadataState,
}

impl DiscoveryItem {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            prefix_segments: key.split(':').map(str::to_string).collect(),
            key,
            raw_key: None,
            key_type: None,
            ttl_seconds: None,
            metadata_state: MetadataState::Pending,
        }
    }

    /// Item for a key exactly as SCAN returned it
    pub fn from_bytes(key: Vec<u8>) -> Self {
        match String::from_utf8(key) {
            Ok(key) => Self::new(key),
            Err(e) => {
                let raw = e.into_bytes();
                Self {
                    raw_key: Some(raw.clone()),
                    ..Self::new(String::from_utf8_lossy(&raw))
                }
            }
        }
    }

    /// Bytes to send back to the server when addressing this key
    pub fn key_bytes(&self) -> &[u8] {
        self.raw_key.as_deref().unwrap_or(self.key.as_bytes())
    }
}

/// Payload of every discovery event.
///
/// A page event carries the page's new keys sorted ascending; a metadata
/// event carries the single key whose TYPE/TTL just resolved; the `done`
/// event carries no items, only the final counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryBatch {
    pub items: Vec<DiscoveryItem>,
    /// Keys returned by the server so far, duplicates included
    pub scanned_count: u64,
    /// Distinct keys emitted so far
    pub emitted_count: usize,
    pub cursor: String,
    pub cap_reached: bool,
    pub cap_reason: Option<CapReason>,
}

/// What to look for
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryRequest {
    pub query: Option<String>,
    pub prefix: Option<String>,
    /// Fetch TYPE and TTL for every discovered key
    pub include_metadata: bool,
    /// Cursor from a previous run's continuation
    pub resume_cursor: Option<String>,
}

impl DiscoveryRequest {
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_metadata(mut self, include: bool) -> Self {
        self.include_metadata = include;
        self
    }

    pub fn resume_from(mut self, cursor: impl Into<String>) -> Self {
        self.resume_cursor = Some(cursor.into());
        self
    }
}

/// Cursor-driven key scan
pub struct KeyDiscoveryJob {
    executor: Arc<dyn CommandExecutor>,
    request: DiscoveryRequest,
    limits: DiscoveryLimits,
}

impl KeyDiscoveryJob {
    pub fn new(executor: Arc<dyn CommandExecutor>, request: DiscoveryRequest) -> Self {
        Self {
            executor,
            request,
            limits: DiscoveryLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: DiscoveryLimits) -> Self {
        self.limits = limits;
        self
    }

    /// The `MATCH` glob this job scans with
    pub fn pattern(&self) -> String {
        build_scan_match_pattern(self.request.query.as_deref(), self.request.prefix.as_deref())
    }

    /// Run in the background, registered in `registry` until done
    pub fn spawn(self, registry: &JobRegistry) -> JobHandle<DiscoveryBatch> {
        spawn_job(registry, move |job_id, token, tx| async move {
            self.run(job_id, token, &tx).await
        })
    }

    /// Drive the scan to its terminal event
    #[tracing::instrument(skip_all, fields(job_id = %job_id))]
    pub async fn run(
        &self,
        job_id: JobId,
        token: CancellationToken,
        sink: &dyn EventSink<DiscoveryBatch>,
    ) -> JobStatus {
        let emitter = Emitter::new(job_id, &token, sink);
        let pattern = self.pattern();
        let started = Instant::now();
        let mut state = ScanState::new(self.request.resume_cursor.as_deref());

        tracing::debug!(
            pattern = %pattern,
            cursor = %state.cursor,
            metadata = self.request.include_metadata,
            "key discovery started"
        );

        loop {
            if token.is_cancelled() {
                let continuation = Continuation::new(ContinuationHint::ResumeLater, &state.cursor);
                return emitter
                    .done(
                        JobStatus::Cancelled,
                        Some(state.summary(None)),
                        None,
                        Some(continuation),
                    )
                    .await;
            }
            if started.elapsed() >= self.limits.max_duration() {
                let continuation = Continuation::new(ContinuationHint::NarrowPrefix, &state.cursor);
                return emitter
                    .done(
                        JobStatus::LimitReached,
                        Some(state.summary(Some(CapReason::DiscoveryTimeLimit))),
                        None,
                        Some(continuation),
                    )
                    .await;
            }

            let page_cursor = state.cursor.clone();
            let scan = scan_keys(
                self.executor.as_ref(),
                &page_cursor,
                &pattern,
                self.limits.count_hint,
            )
            .await;
            let (next_cursor, keys) = match scan {
                Ok(page) => page,
                Err(e) => {
                    return emitter
                        .done(
                            JobStatus::Error,
                            Some(state.summary(None)),
                            Some(ErrorInfo::from(&e)),
                            None,
                        )
                        .await;
                }
            };

            state.scanned_count += keys.len() as u64;
            let remaining = self.limits.max_keys.saturating_sub(state.emitted_count);
            let mut fresh: Vec<Vec<u8>> = keys
                .into_iter()
                .filter(|key| state.seen.insert(key.clone()))
                .collect();
            fresh.sort();
            let dropped = fresh.len() > remaining;
            fresh.truncate(remaining);
            state.emitted_count += fresh.len();
            state.cursor = next_cursor;

            let key_capped =
                dropped || (state.emitted_count >= self.limits.max_keys && state.cursor != "0");
            let cap = key_capped.then_some(CapReason::DiscoveryKeyLimit);

            let items = fresh
                .iter()
                .map(|key| DiscoveryItem::from_bytes(key.clone()))
                .collect();
            emitter.progress(state.batch(items, cap)).await;

            if self.request.include_metadata && !fresh.is_empty() {
                self.enrich(fresh, &state, cap, &emitter).await;
            }

            if key_capped {
                // Keys dropped from this page are only seen again by rescanning it
                let resume_from = if dropped {
                    page_cursor
                } else {
                    state.cursor.clone()
                };
                let continuation = Continuation::new(ContinuationHint::RefineSearch, resume_from);
                return emitter
                    .done(
                        JobStatus::LimitReached,
                        Some(state.summary(cap)),
                        None,
                        Some(continuation),
                    )
                    .await;
            }
            if state.cursor == "0" {
                return emitter
                    .done(JobStatus::Completed, Some(state.summary(None)), None, None)
                    .await;
            }
        }
    }

    /// Fetch TYPE/TTL for `keys` through a bounded pool, emitting each
    /// result as it lands
    async fn enrich(
        &self,
        keys: Vec<Vec<u8>>,
        state: &ScanState,
        cap: Option<CapReason>,
        emitter: &Emitter<'_, DiscoveryBatch>,
    ) {
        let token = emitter.token();
        let lookups = keys.into_iter().map(|key| async move {
            // Lookups not yet started when cancellation lands stay pending
            if token.is_cancelled() {
                return None;
            }
            Some(self.lookup_metadata(key).await)
        });

        let mut results =
            futures::stream::iter(lookups).buffer_unordered(self.limits.metadata_concurrency.max(1));
        while let Some(result) = results.next().await {
            if let Some(item) = result {
                emitter.progress(state.batch(vec![item], cap)).await;
            }
        }
    }

    async fn lookup_metadata(&self, key: Vec<u8>) -> DiscoveryItem {
        let exec = self.executor.as_ref();
        let mut item = DiscoveryItem::from_bytes(key);

        match key_type(exec, item.key_bytes()).await {
            Ok(key_type) => item.key_type = Some(key_type),
            Err(e) => {
                tracing::warn!(key = %item.key, error_code = e.code(), "TYPE lookup failed");
                item.metadata_state = MetadataState::Unavailable;
                return item;
            }
        }

        match key_ttl(exec, item.key_bytes()).await {
            Ok(ttl) => {
                item.ttl_seconds = Some(ttl);
                item.metadata_state = MetadataState::Ready;
            }
            Err(e) => {
                tracing::warn!(key = %item.key, error_code = e.code(), "TTL lookup failed");
                item.metadata_state = MetadataState::Unavailable;
            }
        }
        item
    }
}

/// Counters and dedup set carried across iterations
struct ScanState {
    cursor: String,
    seen: HashSet<Vec<u8>>,
    scanned_count: u64,
    emitted_count: usize,
}

impl ScanState {
    fn new(resume_cursor: Option<&str>) -> Self {
        Self {
            cursor: resume_cursor
                .filter(|c| !c.is_empty())
                .unwrap_or("0")
                .to_string(),
            seen: HashSet::new(),
            scanned_count: 0,
            emitted_count: 0,
        }
    }

    fn batch(&self, items: Vec<DiscoveryItem>, cap: Option<CapReason>) -> DiscoveryBatch {
        DiscoveryBatch {
            items,
            scanned_count: self.scanned_count,
            emitted_count: self.emitted_count,
            cursor: self.cursor.clone(),
            cap_reached: cap.is_some(),
            cap_reason: cap,
        }
    }

    fn summary(&self, cap: Option<CapReason>) -> DiscoveryBatch {
        self.batch(Vec::new(), cap)
    }
}
