//! Single-key inspection job
//!
//! Looks up the key's type and TTL, then previews the value page by page
//! under the configured entry and byte budgets. Every piece of text that
//! leaves the job goes through the redaction engine first.

mod collections;
mod result;

pub use result::*;

use crate::events::Emitter;
use crate::handle::spawn_job;
use crate::{CancellationToken, EventSink, JobEvent, JobHandle, JobId, JobRegistry, JobStatus};
use async_trait::async_trait;
use keyscope_core::{
    CapReason, CommandExecutor, ErrorInfo, InspectorLimits, KeyscopeError, RespValue, Result,
    key_command,
};
use keyscope_driver_redis::{KeyType, key_ttl, key_type};
use keyscope_redact::RedactionEngine;
use parking_lot::Mutex;
use std::sync::Arc;

/// Reason reported for keys that do not exist
pub const MISSING_KEY_REASON: &str = "Key does not exist.";

/// How a preview branch ended, with the last result it built
type Outcome = (JobStatus, InspectionResult);

/// Forwards events, keeping a copy of the latest progress payload
struct LastProgress<'a> {
    sink: &'a dyn EventSink<InspectionResult>,
    last: Mutex<Option<InspectionResult>>,
}

impl<'a> LastProgress<'a> {
    fn new(sink: &'a dyn EventSink<InspectionResult>) -> Self {
        Self {
            sink,
            last: Mutex::new(None),
        }
    }

    fn take(&self) -> Option<InspectionResult> {
        self.last.lock().take()
    }
}

#[async_trait]
impl<'a> EventSink<InspectionResult> for LastProgress<'a> {
    async fn emit(&self, event: JobEvent<InspectionResult>) -> bool {
        if let JobEvent::Progress { payload, .. } = &event {
            *self.last.lock() = Some(payload.clone());
        }
        self.sink.emit(event).await
    }
}

/// Paginated, redacted preview of one key
pub struct InspectorJob {
    executor: Arc<dyn CommandExecutor>,
    /// Key bytes as sent to the server
    key: Vec<u8>,
    /// Printable key for results and logs
    display_key: String,
    limits: InspectorLimits,
    engine: RedactionEngine,
}

impl InspectorJob {
    /// `key` may be any bytes, e.g. [`DiscoveryItem::key_bytes`] of a key
    /// that is not valid UTF-8
    ///
    /// [`DiscoveryItem::key_bytes`]: crate::DiscoveryItem::key_bytes
    pub fn new(executor: Arc<dyn CommandExecutor>, key: impl Into<Vec<u8>>) -> Self {
        let key = key.into();
        Self {
            executor,
            display_key: String::from_utf8_lossy(&key).into_owned(),
            key,
            limits: InspectorLimits::default(),
            engine: RedactionEngine::new(),
        }
    }

    pub fn with_limits(mut self, limits: InspectorLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn key(&self) -> &str {
        &self.display_key
    }

    /// Run in the background, registered in `registry` until done
    pub fn spawn(self, registry: &JobRegistry) -> JobHandle<InspectionResult> {
        spawn_job(registry, move |job_id, token, tx| async move {
            self.run(job_id, token, &tx).await
        })
    }

    /// Drive the inspection to its terminal event
    #[tracing::instrument(skip_all, fields(job_id = %job_id))]
    pub async fn run(
        &self,
        job_id: JobId,
        token: CancellationToken,
        sink: &dyn EventSink<InspectionResult>,
    ) -> JobStatus {
        let sink = LastProgress::new(sink);
        let emitter = Emitter::new(job_id, &token, &sink);
        match self.inspect(&emitter).await {
            Ok((status, result)) => emitter.done(status, Some(result), None, None).await,
            Err(e) => {
                // Pages fetched before the failure are still worth showing
                let partial = sink.take().map(InspectionResult::into_partial);
                emitter
                    .done(JobStatus::Error, partial, Some(ErrorInfo::from(&e)), None)
                    .await
            }
        }
    }

    async fn inspect(&self, emitter: &Emitter<'_, InspectionResult>) -> Result<Outcome> {
        let exec = self.executor.as_ref();
        let key_type = key_type(exec, &self.key).await?;
        let ttl = match key_ttl(exec, &self.key).await {
            Ok(ttl) => Some(ttl),
            Err(e) => {
                tracing::warn!(error_code = e.code(), "TTL lookup failed, previewing without it");
                None
            }
        };

        tracing::debug!(key_type = %key_type, "inspecting key");
        match key_type {
            KeyType::None => Ok((JobStatus::Completed, self.missing(ttl))),
            KeyType::String => self.inspect_string(ttl, emitter).await,
            KeyType::Hash => self.inspect_hash(ttl, emitter).await,
            KeyType::List => self.inspect_list(ttl, emitter).await,
            KeyType::Set => self.inspect_set(ttl, emitter).await,
            KeyType::Zset => self.inspect_zset(ttl, emitter).await,
            KeyType::Stream => self.inspect_stream(ttl, emitter).await,
        }
    }

    fn missing(&self, ttl: Option<i64>) -> InspectionResult {
        InspectionResult::None(MissingKey {
            key: self.display_key.clone(),
            status: PreviewStatus::new(ttl),
            reason: MISSING_KEY_REASON.to_string(),
        })
    }

    async fn inspect_string(
        &self,
        ttl: Option<i64>,
        emitter: &Emitter<'_, InspectionResult>,
    ) -> Result<Outcome> {
        let reply = self
            .executor
            .execute(&key_command("GET", &self.key, &[]))
            .await?;
        let bytes = match reply {
            // Deleted between TYPE and GET
            RespValue::Null => return Ok((JobStatus::Completed, self.missing(ttl))),
            RespValue::BulkString(bytes) => bytes,
            RespValue::Error(message) => return Err(KeyscopeError::CommandFailed(message)),
            other => {
                return Err(KeyscopeError::invalid_response(
                    "GET",
                    format!("expected a bulk string, got {}", other.kind()),
                ));
            }
        };

        let text = String::from_utf8_lossy(&bytes);
        let bounded = self.engine.redact_bounded(&text, self.limits.max_bytes);
        let cap = bounded.truncated.then_some(CapReason::StringPreviewLimit);

        let mut status = PreviewStatus::new(ttl).with_cap(cap);
        status.is_partial = bounded.truncated;
        status.has_more = bounded.truncated;
        status.fetched_count = 1;

        let result = InspectionResult::String(StringPreview {
            key: self.display_key.clone(),
            status,
            total_bytes: bytes.len(),
            value: bounded.text,
            redaction: bounded.metadata,
        });
        emitter.progress(result.clone()).await;
        Ok((JobStatus::Completed, result))
    }
}
