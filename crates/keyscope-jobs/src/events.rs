//! Job event contract
//!
//! Every job reports through an [`EventSink`]: zero or more `progress`
//! events with status `running`, then exactly one `done` event carrying the
//! terminal status. Serialized events look like:
//!
//! ```json
//! {"event":"progress","job_id":"…","status":"running","payload":{…}}
//! {"event":"done","job_id":"…","status":"limit-reached","payload":{…},
//!  "continuation":{"hint":"refine-search","cursor":"1792"}}
//! ```

use crate::{CancellationToken, JobId};
use async_trait::async_trait;
use keyscope_core::ErrorInfo;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Lifecycle status carried by every event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Running,
    /// The work ran to the end (cursor exhausted, value fully read)
    Completed,
    /// Cancellation was observed at a page boundary
    Cancelled,
    /// A time or key-count budget stopped the job
    LimitReached,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::LimitReached => "limit-reached",
            JobStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the operator can do about a job that stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContinuationHint {
    /// Cancelled; rerun with the cursor to pick up where it stopped
    ResumeLater,
    /// Too many matches; use a narrower query
    RefineSearch,
    /// Ran out of time; scope the scan to a longer prefix
    NarrowPrefix,
}

/// Guidance attached to a `done` event that did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Continuation {
    pub hint: ContinuationHint,
    /// Cursor to resume the scan from
    pub cursor: String,
}

impl Continuation {
    pub fn new(hint: ContinuationHint, cursor: impl Into<String>) -> Self {
        Self {
            hint,
            cursor: cursor.into(),
        }
    }
}

/// One event emitted by a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent<P> {
    Progress {
        job_id: JobId,
        status: JobStatus,
        payload: P,
    },
    Done {
        job_id: JobId,
        status: JobStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<P>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorInfo>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        continuation: Option<Continuation>,
    },
}

impl<P> JobEvent<P> {
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::Progress { job_id, .. } | JobEvent::Done { job_id, .. } => *job_id,
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            JobEvent::Progress { status, .. } | JobEvent::Done { status, .. } => *status,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, JobEvent::Done { .. })
    }

    pub fn payload(&self) -> Option<&P> {
        match self {
            JobEvent::Progress { payload, .. } => Some(payload),
            JobEvent::Done { payload, .. } => payload.as_ref(),
        }
    }
}

/// Where a job delivers its events
#[async_trait]
pub trait EventSink<P: Send + 'static>: Send + Sync {
    /// Deliver one event. Returns `false` once nobody is listening, which
    /// the job treats as a cancellation request.
    async fn emit(&self, event: JobEvent<P>) -> bool;
}

#[async_trait]
impl<P: Send + 'static> EventSink<P> for mpsc::Sender<JobEvent<P>> {
    async fn emit(&self, event: JobEvent<P>) -> bool {
        self.send(event).await.is_ok()
    }
}

/// Stamps events with the job's id and turns a closed sink into cancellation
pub(crate) struct Emitter<'a, P: Send + 'static> {
    job_id: JobId,
    token: &'a CancellationToken,
    sink: &'a dyn EventSink<P>,
}

impl<'a, P: Send + 'static> Emitter<'a, P> {
    pub(crate) fn new(
        job_id: JobId,
        token: &'a CancellationToken,
        sink: &'a dyn EventSink<P>,
    ) -> Self {
        Self {
            job_id,
            token,
            sink,
        }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        self.token
    }

    pub(crate) async fn progress(&self, payload: P) {
        let event = JobEvent::Progress {
            job_id: self.job_id,
            status: JobStatus::Running,
            payload,
        };
        if !self.sink.emit(event).await && !self.token.is_cancelled() {
            tracing::debug!(job_id = %self.job_id, "event receiver dropped, cancelling job");
            self.token.cancel();
        }
    }

    pub(crate) async fn done(
        &self,
        status: JobStatus,
        payload: Option<P>,
        error: Option<ErrorInfo>,
        continuation: Option<Continuation>,
    ) -> JobStatus {
        match &error {
            Some(error) => tracing::warn!(
                job_id = %self.job_id,
                error_code = %error.code,
                "job failed"
            ),
            None => tracing::debug!(job_id = %self.job_id, status = %status, "job finished"),
        }
        let event = JobEvent::Done {
            job_id: self.job_id,
            status,
            payload,
            error,
            continuation,
        };
        self.sink.emit(event).await;
        status
    }
}
