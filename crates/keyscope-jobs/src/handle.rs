//! Spawned jobs as event streams

use crate::{CancellationToken, JobEvent, JobId, JobRegistry, JobStatus};
use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// Events buffered between a job and a slow consumer
const EVENT_BUFFER: usize = 64;

/// A job running on the tokio runtime.
///
/// Yields the job's events in order and ends after the `done` event. The
/// registry entry goes away shortly after. Dropping the handle cancels the
/// job the next time it tries to emit.
pub struct JobHandle<P> {
    job_id: JobId,
    token: CancellationToken,
    events: mpsc::Receiver<JobEvent<P>>,
}

impl<P> JobHandle<P> {
    pub fn id(&self) -> JobId {
        self.job_id
    }

    /// Request cancellation without waiting for the job to stop
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl<P> std::fmt::Debug for JobHandle<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("job_id", &self.job_id)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl<P> Stream for JobHandle<P> {
    type Item = JobEvent<P>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().events.poll_recv(cx)
    }
}

/// Register a job, run it in the background and return its event stream.
///
/// The registry entry is removed right after `run` returns, i.e. after the
/// job's terminal event has been queued.
pub(crate) fn spawn_job<P, F, Fut>(registry: &JobRegistry, run: F) -> JobHandle<P>
where
    P: Send + 'static,
    F: FnOnce(JobId, CancellationToken, mpsc::Sender<JobEvent<P>>) -> Fut,
    Fut: Future<Output = JobStatus> + Send + 'static,
{
    let (job_id, token) = registry.register();
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let job = run(job_id, token.clone(), tx);

    let registry = registry.clone();
    tokio::spawn(async move {
        let status = job.await;
        registry.remove(&job_id);
        tracing::debug!(job_id = %job_id, status = %status, "job task exited");
    });

    JobHandle {
        job_id,
        token,
        events: rx,
    }
}
