//! Job registry and cancellation tokens

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Unique identifier of a running job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generate a fresh random (v4) id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Cooperative cancellation flag shared between a job and its owner.
///
/// Jobs poll the flag at page and iteration boundaries only, so a command
/// already on the wire always finishes reading its reply.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Process-scoped map of running jobs.
///
/// Owned by the hosting application and handed to `spawn`. Clones share the
/// same map.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<JobId, CancellationToken>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job and hand back its id and cancellation token
    pub fn register(&self) -> (JobId, CancellationToken) {
        let id = JobId::new();
        let token = CancellationToken::new();
        self.jobs.write().insert(id, token.clone());
        tracing::debug!(job_id = %id, "job registered");
        (id, token)
    }

    /// Request cancellation; `false` if the job is unknown or already finished
    pub fn cancel(&self, id: &JobId) -> bool {
        match self.jobs.read().get(id) {
            Some(token) => {
                token.cancel();
                tracing::debug!(job_id = %id, "job cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Request cancellation of every running job, returning how many there were
    pub fn cancel_all(&self) -> usize {
        let jobs = self.jobs.read();
        for token in jobs.values() {
            token.cancel();
        }
        jobs.len()
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.jobs.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.read().is_empty()
    }

    /// Drop a finished job. Called once, after its terminal event.
    pub(crate) fn remove(&self, id: &JobId) -> bool {
        let removed = self.jobs.write().remove(id).is_some();
        if removed {
            tracing::debug!(job_id = %id, "job removed");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_cancel() {
        let registry = JobRegistry::new();
        let (id, token) = registry.register();

        assert!(registry.contains(&id));
        assert_eq!(registry.len(), 1);
        assert!(!token.is_cancelled());

        assert!(registry.cancel(&id));
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_cancel_unknown_job() {
        let registry = JobRegistry::new();
        assert!(!registry.cancel(&JobId::new()));
    }

    #[test]
    fn test_remove_happens_once() {
        let registry = JobRegistry::new();
        let (id, _token) = registry.register();

        assert!(registry.remove(&id));
        assert!(!registry.remove(&id));
        assert!(!registry.cancel(&id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_clones_share_jobs() {
        let registry = JobRegistry::new();
        let other = registry.clone();
        let (a, token_a) = registry.register();
        let (_b, token_b) = other.register();

        assert!(other.contains(&a));
        assert_eq!(other.cancel_all(), 2);
        assert!(token_a.is_cancelled() && token_b.is_cancelled());
    }

    #[test]
    fn test_job_id_serializes_as_uuid_string() {
        let id = JobId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        assert_eq!(id.as_uuid().get_version_num(), 4);
    }
}
