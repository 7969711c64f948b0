//! In-memory job registry, the single source of truth for job status.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::JobError;
use crate::jobs::model::{Job, JobState, NewJob};

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, Job>,
    /// Registration order.
    order: Vec<Uuid>,
}

/// Maps job ids to job records behind one lock.
///
/// Every read returns a cloned snapshot taken under the lock, so callers
/// never see a half-applied update.
#[derive(Default)]
pub struct JobRegistry {
    inner: RwLock<Inner>,
}

impl JobRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new pending job and return its id.
    pub async fn register(&self, new: NewJob) -> Uuid {
        let job = Job::new(new);
        let id = job.id;

        let mut inner = self.inner.write().await;
        inner.order.push(id);
        inner.jobs.insert(id, job);

        debug!(job_id = %id, "Job registered");
        id
    }

    /// Get a snapshot of a job.
    pub async fn get(&self, id: Uuid) -> Result<Job, JobError> {
        self.inner
            .read()
            .await
            .jobs
            .get(&id)
            .cloned()
            .ok_or(JobError::NotFound { id })
    }

    /// Snapshot of all jobs in registration order.
    pub async fn list(&self) -> Vec<Job> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.jobs.get(id).cloned())
            .collect()
    }

    /// Apply a mutation to a stored job. Reserved for the executor.
    pub async fn update<F, R>(&self, id: Uuid, f: F) -> Result<R, JobError>
    where
        F: FnOnce(&mut Job) -> R,
    {
        let mut inner = self.inner.write().await;
        let job = inner.jobs.get_mut(&id).ok_or(JobError::NotFound { id })?;
        Ok(f(job))
    }

    /// Remove a job that never left `Pending`.
    ///
    /// Used when the worker pool refuses a submission, so the caller gets an
    /// error instead of an id for a job that will never run.
    pub async fn discard(&self, id: Uuid) -> Result<Job, JobError> {
        let mut inner = self.inner.write().await;
        let state = inner
            .jobs
            .get(&id)
            .map(|j| j.state)
            .ok_or(JobError::NotFound { id })?;

        if state != JobState::Pending {
            return Err(JobError::InvalidTransition {
                id,
                state,
                target: JobState::Pending,
            });
        }

        inner.order.retain(|o| *o != id);
        inner.jobs.remove(&id).ok_or(JobError::NotFound { id })
    }

    /// Number of registered jobs.
    pub async fn len(&self) -> usize {
        self.inner.read().await.jobs.len()
    }

    /// Whether no job has been registered.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Get summary of all jobs.
    pub async fn summary(&self) -> RegistrySummary {
        let inner = self.inner.read().await;

        let mut summary = RegistrySummary::default();
        for job in inner.jobs.values() {
            match job.state {
                JobState::Pending => summary.pending += 1,
                JobState::Running => summary.running += 1,
                JobState::Done => summary.done += 1,
                JobState::Failed => summary.failed += 1,
            }
        }

        summary.total = inner.jobs.len();
        summary
    }
}

/// Job counts per state.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RegistrySummary {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
}
