//! Submission and query surface of the job core.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::error::JobError;
use crate::jobs::executor::JobExecutor;
use crate::jobs::model::{Job, NewJob};
use crate::jobs::registry::{JobRegistry, RegistrySummary};
use crate::worker::WorkerPool;

/// Accepts submissions and answers status queries.
///
/// Submissions are registered as `Pending` and handed to the worker pool;
/// queries only read the registry and never wait on execution.
pub struct JobService {
    registry: Arc<JobRegistry>,
    executor: Arc<JobExecutor>,
    pool: Arc<WorkerPool>,
}

impl JobService {
    pub fn new(registry: Arc<JobRegistry>, executor: Arc<JobExecutor>, pool: Arc<WorkerPool>) -> Self {
        Self {
            registry,
            executor,
            pool,
        }
    }

    /// Register a job and schedule it. Returns as soon as it is queued.
    pub async fn submit_job(
        &self,
        artifact: impl Into<PathBuf>,
        tags: Vec<String>,
        notify: Option<String>,
    ) -> Result<Uuid, JobError> {
        let new = validate(artifact.into(), tags, notify)?;
        let id = self.registry.register(new).await;

        let executor = Arc::clone(&self.executor);
        let scheduled = self.pool.submit(id, move |cancel| async move {
            if let Err(e) = executor.run(id, cancel).await {
                error!(job_id = %id, error = %e, "Job could not be executed");
            }
        });

        if let Err(e) = scheduled {
            // Not started, so nobody else can have touched it.
            if let Err(discard) = self.registry.discard(id).await {
                error!(job_id = %id, error = %discard, "Failed to discard rejected job");
            }
            return Err(e);
        }

        info!(job_id = %id, "Job submitted");
        Ok(id)
    }

    /// Current snapshot of a job.
    pub async fn get_job(&self, id: Uuid) -> Result<Job, JobError> {
        self.registry.get(id).await
    }

    /// Snapshots of all jobs in submission order.
    pub async fn list_jobs(&self) -> Vec<Job> {
        self.registry.list().await
    }

    /// Job counts per state.
    pub async fn summary(&self) -> RegistrySummary {
        self.registry.summary().await
    }

    /// Stop accepting submissions and wait for queued jobs to finish.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}

/// Reject malformed submissions before anything is registered.
fn validate(artifact: PathBuf, tags: Vec<String>, notify: Option<String>) -> Result<NewJob, JobError> {
    if artifact.as_os_str().is_empty() {
        return Err(JobError::InvalidInput {
            reason: "artifact reference is missing".into(),
        });
    }

    if tags.is_empty() {
        return Err(JobError::InvalidInput {
            reason: "at least one variant tag is required".into(),
        });
    }

    let tags: Vec<String> = tags.into_iter().map(|t| t.trim().to_string()).collect();
    // Tags end up in output file names.
    if let Some(bad) = tags
        .iter()
        .find(|t| t.is_empty() || t.contains(['/', '\\']) || t.as_str() == "..")
    {
        return Err(JobError::InvalidInput {
            reason: format!("invalid variant tag {bad:?}"),
        });
    }

    let notify = notify.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());

    Ok(NewJob {
        artifact,
        tags,
        notify,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::PoolConfig;
    use crate::jobs::executor::tests::{PanickingRunner, ScriptedRunner};
    use crate::jobs::model::JobState;

    fn service(runner: Arc<ScriptedRunner>, pool: PoolConfig) -> JobService {
        let registry = Arc::new(JobRegistry::new());
        let executor = Arc::new(JobExecutor::new(Arc::clone(&registry), runner, None));
        JobService::new(registry, executor, WorkerPool::new(pool))
    }

    fn tags(tags: &[&str]) -> Vec<String> {
        tags.iter().map(|t| t.to_string()).collect()
    }

    async fn wait_terminal(service: &JobService, id: Uuid) -> Job {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let job = service.get_job(id).await.unwrap();
                if job.state.is_terminal() {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("job did not finish")
    }

    #[tokio::test]
    async fn empty_tags_are_rejected_without_registering() {
        let service = service(Arc::new(ScriptedRunner::default()), PoolConfig::default());

        let err = service.submit_job("doc.txt", vec![], None).await.unwrap_err();
        assert!(matches!(err, JobError::InvalidInput { .. }));
        assert!(service.list_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn missing_artifact_is_rejected() {
        let service = service(Arc::new(ScriptedRunner::default()), PoolConfig::default());

        let err = service.submit_job("", tags(&["tw"]), None).await.unwrap_err();
        assert!(matches!(err, JobError::InvalidInput { .. }));
        assert!(service.list_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn path_like_tags_are_rejected() {
        let service = service(Arc::new(ScriptedRunner::default()), PoolConfig::default());

        for bad in ["../etc", "a/b", "  ", ".."] {
            let err = service.submit_job("doc.txt", tags(&[bad]), None).await.unwrap_err();
            assert!(matches!(err, JobError::InvalidInput { .. }), "{bad:?} accepted");
        }
    }

    #[tokio::test]
    async fn submitted_job_is_pending_until_a_slot_frees() {
        let service = service(Arc::new(ScriptedRunner::default()), PoolConfig::default());

        // Hold the only slot so the submission cannot start.
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        service
            .pool
            .submit(Uuid::new_v4(), move |_| async move {
                let _ = release_rx.await;
            })
            .unwrap();

        let id = service.submit_job("doc.txt", tags(&["tw"]), None).await.unwrap();
        assert_eq!(service.get_job(id).await.unwrap().state, JobState::Pending);

        release_tx.send(()).unwrap();
        assert_eq!(wait_terminal(&service, id).await.state, JobState::Done);
    }

    #[tokio::test]
    async fn get_job_right_after_submit_never_misses() {
        let service = service(Arc::new(ScriptedRunner::default()), PoolConfig::default());

        let id = service.submit_job("doc.txt", tags(&["tw"]), None).await.unwrap();
        assert!(service.get_job(id).await.is_ok());
    }

    #[tokio::test]
    async fn scenario_two_languages_done() {
        let service = service(Arc::new(ScriptedRunner::default()), PoolConfig::default());

        let id = service
            .submit_job("uploads/doc.txt", tags(&["tw", "jp"]), None)
            .await
            .unwrap();
        let job = wait_terminal(&service, id).await;

        assert_eq!(job.state, JobState::Done);
        assert_eq!(
            job.produced,
            vec![PathBuf::from("outputs/doc-tw.txt"), PathBuf::from("outputs/doc-jp.txt")]
        );
    }

    #[tokio::test]
    async fn terminal_snapshot_is_stable() {
        let service = service(Arc::new(ScriptedRunner::failing(&["jp"])), PoolConfig::default());

        let id = service.submit_job("doc.txt", tags(&["tw", "jp"]), None).await.unwrap();
        let first = wait_terminal(&service, id).await;
        let second = service.get_job(id).await.unwrap();
        let third = service.get_job(id).await.unwrap();

        assert_eq!(first.state, JobState::Failed);
        assert_eq!(first, second);
        assert_eq!(second, third);
        assert_eq!(service.list_jobs().await.len(), 1);
    }

    #[tokio::test]
    async fn single_worker_finishes_j1_before_j2_starts() {
        let service = service(Arc::new(ScriptedRunner::default()), PoolConfig::default());

        let j1 = service
            .submit_job("one.txt", tags(&["a", "b", "c"]), None)
            .await
            .unwrap();
        let j2 = service.submit_job("two.txt", tags(&["a"]), None).await.unwrap();

        let first = wait_terminal(&service, j1).await;
        let second = wait_terminal(&service, j2).await;

        assert!(first.finished_at.unwrap() <= second.started_at.unwrap());
    }

    #[tokio::test]
    async fn rejected_submission_leaves_no_job() {
        let service = service(Arc::new(ScriptedRunner::default()), PoolConfig::default());
        service.shutdown().await;

        let err = service.submit_job("doc.txt", tags(&["tw"]), None).await.unwrap_err();
        assert!(matches!(err, JobError::PoolRejected { .. }));
        assert!(service.list_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn panicking_step_still_reaches_terminal_state() {
        let registry = Arc::new(JobRegistry::new());
        let executor = Arc::new(JobExecutor::new(
            Arc::clone(&registry),
            Arc::new(PanickingRunner { on: "tw" }),
            None,
        ));
        let service = JobService::new(registry, executor, WorkerPool::new(PoolConfig::default()));

        let first = service.submit_job("doc.txt", tags(&["tw"]), None).await.unwrap();
        let second = service.submit_job("doc.txt", tags(&["jp"]), None).await.unwrap();
        service.shutdown().await;

        let failed = service.get_job(first).await.unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.failure.unwrap().tag, "tw");
        // The slot is released, so later jobs still run.
        assert_eq!(service.get_job(second).await.unwrap().state, JobState::Done);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let service = service(Arc::new(ScriptedRunner::default()), PoolConfig::default());
        assert!(matches!(
            service.get_job(Uuid::new_v4()).await,
            Err(JobError::NotFound { .. })
        ));
    }
}
