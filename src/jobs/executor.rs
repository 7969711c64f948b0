//! Drives one job from `Pending` to a terminal state.
//!
//! Variant steps run strictly in tag order. The first failing step fails the
//! whole job and the remaining tags are never attempted. A fully successful
//! job with a notification target triggers one completion notice; delivery
//! problems are logged and never touch the job record.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{JobError, StepError};
use crate::jobs::model::{Job, JobState};
use crate::jobs::registry::JobRegistry;
use crate::notify::{Notification, Notifier};
use crate::step::StepRunner;

/// Runs jobs against a step runner and records progress in the registry.
pub struct JobExecutor {
    registry: Arc<JobRegistry>,
    runner: Arc<dyn StepRunner>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl JobExecutor {
    pub fn new(
        registry: Arc<JobRegistry>,
        runner: Arc<dyn StepRunner>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            registry,
            runner,
            notifier,
        }
    }

    /// Execute a registered job and return its terminal state.
    ///
    /// Errors only when the job is unknown or not `Pending`; step failures
    /// are recorded on the job and reported as `Ok(JobState::Failed)`.
    pub async fn run(&self, id: Uuid, cancel: CancellationToken) -> Result<JobState, JobError> {
        let job = self
            .registry
            .update(id, |job| job.transition_to(JobState::Running).map(|()| job.clone()))
            .await??;

        info!(job_id = %id, artifact = %job.artifact.display(), tags = ?job.tags, "Job started");

        for tag in &job.tags {
            // A panicking runner still has to leave the job terminal.
            let outcome = AssertUnwindSafe(self.runner.run(&job.artifact, tag, &cancel))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(StepError::Panicked(panic_message(panic.as_ref()))));

            match outcome {
                Ok(produced) => {
                    self.registry
                        .update(id, |job| job.record_output(produced))
                        .await??;
                }
                Err(e) => {
                    warn!(job_id = %id, tag = %tag, error = %e, "Step failed, aborting job");
                    self.registry
                        .update(id, |job| job.fail(tag.as_str(), e.to_string()))
                        .await??;
                    return Ok(JobState::Failed);
                }
            }
        }

        let done = self
            .registry
            .update(id, |job| job.transition_to(JobState::Done).map(|()| job.clone()))
            .await??;

        info!(job_id = %id, produced = done.produced.len(), "Job done");
        self.send_notification(&done).await;

        Ok(JobState::Done)
    }

    /// Best-effort completion notice for a `Done` job.
    async fn send_notification(&self, job: &Job) {
        let Some(to) = job.notify.as_ref() else {
            return;
        };
        if job.produced.is_empty() {
            return;
        }
        let Some(notifier) = self.notifier.as_ref() else {
            warn!(job_id = %job.id, to = %to, "Notification requested but no notifier is configured");
            return;
        };

        let notification = Notification {
            to: to.clone(),
            original_name: job.display_name(),
            artifacts: job.produced.clone(),
            tags: job.succeeded_tags().to_vec(),
        };

        match AssertUnwindSafe(notifier.notify(&notification)).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(job_id = %job.id, to = %to, error = %e, "Completion notification failed");
            }
            Err(panic) => {
                error!(
                    job_id = %job.id,
                    to = %to,
                    panic = %panic_message(panic.as_ref()),
                    "Notifier panicked"
                );
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
