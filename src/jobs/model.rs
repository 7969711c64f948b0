//! Job record and its state machine.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JobError;

/// State of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Queued, not yet claimed by a worker slot.
    Pending,
    /// The executor is running the job's steps.
    Running,
    /// Every variant step succeeded.
    Done,
    /// A variant step failed; later variants were skipped.
    Failed,
}

impl JobState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: JobState) -> bool {
        use JobState::*;

        matches!(
            (self, target),
            (Pending, Running) | (Running, Done) | (Running, Failed)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A state transition event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: JobState,
    pub to: JobState,
    pub timestamp: DateTime<Utc>,
}

/// Which variant failed and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureDetail {
    pub tag: String,
    pub error: String,
}

/// A validated submission, not yet registered.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub artifact: PathBuf,
    pub tags: Vec<String>,
    pub notify: Option<String>,
}

/// One tracked submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    /// Input handle; opaque to the core.
    pub artifact: PathBuf,
    /// Execution order. Duplicates run twice.
    pub tags: Vec<String>,
    pub notify: Option<String>,
    pub state: JobState,
    /// Only set once the job is `Failed`.
    pub failure: Option<FailureDetail>,
    /// One entry per succeeded tag, in tag order.
    pub produced: Vec<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub transitions: Vec<StateTransition>,
}

impl Job {
    /// Create a pending job with a fresh id.
    pub fn new(new: NewJob) -> Self {
        Self {
            id: Uuid::new_v4(),
            artifact: new.artifact,
            tags: new.tags,
            notify: new.notify,
            state: JobState::Pending,
            failure: None,
            produced: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            transitions: Vec::new(),
        }
    }

    /// Display name of the input artifact (its file name).
    pub fn display_name(&self) -> String {
        display_name(&self.artifact)
    }

    /// Tags that produced an artifact so far.
    pub fn succeeded_tags(&self) -> &[String] {
        &self.tags[..self.produced.len()]
    }

    /// Transition to a new state.
    pub fn transition_to(&mut self, target: JobState) -> Result<(), JobError> {
        if !self.state.can_transition_to(target) {
            return Err(JobError::InvalidTransition {
                id: self.id,
                state: self.state,
                target,
            });
        }

        let now = Utc::now();
        self.transitions.push(StateTransition {
            from: self.state,
            to: target,
            timestamp: now,
        });
        self.state = target;

        match target {
            JobState::Running => self.started_at = Some(now),
            JobState::Done | JobState::Failed => self.finished_at = Some(now),
            JobState::Pending => {}
        }

        Ok(())
    }

    /// Record a produced artifact for the next tag in order.
    pub fn record_output(&mut self, artifact: PathBuf) -> Result<(), JobError> {
        if self.state != JobState::Running || self.produced.len() >= self.tags.len() {
            return Err(JobError::InvalidTransition {
                id: self.id,
                state: self.state,
                target: JobState::Running,
            });
        }
        self.produced.push(artifact);
        Ok(())
    }

    /// Move to `Failed`, recording the failing tag.
    pub fn fail(&mut self, tag: impl Into<String>, error: impl Into<String>) -> Result<(), JobError> {
        self.transition_to(JobState::Failed)?;
        self.failure = Some(FailureDetail {
            tag: tag.into(),
            error: error.into(),
        });
        Ok(())
    }
}

/// File name of a path, falling back to the full path.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(tags: &[&str]) -> Job {
        Job::new(NewJob {
            artifact: PathBuf::from("uploads/doc.txt"),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            notify: None,
        })
    }

    #[test]
    fn state_transitions_valid() {
        assert!(JobState::Pending.can_transition_to(JobState::Running));
        assert!(JobState::Running.can_transition_to(JobState::Done));
        assert!(JobState::Running.can_transition_to(JobState::Failed));
    }

    #[test]
    fn state_transitions_invalid() {
        assert!(!JobState::Pending.can_transition_to(JobState::Done));
        assert!(!JobState::Pending.can_transition_to(JobState::Failed));
        assert!(!JobState::Done.can_transition_to(JobState::Running));
        assert!(!JobState::Done.can_transition_to(JobState::Pending));
        assert!(!JobState::Failed.can_transition_to(JobState::Running));
        assert!(!JobState::Running.can_transition_to(JobState::Pending));
    }

    #[test]
    fn terminal_states() {
        assert!(JobState::Done.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
    }

    #[test]
    fn transitions_stamp_times() {
        let mut job = job(&["tw"]);
        assert_eq!(job.state, JobState::Pending);
        assert!(job.started_at.is_none());

        job.transition_to(JobState::Running).unwrap();
        assert!(job.started_at.is_some());

        job.transition_to(JobState::Done).unwrap();
        assert!(job.finished_at.is_some());
        assert_eq!(job.transitions.len(), 2);
        assert_eq!(job.transitions[1].from, JobState::Running);
    }

    #[test]
    fn terminal_job_rejects_further_transitions() {
        let mut job = job(&["tw"]);
        job.transition_to(JobState::Running).unwrap();
        job.fail("tw", "boom").unwrap();

        let err = job.transition_to(JobState::Running).unwrap_err();
        assert!(matches!(
            err,
            JobError::InvalidTransition {
                state: JobState::Failed,
                target: JobState::Running,
                ..
            }
        ));
        assert_eq!(job.failure.as_ref().unwrap().tag, "tw");
    }

    #[test]
    fn produced_never_exceeds_tags() {
        let mut job = job(&["tw"]);
        assert!(job.record_output(PathBuf::from("x")).is_err());

        job.transition_to(JobState::Running).unwrap();
        job.record_output(PathBuf::from("outputs/doc-tw.txt")).unwrap();
        assert!(job.record_output(PathBuf::from("extra")).is_err());
        assert_eq!(job.succeeded_tags(), ["tw".to_string()]);
    }

    #[test]
    fn display_name_uses_file_name() {
        assert_eq!(job(&["a"]).display_name(), "doc.txt");
    }

    #[test]
    fn job_state_serde() {
        let json = serde_json::to_string(&JobState::Running).unwrap();
        assert_eq!(json, "\"running\"");
        let parsed: JobState = serde_json::from_str("\"done\"").unwrap();
        assert_eq!(parsed, JobState::Done);
    }
}
