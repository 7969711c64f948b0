//! Completion notices.
//!
//! The executor hands a composed [`Notification`] to a [`Notifier`] once a job
//! is done. Delivery is best-effort: errors are logged by the caller and never
//! change the job's state.

pub mod smtp;

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Local;

use crate::error::NotifyError;
use crate::jobs::model::display_name;

pub use smtp::{SmtpConfig, SmtpNotifier};

/// What a finished job reports to its submitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Recipient address.
    pub to: String,
    /// Display name of the original input.
    pub original_name: String,
    /// Produced artifacts, in tag order.
    pub artifacts: Vec<PathBuf>,
    /// Tags that succeeded, in order.
    pub tags: Vec<String>,
}

impl Notification {
    pub fn subject(&self) -> String {
        format!("Translation finished: {}", self.original_name)
    }

    /// Plain-text body listing every produced artifact next to its tag.
    pub fn body(&self, include_timestamp: bool) -> String {
        let mut body = format!(
            "Your file \"{}\" has been processed for {} variant(s): {}.\n\n",
            self.original_name,
            self.tags.len(),
            self.tags.join(", ")
        );

        for (tag, artifact) in self.tags.iter().zip(&self.artifacts) {
            body.push_str(&format!("  [{tag}] {}\n", display_name(artifact)));
        }

        if include_timestamp {
            let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
            body.push_str(&format!("\n\nTime: {timestamp}"));
        }

        body
    }
}

/// Delivers completion notices.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}
