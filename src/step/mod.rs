//! Step runner: one external transformation per (artifact, variant tag).

pub mod command;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::StepError;

pub use command::CommandStepRunner;

/// Runs a single variant step for an input artifact.
///
/// Implementations block the calling worker slot until the step finishes.
/// `cancel` lets the owner stop a step early; runners that cannot stop
/// may ignore it.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Returns the produced artifact on success.
    async fn run(
        &self,
        artifact: &Path,
        tag: &str,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, StepError>;
}

/// Conventional output location: `<output_dir>/<stem>-<tag>.<ext>`.
///
/// `extension` of `None` reuses the input's extension; an input without one
/// yields a bare `<stem>-<tag>`.
pub fn expected_output_path(
    input: &Path,
    output_dir: &Path,
    tag: &str,
    extension: Option<&str>,
) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = extension
        .map(str::to_string)
        .or_else(|| input.extension().map(|e| e.to_string_lossy().into_owned()));

    let file_name = match ext {
        Some(ext) if !ext.is_empty() => format!("{stem}-{tag}.{ext}"),
        _ => format!("{stem}-{tag}"),
    };
    output_dir.join(file_name)
}
