//! Step runner backed by a child process.
//!
//! The program is spawned once per variant with an argument template
//! (`{input}`, `{output_dir}`, `{tag}`), and:
//! - exit code zero is success
//! - any other exit, a signal, or a spawn error is a failure
//! - the step is killed on timeout or cancellation

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::StepConfig;
use crate::error::StepError;
use crate::step::{StepRunner, expected_output_path};

/// Maximum stderr kept in a failure summary.
const MAX_STDERR_SIZE: usize = 2 * 1024;

/// Runs the configured external program for each step.
#[derive(Debug, Clone)]
pub struct CommandStepRunner {
    config: StepConfig,
}

impl CommandStepRunner {
    pub fn new(config: StepConfig) -> Self {
        Self { config }
    }

    /// Expected output for `input` and `tag` under this runner's config.
    pub fn output_path(&self, input: &Path, tag: &str) -> PathBuf {
        expected_output_path(
            input,
            &self.config.output_dir,
            tag,
            self.config.output_extension.as_deref(),
        )
    }

    /// Substitute placeholders in the argument template.
    fn render_args(&self, input: &Path, tag: &str) -> Vec<String> {
        let input = input.to_string_lossy();
        let output_dir = self.config.output_dir.to_string_lossy();
        self.config
            .args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input)
                    .replace("{output_dir}", &output_dir)
                    .replace("{tag}", tag)
            })
            .collect()
    }
}

#[async_trait]
impl StepRunner for CommandStepRunner {
    async fn run(
        &self,
        artifact: &Path,
        tag: &str,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, StepError> {
        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .map_err(StepError::Prepare)?;

        let args = self.render_args(artifact, tag);
        info!(program = %self.config.program, ?args, tag, "Spawning step");

        let child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| StepError::Launch {
                program: self.config.program.clone(),
                source,
            })?;

        // Dropping the wait future drops the child, which kills it.
        let wait = child.wait_with_output();
        let output = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(tag, "Step cancelled, killing child process");
                return Err(StepError::Cancelled);
            }
            result = async {
                match self.config.timeout {
                    Some(limit) => match tokio::time::timeout(limit, wait).await {
                        Ok(waited) => waited.map_err(StepError::Wait),
                        Err(_) => Err(StepError::Timeout(limit)),
                    },
                    None => wait.await.map_err(StepError::Wait),
                }
            } => result?,
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!(tag, stdout = %stdout.trim_end(), "Step output");
        }

        if !output.status.success() {
            let stderr = tail(&String::from_utf8_lossy(&output.stderr));
            return Err(match output.status.code() {
                Some(code) => StepError::NonZeroExit { code, stderr },
                None => StepError::Signalled { stderr },
            });
        }

        let expected = self.output_path(artifact, tag);
        if !tokio::fs::try_exists(&expected).await.unwrap_or(false) {
            if self.config.strict_outputs {
                return Err(StepError::MissingOutput { expected });
            }
            warn!(
                tag,
                expected = %expected.display(),
                "Step exited cleanly but expected output is missing"
            );
        }

        info!(tag, output = %expected.display(), "Step finished");
        Ok(expected)
    }
}

/// Keep the last `MAX_STDERR_SIZE` bytes of trimmed stderr.
fn tail(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.len() <= MAX_STDERR_SIZE {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - MAX_STDERR_SIZE;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &trimmed[start..])
}
