//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// How the external transformation step is invoked.
#[derive(Debug, Clone)]
pub struct StepConfig {
    /// Executable to spawn for each variant.
    pub program: String,
    /// Argument template; `{input}`, `{output_dir}` and `{tag}` are substituted.
    pub args: Vec<String>,
    /// Directory the step writes its outputs into.
    pub output_dir: PathBuf,
    /// Expected output extension (without dot). `None` keeps the input's.
    pub output_extension: Option<String>,
    /// Treat a zero exit without the expected output as a failure.
    pub strict_outputs: bool,
    /// Kill the step after this long.
    pub timeout: Option<Duration>,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            program: "./transform".to_string(),
            args: default_step_args(),
            output_dir: PathBuf::from("outputs"),
            output_extension: None,
            strict_outputs: false,
            timeout: None,
        }
    }
}

fn default_step_args() -> Vec<String> {
    vec![
        "{input}".to_string(),
        "{output_dir}".to_string(),
        "{tag}".to_string(),
    ]
}

impl StepConfig {
    /// Build from `TASKHUB_STEP_*` / `TASKHUB_OUTPUT_*` variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let args = std::env::var("TASKHUB_STEP_ARGS")
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or(defaults.args);

        let output_extension = std::env::var("TASKHUB_OUTPUT_EXT")
            .ok()
            .map(|s| s.trim_start_matches('.').to_string())
            .filter(|s| !s.is_empty());

        let timeout = parse_env::<u64>("TASKHUB_STEP_TIMEOUT_SECS")?.map(Duration::from_secs);

        Ok(Self {
            program: std::env::var("TASKHUB_STEP_PROGRAM").unwrap_or(defaults.program),
            args,
            output_dir: std::env::var("TASKHUB_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            output_extension,
            strict_outputs: parse_env::<bool>("TASKHUB_STRICT_OUTPUTS")?.unwrap_or(false),
            timeout,
        })
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Jobs executed at the same time. One gives strict FIFO execution.
    pub max_concurrent_jobs: usize,
    /// Accepted-but-not-started submissions before new ones are rejected.
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 1,
            queue_capacity: 256,
        }
    }
}

impl PoolConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            max_concurrent_jobs: parse_env("TASKHUB_MAX_CONCURRENT_JOBS")?
                .unwrap_or(defaults.max_concurrent_jobs),
            queue_capacity: parse_env("TASKHUB_QUEUE_CAPACITY")?
                .unwrap_or(defaults.queue_capacity),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TASKHUB_MAX_CONCURRENT_JOBS".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "TASKHUB_QUEUE_CAPACITY".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub upload_dir: PathBuf,
    /// Rolling log files go here when set.
    pub log_dir: Option<PathBuf>,
    pub step: StepConfig,
    pub pool: PoolConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 3030,
            upload_dir: PathBuf::from("uploads"),
            log_dir: None,
            step: StepConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            port: parse_env("TASKHUB_PORT")?.unwrap_or(defaults.port),
            upload_dir: std::env::var("TASKHUB_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.upload_dir),
            log_dir: std::env::var("TASKHUB_LOG_DIR").ok().map(PathBuf::from),
            step: StepConfig::from_env()?,
            pool: PoolConfig::from_env()?,
        })
    }
}

/// Read and parse an optional variable. Unset or empty gives `None`.
pub(crate) fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_var(key, std::env::var(key).ok())
}

/// Parse an already looked-up variable. `None` or blank gives `None`.
pub(crate) fn parse_var<T>(key: &str, raw: Option<String>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) if !raw.trim().is_empty() => parse_value(key, &raw).map(Some),
        _ => Ok(None),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?}: {e}"),
    })
}
