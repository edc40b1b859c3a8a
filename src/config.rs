use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::sampler::SamplerConfig;

/// Top-level configuration for the resmon sampler.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Spacing between samples. Default: 1s.
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Samples accumulated before a flush. Default: 30.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Target log file configuration.
    #[serde(default)]
    pub log: LogConfig,

    /// Flush failure policy configuration.
    #[serde(default)]
    pub flush: FlushConfig,

    /// Sampling target (whole system or a single process).
    #[serde(default)]
    pub target: TargetConfig,
}

/// Target log file configuration.
#[derive(Debug, Deserialize)]
pub struct LogConfig {
    /// Path to the CSV log. Opened append-create, so repeated runs keep
    /// accumulating into the same file.
    #[serde(default = "default_log_path")]
    pub path: PathBuf,
}

/// Flush failure policy configuration.
#[derive(Debug, Deserialize)]
pub struct FlushConfig {
    /// Transient-failure retries per batch. Default: 3.
    #[serde(default = "default_flush_retries")]
    pub retries: u32,

    /// Initial retry backoff, doubled per attempt. Default: 500ms.
    #[serde(default = "default_retry_backoff", with = "humantime_serde")]
    pub retry_backoff: Duration,

    /// Unflushed batches kept in memory before the oldest is dropped.
    /// Default: 8.
    #[serde(default = "default_max_pending_batches")]
    pub max_pending_batches: usize,
}

/// Sampling target selection.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetConfig {
    /// Whole-system utilization.
    #[default]
    System,
    /// A single process, identified by PID.
    Process { pid: u32 },
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_batch_size() -> usize {
    30
}

fn default_log_path() -> PathBuf {
    PathBuf::from("process_monitor.csv")
}

fn default_flush_retries() -> u32 {
    3
}

fn default_retry_backoff() -> Duration {
    Duration::from_millis(500)
}

fn default_max_pending_batches() -> usize {
    8
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            interval: default_interval(),
            batch_size: default_batch_size(),
            log: LogConfig::default(),
            flush: FlushConfig::default(),
            target: TargetConfig::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: default_log_path(),
        }
    }
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            retries: default_flush_retries(),
            retry_backoff: default_retry_backoff(),
            max_pending_batches: default_max_pending_batches(),
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            bail!("interval must be positive");
        }

        if self.batch_size == 0 {
            bail!("batch_size must be positive");
        }

        if self.log.path.as_os_str().is_empty() {
            bail!("log.path is required");
        }

        if self.flush.max_pending_batches == 0 {
            bail!("flush.max_pending_batches must be positive");
        }

        if let TargetConfig::Process { pid } = self.target {
            if pid == 0 {
                bail!("target.pid must be positive");
            }
        }

        Ok(())
    }

    /// Derive the sampler loop configuration.
    pub fn sampler_config(&self) -> SamplerConfig {
        SamplerConfig {
            interval: self.interval,
            batch_size: self.batch_size,
            flush_retries: self.flush.retries,
            retry_backoff: self.flush.retry_backoff,
            max_pending_batches: self.flush.max_pending_batches,
        }
    }
}
