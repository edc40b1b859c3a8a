use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::provider::{MetricsProvider, Provider};
use crate::sampler::Sampler;
use crate::sink::csv::CsvSink;

/// Agent orchestrates the components: metrics provider, sampling loop, and
/// the CSV sink.
pub struct Agent {
    cfg: Config,
    cancel: CancellationToken,
    sampler_task: Option<JoinHandle<()>>,
}

impl Agent {
    /// Creates a new Agent. Configuration is validated by the caller.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            cancel: CancellationToken::new(),
            sampler_task: None,
        }
    }

    /// Start sampling. Fails fast on an unreadable target or unusable log
    /// path, before the first tick.
    pub async fn start(&mut self) -> Result<()> {
        // 1. Build the metrics provider for the configured target.
        let provider =
            Provider::from_config(&self.cfg.target).context("creating metrics provider")?;
        info!(provider = provider.name(), "metrics provider ready");

        // 2. Build the sink and verify the log path is writable.
        let sink = CsvSink::new(self.cfg.log.path.clone());
        sink.probe()
            .with_context(|| format!("opening log file {}", self.cfg.log.path.display()))?;
        info!(path = %self.cfg.log.path.display(), "log file ready");

        // 3. Spawn the sampling loop.
        let mut sampler = Sampler::new(self.cfg.sampler_config(), provider, sink);
        let cancel = self.cancel.child_token();
        self.sampler_task = Some(tokio::spawn(async move {
            sampler.run(cancel).await;
        }));

        info!("agent started");
        Ok(())
    }

    /// Stop sampling, waiting for the final flush to complete.
    pub async fn stop(&mut self) -> Result<()> {
        self.cancel.cancel();

        if let Some(task) = self.sampler_task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "sampler task panicked");
            }
        }

        info!("agent stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::config::LogConfig;

    #[tokio::test]
    async fn test_start_rejects_unusable_log_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config {
            log: LogConfig {
                path: dir.path().join("no-such-dir").join("usage.csv"),
            },
            ..Default::default()
        };

        let mut agent = Agent::new(cfg);
        assert!(agent.start().await.is_err());
    }

    #[tokio::test]
    async fn test_start_rejects_missing_target_process() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = Config {
            log: LogConfig {
                path: dir.path().join("usage.csv"),
            },
            target: crate::config::TargetConfig::Process {
                pid: u32::MAX - 1,
            },
            ..Default::default()
        };

        let mut agent = Agent::new(cfg);
        assert!(agent.start().await.is_err());
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path: PathBuf = dir.path().join("usage.csv");
        let cfg = Config {
            log: LogConfig { path: path.clone() },
            ..Default::default()
        };

        let mut agent = Agent::new(cfg);
        agent.start().await.expect("agent starts");
        agent.stop().await.expect("agent stops");

        // The startup probe created the log even if no tick landed.
        assert!(path.exists());
    }
}
