//! End-to-end pipeline tests: scripted provider readings through the
//! sampling loop into a real CSV log on disk, on paused tokio time.

use std::collections::VecDeque;
use std::path::Path;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use resmon::provider::{MetricsProvider, ProviderError};
use resmon::sampler::{Sampler, SamplerConfig};
use resmon::sink::csv::{CsvSink, HEADER};

/// Provider fed a fixed per-tick script of (cpu, mem) readings; errors once
/// the script runs out.
struct ScriptedProvider {
    script: VecDeque<Result<(f32, f32), ProviderError>>,
    pending_mem: Option<f32>,
}

impl ScriptedProvider {
    fn new(script: Vec<Result<(f32, f32), ProviderError>>) -> Self {
        Self {
            script: script.into(),
            pending_mem: None,
        }
    }
}

impl MetricsProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn cpu_percent(&mut self) -> Result<f32, ProviderError> {
        match self.script.pop_front() {
            Some(Ok((cpu, mem))) => {
                self.pending_mem = Some(mem);
                Ok(cpu)
            }
            Some(Err(e)) => Err(e),
            None => Err(ProviderError::Unavailable("script exhausted")),
        }
    }

    fn mem_percent(&mut self) -> Result<f32, ProviderError> {
        self.pending_mem
            .take()
            .ok_or(ProviderError::Unavailable("cpu read first"))
    }
}

fn config(batch_size: usize) -> SamplerConfig {
    SamplerConfig {
        interval: Duration::from_secs(1),
        batch_size,
        flush_retries: 3,
        retry_backoff: Duration::from_millis(100),
        max_pending_batches: 8,
    }
}

async fn run_until(
    provider: ScriptedProvider,
    path: &Path,
    batch_size: usize,
    deadline: Duration,
) {
    let sink = CsvSink::new(path.to_path_buf());
    let mut sampler = Sampler::new(config(batch_size), provider, sink);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(deadline).await;
        trigger.cancel();
    });

    sampler.run(cancel).await;
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .expect("log should be readable")
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_full_batch_lands_in_log_with_header() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("usage.csv");

    let provider = ScriptedProvider::new(vec![
        Ok((10.0, 20.0)),
        Ok((15.0, 25.0)),
        Ok((99.9, 50.0)),
    ]);
    run_until(provider, &path, 3, Duration::from_secs(10)).await;

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], HEADER);
    assert!(lines[1].ends_with(",10.0,20.0"), "line: {}", lines[1]);
    assert!(lines[2].ends_with(",15.0,25.0"), "line: {}", lines[2]);
    assert!(lines[3].ends_with(",99.9,50.0"), "line: {}", lines[3]);

    // Timestamps are lexicographically ordered in this layout.
    let stamps: Vec<&str> = lines[1..]
        .iter()
        .map(|l| l.split(',').next().expect("time field"))
        .collect();
    for pair in stamps.windows(2) {
        assert!(pair[0] <= pair[1], "timestamps out of order: {pair:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_restart_appends_without_second_header() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("usage.csv");

    let first = ScriptedProvider::new(vec![
        Ok((1.0, 2.0)),
        Ok((3.0, 4.0)),
        Ok((5.0, 6.0)),
    ]);
    run_until(first, &path, 3, Duration::from_secs(10)).await;

    let second = ScriptedProvider::new(vec![
        Ok((7.0, 8.0)),
        Ok((9.0, 10.0)),
        Ok((11.0, 12.0)),
    ]);
    run_until(second, &path, 3, Duration::from_secs(10)).await;

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 7);
    assert_eq!(lines.iter().filter(|l| *l == HEADER).count(), 1);
    assert!(lines[1].ends_with(",1.0,2.0"));
    assert!(lines[6].ends_with(",11.0,12.0"));
}

#[tokio::test(start_paused = true)]
async fn test_provider_error_drops_tick_but_run_continues() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("usage.csv");

    let provider = ScriptedProvider::new(vec![
        Ok((10.0, 20.0)),
        Err(ProviderError::Unavailable("injected")),
        Ok((99.9, 50.0)),
    ]);
    // Batch never fills; cancellation flushes the two good samples.
    run_until(provider, &path, 30, Duration::from_millis(2500)).await;

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], HEADER);
    assert!(lines[1].ends_with(",10.0,20.0"));
    assert!(lines[2].ends_with(",99.9,50.0"));
}
