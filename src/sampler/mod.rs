//! The sampling loop: fixed-cadence capture, batching, and flush scheduling.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::provider::{MetricsProvider, ProviderError};
use crate::sink::{FlushError, Sink};

/// One timestamped utilization measurement. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Wall-clock time at capture, local timezone.
    pub timestamp: DateTime<Local>,
    /// CPU utilization percentage. May exceed 100 for multi-threaded
    /// process targets.
    pub cpu_percent: f32,
    /// Memory utilization percentage in [0, 100].
    pub mem_percent: f32,
}

/// Bounded, ordered group of samples awaiting a durable write.
///
/// Insertion order is capture order. The container is owned by the sampler
/// until a flush boundary, where `take` hands the samples off and leaves a
/// fresh container behind.
#[derive(Debug)]
pub struct Batch {
    samples: Vec<Sample>,
    capacity: usize,
}

impl Batch {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Takes the accumulated samples, resetting to an empty container.
    pub fn take(&mut self) -> Vec<Sample> {
        std::mem::replace(&mut self.samples, Vec::with_capacity(self.capacity))
    }
}

/// Sampling loop configuration, derived from [`crate::config::Config`].
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub interval: Duration,
    pub batch_size: usize,
    pub flush_retries: u32,
    pub retry_backoff: Duration,
    pub max_pending_batches: usize,
}

/// Sampler owns the timing loop: it draws readings from the provider on a
/// fixed cadence, accumulates them into a batch, and flushes full batches to
/// the sink.
///
/// No tick or flush error terminates the loop; it runs until the
/// cancellation token fires, then performs a best-effort final flush.
pub struct Sampler<P, S> {
    cfg: SamplerConfig,
    provider: P,
    sink: S,
    batch: Batch,
    /// Batches that could not be flushed yet, oldest first. Bounded by
    /// `max_pending_batches`; the oldest is dropped when full.
    pending: VecDeque<Vec<Sample>>,
}

impl<P: MetricsProvider, S: Sink> Sampler<P, S> {
    pub fn new(cfg: SamplerConfig, provider: P, sink: S) -> Self {
        let batch = Batch::new(cfg.batch_size);
        Self {
            cfg,
            provider,
            sink,
            batch,
            pending: VecDeque::new(),
        }
    }

    /// Runs the sampling loop until `cancel` fires.
    ///
    /// Ticks are scheduled on a fixed cadence rather than relative to the
    /// previous tick's finish time, so provider latency does not accumulate
    /// as drift. A tick that lands while a flush retry is still backing off
    /// is skipped rather than bursted.
    pub async fn run(&mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.cfg.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            provider = self.provider.name(),
            sink = self.sink.name(),
            interval = ?self.cfg.interval,
            batch_size = self.cfg.batch_size,
            "sampler started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.final_flush().await;
                    info!("sampler stopped");
                    return;
                }

                _ = ticker.tick() => {
                    match self.capture() {
                        Ok(sample) => self.batch.push(sample),
                        Err(e) => {
                            warn!(error = %e, "provider read failed, skipping tick");
                        }
                    }

                    if self.batch.is_full() {
                        self.flush_cycle(&cancel).await;
                    }
                }
            }
        }
    }

    /// Captures one sample from the provider.
    fn capture(&mut self) -> Result<Sample, ProviderError> {
        let cpu_percent = self.provider.cpu_percent()?;
        let mem_percent = self.provider.mem_percent()?;

        Ok(Sample {
            timestamp: Local::now(),
            cpu_percent,
            mem_percent,
        })
    }

    /// Flushes parked batches (oldest first) and then the current batch.
    ///
    /// Log order must match capture order, so if a parked batch still cannot
    /// be flushed the current batch is parked behind it rather than written
    /// out of order.
    async fn flush_cycle(&mut self, cancel: &CancellationToken) {
        let batch = self.batch.take();

        while let Some(front) = self.pending.front() {
            match self.sink.flush(front).await {
                Ok(()) => {
                    debug!(samples = front.len(), "parked batch flushed");
                    self.pending.pop_front();
                }
                Err(e) => {
                    warn!(error = %e, parked = self.pending.len(), "parked batch still unflushable");
                    self.park(batch);
                    return;
                }
            }
        }

        match self.flush_with_retry(&batch, cancel).await {
            Ok(()) => {
                // Liveness signal: surface the newest durable sample.
                if let Some(last) = batch.last() {
                    info!(
                        samples = batch.len(),
                        cpu = last.cpu_percent,
                        mem = last.mem_percent,
                        "batch flushed",
                    );
                }
            }
            Err(e) if e.is_permanent() => {
                error!(error = %e, "flush failed permanently, parking batch");
                self.park(batch);
            }
            Err(e) => {
                warn!(error = %e, "flush retries exhausted, parking batch");
                self.park(batch);
            }
        }
    }

    /// Attempts a flush, retrying transient failures with doubling backoff.
    async fn flush_with_retry(
        &mut self,
        batch: &[Sample],
        cancel: &CancellationToken,
    ) -> Result<(), FlushError> {
        let mut backoff = self.cfg.retry_backoff;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self.sink.flush(batch).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_permanent() || attempt > self.cfg.flush_retries => return Err(e),
                Err(e) => {
                    warn!(error = %e, attempt, backoff = ?backoff, "flush failed, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(e),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = backoff.saturating_mul(2);
                }
            }
        }
    }

    /// Parks an unflushed batch, dropping the oldest when the cap is hit so
    /// memory stays bounded.
    fn park(&mut self, batch: Vec<Sample>) {
        if self.pending.len() >= self.cfg.max_pending_batches {
            if let Some(dropped) = self.pending.pop_front() {
                warn!(
                    samples = dropped.len(),
                    cap = self.cfg.max_pending_batches,
                    "pending cap reached, dropping oldest unflushed batch",
                );
            }
        }
        self.pending.push_back(batch);
    }

    /// Best-effort flush of parked batches and the partial batch on shutdown.
    ///
    /// Single attempt per batch; anything still unflushable is dropped, and
    /// order is preserved by stopping at the first failure.
    async fn final_flush(&mut self) {
        while let Some(front) = self.pending.front() {
            if let Err(e) = self.sink.flush(front).await {
                let lost: usize = self.pending.iter().map(Vec::len).sum::<usize>() + self.batch.len();
                warn!(error = %e, samples = lost, "final flush failed, dropping unflushed samples");
                return;
            }
            self.pending.pop_front();
        }

        if self.batch.is_empty() {
            return;
        }

        let batch = self.batch.take();
        match self.sink.flush(&batch).await {
            Ok(()) => info!(samples = batch.len(), "final partial batch flushed"),
            Err(e) => {
                warn!(error = %e, samples = batch.len(), "final flush failed, dropping partial batch");
            }
        }
    }
}
