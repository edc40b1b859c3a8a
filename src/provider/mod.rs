use sysinfo::{CpuRefreshKind, MemoryRefreshKind, Pid, ProcessesToUpdate, RefreshKind, System};
use thiserror::Error;
use tracing::debug;

use crate::config::TargetConfig;

/// A failed metrics read. Transient at tick granularity: the sampler skips
/// the tick and keeps running.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("target process {0} not found")]
    ProcessNotFound(u32),

    #[error("metrics unavailable: {0}")]
    Unavailable(&'static str),
}

/// Point-in-time utilization readings.
///
/// `cpu_percent` is relative to total system capacity for the system target,
/// and relative to a single core for process targets (so it may exceed 100 on
/// multi-core saturation). `mem_percent` is always in [0, 100].
pub trait MetricsProvider: Send {
    /// Returns the provider's name for logging.
    fn name(&self) -> &str;

    /// Current CPU utilization as a percentage.
    fn cpu_percent(&mut self) -> Result<f32, ProviderError>;

    /// Current memory utilization as a percentage.
    fn mem_percent(&mut self) -> Result<f32, ProviderError>;
}

/// Provider dispatching to the system-wide or per-process backend.
///
/// Enum dispatch rather than trait objects, so the sampler stays generic
/// without boxing.
pub enum Provider {
    System(SystemProvider),
    Process(ProcessProvider),
}

impl Provider {
    /// Builds the provider selected by the target configuration.
    ///
    /// A missing target process is a startup error, reported before the
    /// sampling loop begins.
    pub fn from_config(target: &TargetConfig) -> Result<Self, ProviderError> {
        match target {
            TargetConfig::System => Ok(Self::System(SystemProvider::new())),
            TargetConfig::Process { pid } => Ok(Self::Process(ProcessProvider::new(*pid)?)),
        }
    }
}

impl MetricsProvider for Provider {
    fn name(&self) -> &str {
        match self {
            Self::System(p) => p.name(),
            Self::Process(p) => p.name(),
        }
    }

    fn cpu_percent(&mut self) -> Result<f32, ProviderError> {
        match self {
            Self::System(p) => p.cpu_percent(),
            Self::Process(p) => p.cpu_percent(),
        }
    }

    fn mem_percent(&mut self) -> Result<f32, ProviderError> {
        match self {
            Self::System(p) => p.mem_percent(),
            Self::Process(p) => p.mem_percent(),
        }
    }
}

/// Whole-system CPU and memory utilization.
pub struct SystemProvider {
    sys: System,
}

impl SystemProvider {
    pub fn new() -> Self {
        let refresh = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
            .with_memory(MemoryRefreshKind::everything());
        let mut sys = System::new_with_specifics(refresh);

        // Prime the CPU counters: usage is a delta between refreshes, so the
        // first tick's reading covers construction-to-tick instead of being
        // meaningless. The first sample is kept.
        sys.refresh_cpu_usage();

        debug!(cpus = sys.cpus().len(), "system provider primed");

        Self { sys }
    }
}

impl Default for SystemProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsProvider for SystemProvider {
    fn name(&self) -> &str {
        "system"
    }

    fn cpu_percent(&mut self) -> Result<f32, ProviderError> {
        self.sys.refresh_cpu_usage();
        Ok(self.sys.global_cpu_usage())
    }

    fn mem_percent(&mut self) -> Result<f32, ProviderError> {
        self.sys.refresh_memory();

        let total = self.sys.total_memory();
        if total == 0 {
            return Err(ProviderError::Unavailable("total memory reported as zero"));
        }

        Ok(self.sys.used_memory() as f32 / total as f32 * 100.0)
    }
}

/// CPU and memory utilization of a single process.
///
/// CPU is relative to one core (matches what `top` shows per process) and can
/// exceed 100 for multi-threaded targets. Memory is resident-set size as a
/// share of total system memory.
#[derive(Debug)]
pub struct ProcessProvider {
    sys: System,
    pid: Pid,
    raw_pid: u32,
}

impl ProcessProvider {
    pub fn new(pid: u32) -> Result<Self, ProviderError> {
        let target = Pid::from_u32(pid);

        let mut sys = System::new();
        sys.refresh_memory();
        // Prime the per-process CPU counters, and verify the target exists
        // before the loop starts.
        sys.refresh_processes(ProcessesToUpdate::Some(&[target]), true);

        if sys.process(target).is_none() {
            return Err(ProviderError::ProcessNotFound(pid));
        }

        Ok(Self {
            sys,
            pid: target,
            raw_pid: pid,
        })
    }
}

impl MetricsProvider for ProcessProvider {
    fn name(&self) -> &str {
        "process"
    }

    fn cpu_percent(&mut self) -> Result<f32, ProviderError> {
        self.sys
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);

        match self.sys.process(self.pid) {
            Some(process) => Ok(process.cpu_usage()),
            None => Err(ProviderError::ProcessNotFound(self.raw_pid)),
        }
    }

    fn mem_percent(&mut self) -> Result<f32, ProviderError> {
        let total = self.sys.total_memory();
        if total == 0 {
            return Err(ProviderError::Unavailable("total memory reported as zero"));
        }

        match self.sys.process(self.pid) {
            Some(process) => Ok(process.memory() as f32 / total as f32 * 100.0),
            None => Err(ProviderError::ProcessNotFound(self.raw_pid)),
        }
    }
}
