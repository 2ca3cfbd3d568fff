//! Workload sampling.
//!
//! Turns cumulative CPU time counters and process memory figures into the
//! normalized [`Load`] reported to the collector. The CPU ratio is computed
//! over the window between two consecutive samples, so every call to
//! [`WorkloadSampler::sample`] advances the baseline.

use std::time::Instant;

use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::debug;
use vigil_core::Load;

/// Cumulative CPU time summed across all cores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

/// Memory in use against the ceiling it is measured against, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryUsage {
    pub used: u64,
    pub limit: u64,
}

/// Source of raw host counters.
pub trait HostCounters: Send {
    fn cpu_times(&mut self) -> CpuTimes;
    fn memory(&mut self) -> MemoryUsage;
}

impl HostCounters for Box<dyn HostCounters> {
    fn cpu_times(&mut self) -> CpuTimes {
        (**self).cpu_times()
    }

    fn memory(&mut self) -> MemoryUsage {
        (**self).memory()
    }
}

/// Counters read from the running host.
///
/// CPU times come from the per-core lines of `/proc/stat`. Where that file
/// is unavailable they are accumulated from sysinfo's global CPU usage,
/// weighted by wall-clock milliseconds between reads.
/// Memory is the resident size of this process over the cgroup memory limit,
/// or over total system memory when no limit applies.
pub struct SystemCounters {
    system: System,
    pid: Option<Pid>,
    /// Running totals for the sysinfo fallback.
    estimated: CpuTimes,
    last_refresh: Instant,
}

impl SystemCounters {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid().ok();
        if pid.is_none() {
            debug!("current pid unavailable, process memory will read as zero");
        }
        Self {
            system: System::new(),
            pid,
            estimated: CpuTimes::default(),
            last_refresh: Instant::now(),
        }
    }

    fn estimated_cpu_times(&mut self) -> CpuTimes {
        self.system.refresh_cpu_usage();
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refresh).as_millis() as u64;
        self.last_refresh = now;

        let busy = f64::from(self.system.global_cpu_usage()).clamp(0.0, 100.0) / 100.0;
        let idle = ((elapsed as f64) * (1.0 - busy)).round() as u64;
        self.estimated.total = self.estimated.total.saturating_add(elapsed);
        self.estimated.idle = self.estimated.idle.saturating_add(idle.min(elapsed));
        self.estimated
    }
}

impl Default for SystemCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl HostCounters for SystemCounters {
    fn cpu_times(&mut self) -> CpuTimes {
        match read_proc_stat() {
            Some(times) => times,
            None => self.estimated_cpu_times(),
        }
    }

    fn memory(&mut self) -> MemoryUsage {
        self.system.refresh_memory();
        let limit = self
            .system
            .cgroup_limits()
            .map(|limits| limits.total_memory)
            .filter(|total| *total > 0)
            .unwrap_or_else(|| self.system.total_memory());

        let used = match self.pid {
            Some(pid) => {
                self.system.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&[pid]),
                    true,
                    ProcessRefreshKind::new().with_memory(),
                );
                self.system.process(pid).map(|p| p.memory()).unwrap_or(0)
            }
            None => 0,
        };

        MemoryUsage { used, limit }
    }
}

#[cfg(target_os = "linux")]
fn read_proc_stat() -> Option<CpuTimes> {
    match std::fs::read_to_string("/proc/stat") {
        Ok(content) => Some(parse_proc_stat(&content)),
        Err(e) => {
            debug!(error = %e, "failed to read /proc/stat, using sysinfo cpu usage");
            None
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn read_proc_stat() -> Option<CpuTimes> {
    None
}

/// Sum the per-core `cpuN` lines of `/proc/stat`.
///
/// Total covers user through steal; guest time is already folded into user.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_proc_stat(content: &str) -> CpuTimes {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let label = fields.next()?;
            let core = label.strip_prefix("cpu")?;
            if core.is_empty() || !core.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let times: Vec<u64> = fields.take(8).filter_map(|f| f.parse().ok()).collect();
            Some(CpuTimes {
                idle: times.get(3).copied().unwrap_or(0),
                total: times.iter().sum(),
            })
        })
        .fold(CpuTimes::default(), |acc, core| CpuTimes {
            idle: acc.idle + core.idle,
            total: acc.total + core.total,
        })
}

/// Computes CPU and memory ratios from successive counter samples.
pub struct WorkloadSampler<C = SystemCounters> {
    counters: C,
    last: CpuTimes,
}

impl WorkloadSampler<SystemCounters> {
    pub fn new() -> Self {
        Self::with_counters(SystemCounters::new())
    }
}

impl Default for WorkloadSampler<SystemCounters> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: HostCounters> WorkloadSampler<C> {
    /// Create a sampler; the initial baseline is taken immediately.
    pub fn with_counters(mut counters: C) -> Self {
        let last = counters.cpu_times();
        Self { counters, last }
    }

    /// Take a sample and advance the CPU baseline.
    pub fn sample(&mut self) -> Load {
        let current = self.counters.cpu_times();
        let memory = self.counters.memory();

        let total_delta = current.total.saturating_sub(self.last.total);
        let idle_delta = current.idle.saturating_sub(self.last.idle);
        let cpu = if total_delta == 0 {
            0.0
        } else {
            1.0 - idle_delta as f64 / total_delta as f64
        };
        let ram = if memory.limit > 0 {
            memory.used as f64 / memory.limit as f64
        } else {
            0.0
        };

        self.last = current;
        Load { cpu, ram }
    }
}
