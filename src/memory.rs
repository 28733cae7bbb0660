//! Process memory sampling and chunk-size degradation.
//!
//! Workers sample every `memory_sample_interval` records to keep the peak
//! current; the engine asks for a [`MemoryVerdict`] at each chunk boundary
//! and halves the chunk size (and spills retained results) while usage stays
//! above the threshold, up to `max_degradation_steps` consecutive times.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use matcher::MatchResult;
use tracing::debug;

use crate::error::StoreError;

/// Source of resident-memory readings in MiB.
pub trait MemorySampler: Send + Sync {
    /// `None` when the platform cannot report usage.
    fn sample_mb(&self) -> Option<u64>;
}

/// Reads the resident set size of the current process.
///
/// Linux only (`VmRSS` in `/proc/self/status`, reported in kB regardless of
/// page size); elsewhere every sample is `None` and the monitor never
/// degrades.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessMemorySampler;

impl MemorySampler for ProcessMemorySampler {
    #[cfg(target_os = "linux")]
    fn sample_mb(&self) -> Option<u64> {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        resident_kib(&status).map(|kib| kib / 1024)
    }

    #[cfg(not(target_os = "linux"))]
    fn sample_mb(&self) -> Option<u64> {
        None
    }
}

/// `VmRSS` from a `/proc/<pid>/status` dump, in KiB.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn resident_kib(status: &str) -> Option<u64> {
    status.lines().find_map(|line| {
        let value = line.strip_prefix("VmRSS:")?;
        value.split_whitespace().next()?.parse().ok()
    })
}

/// What the engine must do at a chunk boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryVerdict {
    /// Under threshold, or usage unknown.
    Healthy { used_mb: Option<u64> },
    /// Over threshold; shrink and spill. `step` counts consecutive breaches.
    Degrade { used_mb: u64, step: u32 },
    /// Still over threshold after the allowed number of steps.
    Exhausted { used_mb: u64, steps: u32 },
}

pub struct MemoryMonitor {
    sampler: Arc<dyn MemorySampler>,
    threshold_mb: u64,
    max_steps: u32,
    sample_interval: usize,
    peak_mb: AtomicU64,
    sampled: AtomicU64,
    breaches: AtomicU32,
}

impl MemoryMonitor {
    pub fn new(
        sampler: Arc<dyn MemorySampler>,
        threshold_mb: u64,
        max_steps: u32,
        sample_interval: usize,
    ) -> Self {
        Self {
            sampler,
            threshold_mb,
            max_steps,
            sample_interval: sample_interval.max(1),
            peak_mb: AtomicU64::new(0),
            sampled: AtomicU64::new(0),
            breaches: AtomicU32::new(0),
        }
    }

    pub fn threshold_mb(&self) -> u64 {
        self.threshold_mb
    }

    /// Takes one sample and folds it into the peak.
    pub fn sample(&self) -> Option<u64> {
        let used = self.sampler.sample_mb()?;
        self.peak_mb.fetch_max(used, Ordering::Relaxed);
        self.sampled.fetch_add(1, Ordering::Relaxed);
        Some(used)
    }

    /// Called by workers with the record's position inside its chunk.
    pub fn observe_record(&self, position: usize) {
        if position % self.sample_interval == 0 {
            self.sample();
        }
    }

    /// Highest usage seen so far; `None` if no sample ever succeeded.
    pub fn peak_mb(&self) -> Option<u64> {
        if self.sampled.load(Ordering::Relaxed) == 0 {
            None
        } else {
            Some(self.peak_mb.load(Ordering::Relaxed))
        }
    }

    /// Samples and decides at a chunk boundary. Dropping back under the
    /// threshold resets the breach count.
    pub fn check_boundary(&self) -> MemoryVerdict {
        let Some(used_mb) = self.sample() else {
            return MemoryVerdict::Healthy { used_mb: None };
        };
        if used_mb <= self.threshold_mb {
            self.breaches.store(0, Ordering::Relaxed);
            return MemoryVerdict::Healthy {
                used_mb: Some(used_mb),
            };
        }
        let step = self.breaches.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            event = "memory_over_threshold",
            used_mb,
            threshold_mb = self.threshold_mb,
            step,
            "memory above threshold at chunk boundary"
        );
        if step > self.max_steps {
            MemoryVerdict::Exhausted {
                used_mb,
                steps: self.max_steps,
            }
        } else {
            MemoryVerdict::Degrade { used_mb, step }
        }
    }
}

impl std::fmt::Debug for MemoryMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryMonitor")
            .field("threshold_mb", &self.threshold_mb)
            .field("max_steps", &self.max_steps)
            .field("sample_interval", &self.sample_interval)
            .field("peak_mb", &self.peak_mb())
            .finish()
    }
}

/// External storage for results evicted under memory pressure.
pub trait SpillStore: Send + Sync {
    fn spill(&self, results: &[MatchResult]) -> Result<(), StoreError>;
}

/// Halved chunk size, never below one record.
pub fn degraded_chunk_size(current: usize) -> usize {
    (current / 2).max(1)
}
