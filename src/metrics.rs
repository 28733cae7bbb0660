//! Run-level counters and the final metrics artifact.
//!
//! Chunks produce a [`MetricsDelta`]; the engine merges deltas into one
//! [`RunMetrics`] at a single aggregation point. Merging only adds counts and
//! appends samples, so the totals do not depend on completion order.
//! [`RunMetrics::finalize`] consumes the metrics exactly once and produces the
//! immutable [`MetricsReport`].

use matcher::{ConfidenceTier, DuplicateCounts, MatchMethod, MatchResult};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::gate::GateOutcome;

/// Result counts per match method.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MethodCounts {
    pub exact_primary: u64,
    pub exact_secondary: u64,
    pub fuzzy: u64,
    pub none: u64,
}

impl MethodCounts {
    pub fn add(&mut self, method: MatchMethod, n: u64) {
        match method {
            MatchMethod::ExactPrimary => self.exact_primary += n,
            MatchMethod::ExactSecondary => self.exact_secondary += n,
            MatchMethod::Fuzzy => self.fuzzy += n,
            MatchMethod::None => self.none += n,
        }
    }

    pub fn get(&self, method: MatchMethod) -> u64 {
        match method {
            MatchMethod::ExactPrimary => self.exact_primary,
            MatchMethod::ExactSecondary => self.exact_secondary,
            MatchMethod::Fuzzy => self.fuzzy,
            MatchMethod::None => self.none,
        }
    }

    fn merge(&mut self, other: &MethodCounts) {
        for method in MatchMethod::ALL {
            self.add(method, other.get(method));
        }
    }
}

/// Result counts per confidence tier.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierCounts {
    pub high: u64,
    pub medium: u64,
    pub low: u64,
    pub none: u64,
}

impl TierCounts {
    pub fn add(&mut self, tier: ConfidenceTier, n: u64) {
        match tier {
            ConfidenceTier::High => self.high += n,
            ConfidenceTier::Medium => self.medium += n,
            ConfidenceTier::Low => self.low += n,
            ConfidenceTier::None => self.none += n,
        }
    }

    pub fn get(&self, tier: ConfidenceTier) -> u64 {
        match tier {
            ConfidenceTier::High => self.high,
            ConfidenceTier::Medium => self.medium,
            ConfidenceTier::Low => self.low,
            ConfidenceTier::None => self.none,
        }
    }

    fn merge(&mut self, other: &TierCounts) {
        for tier in ConfidenceTier::ALL {
            self.add(tier, other.get(tier));
        }
    }
}

/// What one chunk contributes to the run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsDelta {
    pub records: u64,
    pub methods: MethodCounts,
    pub tiers: TierCounts,
    pub malformed: u64,
    pub succeeded_chunks: u64,
    pub failed_chunks: u64,
    pub failed_records: u64,
    pub retries: u64,
    pub chunk_duration_ms: Option<u64>,
}

impl MetricsDelta {
    pub fn from_results(results: &[MatchResult]) -> Self {
        let mut delta = Self {
            records: results.len() as u64,
            succeeded_chunks: 1,
            ..Default::default()
        };
        for result in results {
            delta.methods.add(result.method(), 1);
            delta.tiers.add(result.tier(), 1);
            if result.is_malformed() {
                delta.malformed += 1;
            }
        }
        delta
    }

    /// A chunk that exhausted its retries. Its records count as unmatched.
    pub fn failed_chunk(records: usize) -> Self {
        let records = records as u64;
        let mut delta = Self {
            records,
            failed_chunks: 1,
            failed_records: records,
            ..Default::default()
        };
        delta.methods.add(MatchMethod::None, records);
        delta.tiers.add(ConfidenceTier::None, records);
        delta
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = u64::from(retries);
        self
    }

    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.chunk_duration_ms = Some(ms);
        self
    }
}

/// Mutable run aggregate. Also persisted inside checkpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunMetrics {
    pub total_records: u64,
    pub methods: MethodCounts,
    pub tiers: TierCounts,
    pub malformed_records: u64,
    pub succeeded_chunks: u64,
    pub failed_chunks: u64,
    pub failed_records: u64,
    pub retry_attempts: u64,
    pub duplicates_suppressed: DuplicateCounts,
    pub peak_memory_mb: Option<u64>,
    pub elapsed_ms: u64,
    pub chunk_durations_ms: Vec<u64>,
    /// Effective chunk size at start and after every change.
    pub chunk_size_history: Vec<usize>,
    pub degradation_events: u64,
    pub spilled_results: u64,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, delta: MetricsDelta) {
        self.total_records += delta.records;
        self.methods.merge(&delta.methods);
        self.tiers.merge(&delta.tiers);
        self.malformed_records += delta.malformed;
        self.succeeded_chunks += delta.succeeded_chunks;
        self.failed_chunks += delta.failed_chunks;
        self.failed_records += delta.failed_records;
        self.retry_attempts += delta.retries;
        if let Some(ms) = delta.chunk_duration_ms {
            self.chunk_durations_ms.push(ms);
        }
    }

    /// Appends `size` unless it equals the latest entry.
    pub fn record_chunk_size(&mut self, size: usize) {
        if self.chunk_size_history.last() != Some(&size) {
            self.chunk_size_history.push(size);
        }
    }

    pub fn observe_peak_memory(&mut self, mb: Option<u64>) {
        if let Some(mb) = mb {
            self.peak_memory_mb = Some(self.peak_memory_mb.map_or(mb, |p| p.max(mb)));
        }
    }

    /// Any result with a tier other than NONE.
    pub fn matched_records(&self) -> u64 {
        self.total_records - self.tiers.none.min(self.total_records)
    }

    /// `matched / total`, or 0.0 for an empty run.
    pub fn match_rate(&self) -> f64 {
        ratio(self.matched_records(), self.total_records)
    }

    pub fn malformed_rate(&self) -> f64 {
        ratio(self.malformed_records, self.total_records)
    }

    pub fn finalize(self, gate: GateOutcome) -> MetricsReport {
        MetricsReport {
            total_records: self.total_records,
            matched_records: self.matched_records(),
            match_rate: self.match_rate(),
            methods: self.methods,
            tiers: self.tiers,
            malformed_records: self.malformed_records,
            succeeded_chunks: self.succeeded_chunks,
            failed_chunks: self.failed_chunks,
            failed_records: self.failed_records,
            retry_attempts: self.retry_attempts,
            duplicates_suppressed: self.duplicates_suppressed,
            peak_memory_mb: self.peak_memory_mb,
            total_duration_ms: self.elapsed_ms,
            chunk_durations: DurationStats::from_samples(&self.chunk_durations_ms),
            chunk_size_history: self.chunk_size_history,
            degradation_events: self.degradation_events,
            spilled_results: self.spilled_results,
            gate,
        }
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Distribution of per-chunk wall-clock durations.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct DurationStats {
    pub count: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub mean_ms: f64,
    pub p50_ms: u64,
    pub p95_ms: u64,
}

impl DurationStats {
    /// Nearest-rank percentiles; all zeros for no samples.
    pub fn from_samples(samples: &[u64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let mut sorted = samples.to_vec();
        sorted.sort_unstable();
        let n = sorted.len();
        let rank = |p: f64| {
            let idx = (p * n as f64).ceil() as usize;
            sorted[idx.clamp(1, n) - 1]
        };
        Self {
            count: n as u64,
            min_ms: sorted[0],
            max_ms: sorted[n - 1],
            mean_ms: sorted.iter().sum::<u64>() as f64 / n as f64,
            p50_ms: rank(0.50),
            p95_ms: rank(0.95),
        }
    }
}

/// The metrics artifact handed to observability sinks. Produced for PASS and
/// FAIL verdicts alike.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsReport {
    pub total_records: u64,
    pub matched_records: u64,
    pub match_rate: f64,
    pub methods: MethodCounts,
    pub tiers: TierCounts,
    pub malformed_records: u64,
    pub succeeded_chunks: u64,
    pub failed_chunks: u64,
    pub failed_records: u64,
    pub retry_attempts: u64,
    pub duplicates_suppressed: DuplicateCounts,
    pub peak_memory_mb: Option<u64>,
    pub total_duration_ms: u64,
    pub chunk_durations: DurationStats,
    pub chunk_size_history: Vec<usize>,
    pub degradation_events: u64,
    pub spilled_results: u64,
    pub gate: GateOutcome,
}

/// Receives the finished metrics artifact.
pub trait MetricsSink: Send + Sync {
    fn emit(&self, report: &MetricsReport) -> Result<(), StoreError>;
}
