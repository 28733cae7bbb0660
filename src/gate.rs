use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::metrics::RunMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

/// Verdict plus the numbers and thresholds it was decided on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateOutcome {
    pub verdict: Verdict,
    pub match_rate: f64,
    pub match_rate_threshold: f64,
    pub malformed_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_malformed_rate: Option<f64>,
    /// Human-readable reasons for a FAIL; empty on PASS.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

impl GateOutcome {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

/// Post-run data-quality check. A FAIL is not a processing error: the run
/// completed and its metrics are complete, but the output must not be
/// consumed downstream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityGate {
    match_rate_threshold: f64,
    max_malformed_rate: Option<f64>,
}

impl QualityGate {
    pub fn new(match_rate_threshold: f64) -> Self {
        Self {
            match_rate_threshold,
            max_malformed_rate: None,
        }
    }

    pub fn with_max_malformed_rate(mut self, rate: f64) -> Self {
        self.max_malformed_rate = Some(rate);
        self
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            match_rate_threshold: config.match_rate_threshold,
            max_malformed_rate: config.max_malformed_rate,
        }
    }

    /// Both bounds are inclusive: a match rate equal to the threshold passes,
    /// as does a malformed rate equal to its maximum.
    pub fn evaluate(&self, metrics: &RunMetrics) -> GateOutcome {
        let match_rate = metrics.match_rate();
        let malformed_rate = metrics.malformed_rate();
        let mut reasons = Vec::new();

        if match_rate < self.match_rate_threshold {
            reasons.push(format!(
                "match rate {match_rate:.4} below threshold {:.4}",
                self.match_rate_threshold
            ));
        }
        if let Some(max) = self.max_malformed_rate {
            if malformed_rate > max {
                reasons.push(format!(
                    "malformed rate {malformed_rate:.4} above maximum {max:.4}"
                ));
            }
        }

        let verdict = if reasons.is_empty() {
            Verdict::Pass
        } else {
            Verdict::Fail
        };

        match verdict {
            Verdict::Pass => info!(
                event = "quality_gate_passed",
                match_rate,
                threshold = self.match_rate_threshold,
                total_records = metrics.total_records,
                "quality gate passed"
            ),
            Verdict::Fail => warn!(
                event = "quality_gate_failed",
                match_rate,
                threshold = self.match_rate_threshold,
                malformed_rate,
                total_records = metrics.total_records,
                reasons = ?reasons,
                "output must not be consumed downstream"
            ),
        }

        GateOutcome {
            verdict,
            match_rate,
            match_rate_threshold: self.match_rate_threshold,
            malformed_rate,
            max_malformed_rate: self.max_malformed_rate,
            reasons,
        }
    }
}
