//! Engine configuration.
//!
//! [`EngineConfig`] is built once at startup (from defaults, YAML, and
//! explicit overrides), validated, then shared read-only as
//! `Arc<EngineConfig>`. Invalid combinations are rejected before any chunk
//! runs.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! chunk_size: 10000
//! memory_threshold_mb: 2048
//! match_rate_threshold: 0.65
//! timeout_seconds: 300
//! retry_backoff: exponential
//! high_confidence_threshold: 90
//! low_confidence_threshold: 75
//! enable_fuzzy_matching: true
//! enable_memory_monitoring: true
//! enable_progress_tracking: true
//!
//! max_attempts: 3
//! exact_priority: [primary, secondary]
//! name_normalization:
//!   fold_abbreviations: true
//! ```
//!
//! ## Overrides
//!
//! Any scalar option can be overridden with an `AWARD_ENRICH_<OPTION>` pair,
//! e.g. `AWARD_ENRICH_CHUNK_SIZE=5000`. Pairs are passed in explicitly
//! (usually `std::env::vars()`); the config never reads process state itself.

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use canonical::NameConfig;
use matcher::{IdentifierKind, TierConfigError, TierThresholds};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::ConfigError;
use crate::retry::{BackoffPolicy, RetryConfig};

/// Prefix for override keys accepted by [`EngineConfig::with_env_overrides`].
pub const ENV_PREFIX: &str = "AWARD_ENRICH_";

/// Chunk sizes outside this range are accepted but logged.
pub const RECOMMENDED_CHUNK_SIZE: std::ops::RangeInclusive<usize> = 1_000..=100_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Records per processing unit.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Resident memory above which chunk size is halved.
    #[serde(default = "default_memory_threshold_mb")]
    pub memory_threshold_mb: u64,

    /// Quality gate cutoff, inclusive.
    #[serde(default = "default_match_rate_threshold")]
    pub match_rate_threshold: f64,

    /// Wall-clock budget per chunk attempt.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    #[serde(default)]
    pub retry_backoff: BackoffPolicy,

    #[serde(default = "default_high_threshold")]
    pub high_confidence_threshold: u8,

    /// Optional MEDIUM floor. Unset means MEDIUM starts at the low threshold.
    #[serde(default)]
    pub medium_confidence_threshold: Option<u8>,

    #[serde(default = "default_low_threshold")]
    pub low_confidence_threshold: u8,

    #[serde(default = "true_value")]
    pub enable_fuzzy_matching: bool,

    #[serde(default = "true_value")]
    pub enable_memory_monitoring: bool,

    #[serde(default = "true_value")]
    pub enable_progress_tracking: bool,

    /// Attempts per chunk, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    #[serde(default)]
    pub retry_jitter: bool,

    /// Consecutive over-threshold chunk boundaries tolerated before the run
    /// aborts.
    #[serde(default = "default_max_degradation_steps")]
    pub max_degradation_steps: u32,

    /// Permanently failed chunks tolerated before the run aborts.
    #[serde(default = "default_max_failed_chunks")]
    pub max_failed_chunks: u64,

    /// Scoring threads; 0 uses rayon's default.
    #[serde(default)]
    pub worker_threads: usize,

    /// Records between memory samples inside a chunk.
    #[serde(default = "default_memory_sample_interval")]
    pub memory_sample_interval: usize,

    /// Keep every result in the final report in addition to the sink.
    #[serde(default = "true_value")]
    pub retain_results: bool,

    #[serde(default = "default_exact_priority")]
    pub exact_priority: Vec<IdentifierKind>,

    /// Optional second gate condition on the malformed-record share.
    #[serde(default)]
    pub max_malformed_rate: Option<f64>,

    #[serde(default)]
    pub name_normalization: NameConfig,
}

impl EngineConfig {
    /// Load a YAML configuration file from the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate YAML configuration.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `AWARD_ENRICH_*` overrides and re-validates. Keys without the
    /// prefix are ignored; unknown keys with it are rejected.
    pub fn with_env_overrides<I, K, V>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let key = key.as_ref();
            let Some(option) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            self.apply_override(key, &option.to_ascii_lowercase(), value.as_ref().trim())?;
        }
        self.validate()?;
        Ok(self)
    }

    fn apply_override(&mut self, key: &str, option: &str, raw: &str) -> Result<(), ConfigError> {
        match option {
            "chunk_size" => self.chunk_size = parse_value(key, raw)?,
            "memory_threshold_mb" => self.memory_threshold_mb = parse_value(key, raw)?,
            "match_rate_threshold" => self.match_rate_threshold = parse_value(key, raw)?,
            "timeout_seconds" => self.timeout_seconds = parse_value(key, raw)?,
            "retry_backoff" => self.retry_backoff = parse_value(key, raw)?,
            "high_confidence_threshold" => self.high_confidence_threshold = parse_value(key, raw)?,
            "medium_confidence_threshold" => {
                self.medium_confidence_threshold = parse_optional(key, raw)?
            }
            "low_confidence_threshold" => self.low_confidence_threshold = parse_value(key, raw)?,
            "enable_fuzzy_matching" => self.enable_fuzzy_matching = parse_flag(key, raw)?,
            "enable_memory_monitoring" => self.enable_memory_monitoring = parse_flag(key, raw)?,
            "enable_progress_tracking" => self.enable_progress_tracking = parse_flag(key, raw)?,
            "max_attempts" => self.max_attempts = parse_value(key, raw)?,
            "retry_base_delay_ms" => self.retry_base_delay_ms = parse_value(key, raw)?,
            "retry_max_delay_ms" => self.retry_max_delay_ms = parse_value(key, raw)?,
            "retry_jitter" => self.retry_jitter = parse_flag(key, raw)?,
            "max_degradation_steps" => self.max_degradation_steps = parse_value(key, raw)?,
            "max_failed_chunks" => self.max_failed_chunks = parse_value(key, raw)?,
            "worker_threads" => self.worker_threads = parse_value(key, raw)?,
            "memory_sample_interval" => self.memory_sample_interval = parse_value(key, raw)?,
            "retain_results" => self.retain_results = parse_flag(key, raw)?,
            "max_malformed_rate" => self.max_malformed_rate = parse_optional(key, raw)?,
            "exact_priority" => {
                self.exact_priority = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| parse_kind(key, s))
                    .collect::<Result<_, _>>()?
            }
            _ => return Err(ConfigError::UnknownOverride(key.to_string())),
        }
        Ok(())
    }

    /// Rejects configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if !RECOMMENDED_CHUNK_SIZE.contains(&self.chunk_size) {
            warn!(
                event = "chunk_size_outside_recommended",
                chunk_size = self.chunk_size,
                min = *RECOMMENDED_CHUNK_SIZE.start(),
                max = *RECOMMENDED_CHUNK_SIZE.end(),
                "chunk_size is outside the recommended range"
            );
        }
        self.tier_thresholds()?;
        check_rate("match_rate_threshold", self.match_rate_threshold)?;
        if let Some(rate) = self.max_malformed_rate {
            check_rate("max_malformed_rate", rate)?;
        }
        for (name, value) in [
            ("timeout_seconds", self.timeout_seconds),
            ("memory_threshold_mb", self.memory_threshold_mb),
            ("max_attempts", u64::from(self.max_attempts)),
            ("memory_sample_interval", self.memory_sample_interval as u64),
        ] {
            if value == 0 {
                return Err(ConfigError::NonPositive(name));
            }
        }
        for (i, kind) in self.exact_priority.iter().enumerate() {
            if self.exact_priority[..i].contains(kind) {
                return Err(ConfigError::DuplicateExactKind(*kind));
            }
        }
        if self.exact_priority.is_empty() && !self.enable_fuzzy_matching {
            warn!(
                event = "no_matchers_enabled",
                "no exact identifiers configured and fuzzy matching disabled; nothing can match"
            );
        }
        self.name_normalization.validate()?;
        Ok(())
    }

    pub fn tier_thresholds(&self) -> Result<TierThresholds, TierConfigError> {
        let thresholds =
            TierThresholds::new(self.high_confidence_threshold, self.low_confidence_threshold)?;
        match self.medium_confidence_threshold {
            Some(medium) => thresholds.with_medium(medium),
            None => Ok(thresholds),
        }
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            backoff: self.retry_backoff,
            jitter: self.retry_jitter,
            attempt_timeout: Some(self.attempt_timeout()),
        }
    }

    /// Hex SHA-256 over every option that changes individual match results.
    ///
    /// Chunking, retry and memory options are excluded: they change how work
    /// is scheduled, never what a record matches.
    pub fn matching_digest(&self) -> String {
        #[derive(Serialize)]
        struct MatchingOptions<'a> {
            high: u8,
            medium: Option<u8>,
            low: u8,
            fuzzy: bool,
            exact_priority: &'a [IdentifierKind],
            names: &'a NameConfig,
        }

        let options = MatchingOptions {
            high: self.high_confidence_threshold,
            medium: self.medium_confidence_threshold,
            low: self.low_confidence_threshold,
            fuzzy: self.enable_fuzzy_matching,
            exact_priority: &self.exact_priority,
            names: &self.name_normalization,
        };
        // Serializing plain scalars and derived structs cannot fail.
        let encoded = serde_json::to_vec(&options).unwrap_or_default();
        hex::encode(Sha256::digest(&encoded))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            memory_threshold_mb: default_memory_threshold_mb(),
            match_rate_threshold: default_match_rate_threshold(),
            timeout_seconds: default_timeout_seconds(),
            retry_backoff: BackoffPolicy::default(),
            high_confidence_threshold: default_high_threshold(),
            medium_confidence_threshold: None,
            low_confidence_threshold: default_low_threshold(),
            enable_fuzzy_matching: true,
            enable_memory_monitoring: true,
            enable_progress_tracking: true,
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            retry_jitter: false,
            max_degradation_steps: default_max_degradation_steps(),
            max_failed_chunks: default_max_failed_chunks(),
            worker_threads: 0,
            memory_sample_interval: default_memory_sample_interval(),
            retain_results: true,
            exact_priority: default_exact_priority(),
            max_malformed_rate: None,
            name_normalization: NameConfig::default(),
        }
    }
}

fn check_rate(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::RateOutOfRange { name, value })
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| invalid_override(key, raw))
}

fn parse_optional<T: FromStr>(key: &str, raw: &str) -> Result<Option<T>, ConfigError> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    parse_value(key, raw).map(Some)
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid_override(key, raw)),
    }
}

fn parse_kind(key: &str, raw: &str) -> Result<IdentifierKind, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "primary" => Ok(IdentifierKind::Primary),
        "secondary" => Ok(IdentifierKind::Secondary),
        _ => Err(invalid_override(key, raw)),
    }
}

fn invalid_override(key: &str, raw: &str) -> ConfigError {
    ConfigError::InvalidOverride {
        key: key.to_string(),
        value: raw.to_string(),
    }
}

fn default_chunk_size() -> usize {
    10_000
}

fn default_memory_threshold_mb() -> u64 {
    2048
}

fn default_match_rate_threshold() -> f64 {
    0.65
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_high_threshold() -> u8 {
    90
}

fn default_low_threshold() -> u8 {
    75
}

fn true_value() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_retry_max_delay_ms() -> u64 {
    60_000
}

fn default_max_degradation_steps() -> u32 {
    3
}

fn default_max_failed_chunks() -> u64 {
    3
}

fn default_memory_sample_interval() -> usize {
    1000
}

fn default_exact_priority() -> Vec<IdentifierKind> {
    IdentifierKind::ALL.to_vec()
}
