//! Error taxonomy for the enrichment engine.
//!
//! - [`ConfigError`]: rejected at startup, nothing runs.
//! - [`ChunkError`]: one failed chunk attempt; transient kinds are retried.
//! - [`SinkError`] / [`StoreError`]: collaborator failures (result sinks,
//!   checkpoint/spill/metrics files).
//! - [`EngineError`]: anything that ends a run without a quality verdict.
//!
//! Per-record problems never surface here; they become unmatched results
//! with a [`RecordDefect`](matcher::RecordDefect).

use std::time::Duration;

use canonical::CanonicalError;
use matcher::{IdentifierKind, TierConfigError};
use thiserror::Error;

use crate::chunk::ChunkStatus;

/// Invalid or unloadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("chunk_size must be >= 1")]
    ZeroChunkSize,

    #[error("invalid confidence thresholds: {0}")]
    Thresholds(#[from] TierConfigError),

    #[error("{name} must be within 0.0..=1.0, got {value}")]
    RateOutOfRange { name: &'static str, value: f64 },

    #[error("{0} must be > 0")]
    NonPositive(&'static str),

    #[error("exact_priority lists {0:?} more than once")]
    DuplicateExactKind(IdentifierKind),

    #[error("invalid name normalization: {0}")]
    Name(#[from] CanonicalError),

    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("unknown override {0}")]
    UnknownOverride(String),

    #[error("invalid value {value:?} for override {key}")]
    InvalidOverride { key: String, value: String },

    #[error("prebuilt lookup index uses a different name normalization than the engine config")]
    IndexNameConfigMismatch,
}

/// One failed attempt at a chunk.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ChunkError {
    #[error("chunk attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("chunk attempt cancelled")]
    Cancelled,

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("worker failed: {0}")]
    Worker(String),

    #[error("result sink rejected chunk: {0}")]
    Sink(String),

    #[error("illegal chunk transition {from:?} -> {to:?}")]
    IllegalTransition { from: ChunkStatus, to: ChunkStatus },
}

impl ChunkError {
    /// Timeouts, cancellations and explicitly transient failures are retried.
    /// Worker panics and permanent sink failures are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ChunkError::Timeout(_) | ChunkError::Cancelled | ChunkError::Transient(_)
        )
    }
}

impl From<SinkError> for ChunkError {
    fn from(err: SinkError) -> Self {
        if err.is_transient() {
            ChunkError::Transient(err.to_string())
        } else {
            ChunkError::Sink(err.to_string())
        }
    }
}

/// Failure reported by a downstream [`ResultSink`](crate::ResultSink).
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink temporarily unavailable: {0}")]
    Unavailable(String),

    #[error("sink rejected results: {0}")]
    Rejected(String),

    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode results: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SinkError {
    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Unavailable(_) | SinkError::Io(_))
    }
}

/// File-backed store failure (checkpoints, spill files, metrics artifacts).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store encoding error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Run-level failure. No metrics artifact is written for these.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to read source record at offset {offset}: {reason}")]
    SourceRead { offset: u64, reason: String },

    #[error(
        "memory usage {used_mb} MB still above {threshold_mb} MB after {steps} degradation steps"
    )]
    ResourceExhausted {
        used_mb: u64,
        threshold_mb: u64,
        steps: u32,
    },

    #[error("{failed} chunks failed permanently (limit {limit})")]
    TooManyFailedChunks { failed: u64, limit: u64 },

    #[error("checkpoint was written by a different configuration (expected {expected}, found {found})")]
    CheckpointMismatch { expected: String, found: String },

    #[error("unsupported checkpoint version {0}")]
    CheckpointVersion(u32),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),

    #[error("chunk {index}: {source}")]
    ChunkState { index: u64, source: ChunkError },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ChunkError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ChunkError::Transient("blip".into()).is_transient());
        assert!(!ChunkError::Worker("panicked".into()).is_transient());
        assert!(!ChunkError::Sink("schema mismatch".into()).is_transient());
    }

    #[test]
    fn sink_errors_map_by_kind() {
        let transient: ChunkError = SinkError::Unavailable("429".into()).into();
        assert!(transient.is_transient());
        let permanent: ChunkError = SinkError::Rejected("bad row".into()).into();
        assert!(!permanent.is_transient());
    }

    #[test]
    fn engine_error_messages_are_descriptive() {
        let err = EngineError::TooManyFailedChunks {
            failed: 4,
            limit: 3,
        };
        assert_eq!(err.to_string(), "4 chunks failed permanently (limit 3)");
    }
}
