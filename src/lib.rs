//! Chunked award/recipient enrichment.
//!
//! Source records stream through a [`Chunker`]; each chunk is matched against
//! an immutable [`LookupIndex`] by exact identifier and then by fuzzy name,
//! under per-attempt timeouts with retry, memory-driven chunk shrinking, and
//! checkpointed progress. The run ends with a [`QualityGate`] verdict and a
//! [`MetricsReport`].
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use award_enrich::{
//!     CandidateRecord, Engine, EngineConfig, JsonLinesReader, JsonLinesResultSink, SourceRecord,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::from_file("enrich.yaml")?;
//! let candidates = JsonLinesReader::<_, CandidateRecord>::open("recipients.jsonl")?
//!     .collect::<Result<Vec<_>, _>>()?;
//! let engine = Engine::builder(config)
//!     .candidates(candidates)
//!     .result_sink(Arc::new(JsonLinesResultSink::append("matches.jsonl")?))
//!     .build()?;
//!
//! let source = JsonLinesReader::<_, SourceRecord>::open("awards.jsonl")?;
//! let report = engine.run(source).await?;
//! println!("match rate {:.3} ({:?})", report.metrics.match_rate, report.status);
//! # Ok(())
//! # }
//! ```

pub mod chunk;
pub mod config;
pub mod engine;
pub mod error;
pub mod gate;
pub mod io;
pub mod memory;
pub mod metrics;
pub mod progress;
pub mod retry;
pub mod sink;
#[cfg(feature = "subscriber")]
pub mod telemetry;

pub use canonical::{CanonicalError, NameConfig};
pub use matcher::{
    CandidateRecord, CandidateRef, ConfidenceTier, DuplicateCounts, IdentifierKind, LookupIndex,
    MatchMethod, MatchPipeline, MatchResult, RecordDefect, SourceRecord, TierConfigError,
    TierThresholds,
};

pub use chunk::{Chunk, ChunkStatus, Chunker, SourceError};
pub use config::{ENV_PREFIX, EngineConfig, RECOMMENDED_CHUNK_SIZE};
pub use engine::{Engine, EngineBuilder, RunReport, RunStatus};
pub use error::{ChunkError, ConfigError, EngineError, SinkError, StoreError};
pub use gate::{GateOutcome, QualityGate, Verdict};
pub use io::{JsonFileMetricsSink, JsonLinesReader, JsonLinesResultSink, JsonLinesSpill};
pub use memory::{MemoryMonitor, MemorySampler, MemoryVerdict, ProcessMemorySampler, SpillStore};
pub use metrics::{DurationStats, MetricsReport, MetricsSink, RunMetrics};
pub use progress::{CHECKPOINT_VERSION, Checkpoint, CheckpointStore, FileCheckpointStore};
pub use retry::{BackoffPolicy, RetryConfig, RetryController};
pub use sink::{CollectingSink, ResultSink};
