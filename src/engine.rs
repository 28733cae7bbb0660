//! The chunked enrichment run.
//!
//! ```text
//! source ──► Chunker ──► [retry ▸ spawn_blocking ▸ rayon scoring] ──► [retry ▸ ResultSink]
//!                               │
//!                               ▼
//!                  RunMetrics.merge ──► memory check ──► checkpoint
//!                               │
//!                        (source drained)
//!                               ▼
//!                 QualityGate ──► MetricsReport ──► MetricsSink
//! ```
//!
//! Chunks run one after another so chunk boundaries and result order follow
//! the source exactly; the records inside a chunk are scored in parallel on a
//! dedicated rayon pool with an order-preserving collect.

use std::fmt::Display;
use std::sync::Arc;

use matcher::{
    CandidateRecord, FuzzyMatcher, LookupIndex, MatchPipeline, MatchResult, SourceRecord,
};
use rayon::prelude::*;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{Instrument, Level, info, span, warn};

use crate::chunk::{Chunk, ChunkStatus, Chunker, SourceError, SourceFailure};
use crate::config::EngineConfig;
use crate::error::{ChunkError, ConfigError, EngineError};
use crate::gate::QualityGate;
use crate::memory::{
    MemoryMonitor, MemorySampler, MemoryVerdict, ProcessMemorySampler, SpillStore,
    degraded_chunk_size,
};
use crate::metrics::{MetricsDelta, MetricsReport, MetricsSink, RunMetrics};
use crate::progress::{CheckpointStore, ProgressTracker};
use crate::retry::{Attempt, RetryController, RetryEvent};
use crate::sink::ResultSink;

/// How a completed run ended. Fatal errors are reported as
/// [`EngineError`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Passed,
    /// Every chunk was accounted for but the output must not be consumed.
    QualityGateFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub metrics: MetricsReport,
    /// Retained results in source order. Empty when `retain_results` is off;
    /// results spilled under memory pressure and records of failed chunks are
    /// absent.
    pub results: Vec<MatchResult>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.status == RunStatus::Passed
    }
}

/// Assembles an [`Engine`] from configuration, candidates and collaborators.
pub struct EngineBuilder {
    config: EngineConfig,
    candidates: Vec<CandidateRecord>,
    index: Option<Arc<LookupIndex>>,
    result_sink: Option<Arc<dyn ResultSink>>,
    checkpoint_store: Option<Box<dyn CheckpointStore>>,
    spill_store: Option<Arc<dyn SpillStore>>,
    metrics_sink: Option<Arc<dyn MetricsSink>>,
    sampler: Arc<dyn MemorySampler>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            candidates: Vec::new(),
            index: None,
            result_sink: None,
            checkpoint_store: None,
            spill_store: None,
            metrics_sink: None,
            sampler: Arc::new(ProcessMemorySampler),
        }
    }

    /// Candidates to index at [`EngineBuilder::build`].
    pub fn candidates<I>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = CandidateRecord>,
    {
        self.candidates.extend(candidates);
        self
    }

    /// Reuses an index built earlier. Takes precedence over
    /// [`EngineBuilder::candidates`].
    pub fn index(mut self, index: Arc<LookupIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn result_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.result_sink = Some(sink);
        self
    }

    pub fn checkpoint_store(mut self, store: impl CheckpointStore + 'static) -> Self {
        self.checkpoint_store = Some(Box::new(store));
        self
    }

    pub fn spill_store(mut self, store: Arc<dyn SpillStore>) -> Self {
        self.spill_store = Some(store);
        self
    }

    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics_sink = Some(sink);
        self
    }

    pub fn memory_sampler(mut self, sampler: Arc<dyn MemorySampler>) -> Self {
        self.sampler = sampler;
        self
    }

    /// Validates the configuration and constructs only the enabled
    /// components. Nothing is read from the source here.
    pub fn build(self) -> Result<Engine, EngineError> {
        let config = self.config;
        config.validate()?;
        let thresholds = config.tier_thresholds().map_err(ConfigError::from)?;

        let index = match self.index {
            Some(index) => {
                if index.name_config() != &config.name_normalization {
                    return Err(ConfigError::IndexNameConfigMismatch.into());
                }
                index
            }
            None => Arc::new(LookupIndex::build(
                self.candidates,
                &config.name_normalization,
            )),
        };

        let mut pipeline = MatchPipeline::new(Arc::clone(&index)).with_exact(&config.exact_priority);
        if config.enable_fuzzy_matching {
            pipeline = pipeline.with_fuzzy(FuzzyMatcher::new(thresholds));
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("award-enrich-worker-{i}"))
            .build()
            .map_err(|err| EngineError::WorkerPool(err.to_string()))?;

        let tracker = ProgressTracker::new(
            config.enable_progress_tracking,
            self.checkpoint_store,
            config.matching_digest(),
        );

        info!(
            event = "engine_ready",
            candidates = index.len(),
            strategies = ?pipeline.strategy_names(),
            workers = pool.current_num_threads(),
            chunk_size = config.chunk_size,
            memory_monitoring = config.enable_memory_monitoring,
            progress_tracking = config.enable_progress_tracking,
            "engine ready"
        );

        Ok(Engine {
            retry: RetryController::new(config.retry_config()),
            delivery: RetryController::new(config.retry_config().without_timeout()),
            config: Arc::new(config),
            index,
            pipeline: Arc::new(pipeline),
            pool: Arc::new(pool),
            tracker,
            sampler: self.sampler,
            result_sink: self.result_sink,
            spill_store: self.spill_store,
            metrics_sink: self.metrics_sink,
        })
    }
}

/// A configured enrichment engine. Reusable across runs.
pub struct Engine {
    config: Arc<EngineConfig>,
    index: Arc<LookupIndex>,
    pipeline: Arc<MatchPipeline>,
    pool: Arc<rayon::ThreadPool>,
    retry: RetryController,
    delivery: RetryController,
    tracker: ProgressTracker,
    sampler: Arc<dyn MemorySampler>,
    result_sink: Option<Arc<dyn ResultSink>>,
    spill_store: Option<Arc<dyn SpillStore>>,
    metrics_sink: Option<Arc<dyn MetricsSink>>,
}

/// Mutable state of one run.
struct RunState {
    metrics: RunMetrics,
    retained: Vec<MatchResult>,
    monitor: Option<Arc<MemoryMonitor>>,
    started: Instant,
    base_elapsed_ms: u64,
}

impl RunState {
    fn refresh_elapsed(&mut self) {
        self.metrics.elapsed_ms = self.base_elapsed_ms + self.started.elapsed().as_millis() as u64;
    }
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<LookupIndex> {
        &self.index
    }

    pub fn pipeline(&self) -> &MatchPipeline {
        &self.pipeline
    }

    /// Matches one record outside of any run.
    pub fn match_record(&self, record: &SourceRecord) -> MatchResult {
        self.pipeline.match_record(record)
    }

    /// Processes `source` to completion and evaluates the quality gate.
    ///
    /// Resumes from the stored checkpoint when progress tracking is enabled
    /// and one exists; `source` must then replay the same records from the
    /// start. Entries the source reports as undecodable are counted as
    /// malformed records; any other source error is fatal. A quality-gate
    /// FAIL is reported through [`RunReport::status`], not as an error.
    pub async fn run<I, E>(&self, source: I) -> Result<RunReport, EngineError>
    where
        I: IntoIterator<Item = Result<SourceRecord, E>>,
        E: SourceError,
    {
        let source = source.into_iter();
        let resume = self.tracker.resume_point()?;
        let resumed = resume.is_some();

        let (mut chunker, metrics) = match resume {
            Some(point) => {
                let chunker = Chunker::resume(
                    source,
                    point.chunk_size,
                    point.next_chunk_index,
                    point.next_offset,
                )
                .map_err(source_read)?;
                (chunker, point.metrics)
            }
            None => {
                let mut metrics = RunMetrics::new();
                metrics.record_chunk_size(self.config.chunk_size);
                metrics.duplicates_suppressed = self.index.duplicates();
                (Chunker::new(source, self.config.chunk_size), metrics)
            }
        };

        let monitor = self.config.enable_memory_monitoring.then(|| {
            Arc::new(MemoryMonitor::new(
                Arc::clone(&self.sampler),
                self.config.memory_threshold_mb,
                self.config.max_degradation_steps,
                self.config.memory_sample_interval,
            ))
        });

        let mut state = RunState {
            base_elapsed_ms: metrics.elapsed_ms,
            metrics,
            retained: Vec::new(),
            monitor,
            started: Instant::now(),
        };

        info!(
            event = "run_started",
            resumed,
            start_offset = chunker.next_offset(),
            chunk_size = chunker.chunk_size(),
            "enrichment run started"
        );

        while let Some(chunk) = chunker.next_chunk().map_err(source_read)? {
            let span = span!(
                Level::INFO,
                "enrich.chunk",
                chunk = chunk.index,
                offset = chunk.offset,
                records = chunk.len()
            );
            self.process_chunk(chunk, &mut chunker, &mut state)
                .instrument(span)
                .await?;
        }

        state.refresh_elapsed();
        if let Some(monitor) = &state.monitor {
            state.metrics.observe_peak_memory(monitor.peak_mb());
        }

        let gate = QualityGate::from_config(&self.config).evaluate(&state.metrics);
        let report = state.metrics.finalize(gate);
        if let Some(sink) = &self.metrics_sink {
            sink.emit(&report)?;
        }
        self.tracker.complete()?;

        let status = if report.gate.passed() {
            RunStatus::Passed
        } else {
            RunStatus::QualityGateFailed
        };
        info!(
            event = "run_completed",
            status = ?status,
            total_records = report.total_records,
            matched_records = report.matched_records,
            match_rate = report.match_rate,
            failed_chunks = report.failed_chunks,
            total_duration_ms = report.total_duration_ms,
            "enrichment run completed"
        );

        Ok(RunReport {
            status,
            metrics: report,
            results: state.retained,
        })
    }

    async fn process_chunk<I, E>(
        &self,
        mut chunk: Chunk,
        chunker: &mut Chunker<I>,
        state: &mut RunState,
    ) -> Result<(), EngineError>
    where
        I: Iterator<Item = Result<SourceRecord, E>>,
        E: SourceError,
    {
        let started = Instant::now();
        let records = Arc::clone(&chunk.records);
        let index = chunk.index;
        let monitor = state.monitor.clone();
        let mut transition_error = None;

        let scored = self
            .retry
            .run_observed(
                |attempt| self.score(Arc::clone(&records), monitor.clone(), attempt),
                |event| {
                    if let Err(err) = follow_retry(&mut chunk, event) {
                        transition_error.get_or_insert(err);
                    }
                },
            )
            .await;
        let mut retries = scored.retries();

        // Delivery runs untimed after scoring settles, so a sink only ever
        // holds results of chunks that end SUCCEEDED.
        let result = match (scored.result, &self.result_sink) {
            (Ok(results), Some(sink)) => {
                let shared = Arc::new(results);
                let delivered = self
                    .delivery
                    .run_observed(
                        |_| deliver(Arc::clone(sink), index, Arc::clone(&shared)),
                        |event| {
                            if let Err(err) = follow_retry(&mut chunk, event) {
                                transition_error.get_or_insert(err);
                            }
                        },
                    )
                    .await;
                retries += delivered.retries();
                delivered.result.map(|()| {
                    Arc::try_unwrap(shared).unwrap_or_else(|shared| Vec::clone(&shared))
                })
            }
            (unsent, _) => unsent,
        };
        if let Some(source) = transition_error {
            return Err(EngineError::ChunkState { index, source });
        }

        let elapsed = started.elapsed();
        match result {
            Ok(results) => {
                set_status(&mut chunk, ChunkStatus::Succeeded)?;
                state.metrics.merge(
                    MetricsDelta::from_results(&results)
                        .with_retries(retries)
                        .with_duration_ms(elapsed.as_millis() as u64),
                );
                if self.config.retain_results {
                    state.retained.extend(results);
                }
            }
            Err(error) => {
                set_status(&mut chunk, ChunkStatus::Failed)?;
                state.metrics.merge(
                    MetricsDelta::failed_chunk(chunk.len())
                        .with_retries(retries)
                        .with_duration_ms(elapsed.as_millis() as u64),
                );
                warn!(
                    event = "chunk_failed_permanently",
                    retries,
                    error = %error,
                    failed_chunks = state.metrics.failed_chunks,
                    "chunk exhausted its attempts"
                );
                if state.metrics.failed_chunks > self.config.max_failed_chunks {
                    return Err(EngineError::TooManyFailedChunks {
                        failed: state.metrics.failed_chunks,
                        limit: self.config.max_failed_chunks,
                    });
                }
            }
        }

        let exhausted = self.check_memory(chunker, state)?;
        state.refresh_elapsed();
        self.tracker
            .chunk_finished(&chunk, elapsed, &state.metrics, chunker.chunk_size())?;

        match exhausted {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Applies the boundary verdict. An exhausted verdict is returned rather
    /// than raised so the finished chunk is still checkpointed.
    fn check_memory<I, E>(
        &self,
        chunker: &mut Chunker<I>,
        state: &mut RunState,
    ) -> Result<Option<EngineError>, EngineError>
    where
        I: Iterator<Item = Result<SourceRecord, E>>,
        E: SourceError,
    {
        let Some(monitor) = state.monitor.clone() else {
            return Ok(None);
        };
        let verdict = monitor.check_boundary();
        state.metrics.observe_peak_memory(monitor.peak_mb());

        match verdict {
            MemoryVerdict::Healthy { .. } => Ok(None),
            MemoryVerdict::Degrade { used_mb, step } => {
                let from = chunker.chunk_size();
                let to = degraded_chunk_size(from);
                chunker.set_chunk_size(to);
                state.metrics.record_chunk_size(to);
                state.metrics.degradation_events += 1;

                let mut spilled = 0;
                if let Some(spill) = &self.spill_store {
                    if !state.retained.is_empty() {
                        spill.spill(&state.retained)?;
                        spilled = state.retained.len();
                        state.metrics.spilled_results += spilled as u64;
                        state.retained.clear();
                        state.retained.shrink_to_fit();
                    }
                }
                warn!(
                    event = "chunk_size_degraded",
                    used_mb,
                    threshold_mb = monitor.threshold_mb(),
                    step,
                    from,
                    to,
                    spilled,
                    "memory pressure; shrinking chunks"
                );
                Ok(None)
            }
            MemoryVerdict::Exhausted { used_mb, steps } => {
                warn!(
                    event = "memory_exhausted",
                    used_mb,
                    threshold_mb = monitor.threshold_mb(),
                    steps,
                    "memory still above threshold after degradation; aborting"
                );
                Ok(Some(EngineError::ResourceExhausted {
                    used_mb,
                    threshold_mb: monitor.threshold_mb(),
                    steps,
                }))
            }
        }
    }

    /// One scoring attempt on the worker pool. Checks the cancel token
    /// between records so a timed-out attempt stops producing results.
    async fn score(
        &self,
        records: Arc<[SourceRecord]>,
        monitor: Option<Arc<MemoryMonitor>>,
        attempt: Attempt,
    ) -> Result<Vec<MatchResult>, ChunkError> {
        let pipeline = Arc::clone(&self.pipeline);
        let pool = Arc::clone(&self.pool);
        let cancel = attempt.cancel;

        let handle = tokio::task::spawn_blocking(move || -> Result<Vec<MatchResult>, ChunkError> {
            let results = pool.install(|| {
                records
                    .par_iter()
                    .enumerate()
                    .map(|(position, record)| {
                        if cancel.is_cancelled() {
                            return Err(ChunkError::Cancelled);
                        }
                        if let Some(monitor) = &monitor {
                            monitor.observe_record(position);
                        }
                        Ok(pipeline.match_record(record))
                    })
                    .collect::<Result<Vec<_>, ChunkError>>()
            })?;
            if cancel.is_cancelled() {
                return Err(ChunkError::Cancelled);
            }
            Ok(results)
        });
        joined(handle.await)
    }
}

/// Hands one scored chunk to the sink on the blocking pool.
async fn deliver(
    sink: Arc<dyn ResultSink>,
    chunk_index: u64,
    results: Arc<Vec<MatchResult>>,
) -> Result<(), ChunkError> {
    let handle = tokio::task::spawn_blocking(move || {
        sink.accept(chunk_index, &results).map_err(ChunkError::from)
    });
    joined(handle.await)
}

fn joined<T>(
    outcome: Result<Result<T, ChunkError>, tokio::task::JoinError>,
) -> Result<T, ChunkError> {
    match outcome {
        Ok(result) => result,
        Err(err) if err.is_panic() => Err(ChunkError::Worker(err.to_string())),
        Err(_) => Err(ChunkError::Cancelled),
    }
}

/// Mirrors retry lifecycle events onto the chunk status. A start event for
/// a chunk that is already running is a no-op.
fn follow_retry<E>(chunk: &mut Chunk, event: RetryEvent<'_, E>) -> Result<(), ChunkError> {
    let next = match event {
        RetryEvent::AttemptStarted { .. } => ChunkStatus::Running,
        RetryEvent::Retrying { .. } => ChunkStatus::Retrying,
        RetryEvent::GaveUp { .. } => return Ok(()),
    };
    if chunk.status() == next {
        return Ok(());
    }
    chunk.transition(next)
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("candidates", &self.index.len())
            .field("pipeline", &self.pipeline)
            .field("workers", &self.pool.current_num_threads())
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

fn set_status(chunk: &mut Chunk, next: ChunkStatus) -> Result<(), EngineError> {
    let index = chunk.index;
    chunk
        .transition(next)
        .map_err(|source| EngineError::ChunkState { index, source })
}

fn source_read<E: Display>(failure: SourceFailure<E>) -> EngineError {
    EngineError::SourceRead {
        offset: failure.offset,
        reason: failure.error.to_string(),
    }
}
