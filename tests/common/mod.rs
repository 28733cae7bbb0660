#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use award_enrich::{
    CandidateRecord, Engine, EngineBuilder, EngineConfig, MatchResult, MemorySampler, ResultSink,
    SinkError, SourceRecord,
};

/// Five candidates reachable by primary identifier, three by name only.
pub fn candidates() -> Vec<CandidateRecord> {
    vec![
        CandidateRecord::new("rcp-01", "Acme Widgets Inc").with_primary_id("UEI0001"),
        CandidateRecord::new("rcp-02", "Initech LLC").with_primary_id("UEI0002"),
        CandidateRecord::new("rcp-03", "Umbrella Pharmaceuticals").with_primary_id("UEI0003"),
        CandidateRecord::new("rcp-04", "Wayne Enterprises").with_primary_id("UEI0004"),
        CandidateRecord::new("rcp-05", "Stark Industries").with_primary_id("UEI0005"),
        CandidateRecord::new("rcp-06", "Globex Corporation"),
        CandidateRecord::new("rcp-07", "Vandal Corporation"),
        CandidateRecord::new("rcp-08", "Tyrell Corporation"),
    ]
}

/// Ten awards: 5 exact primary hits, 3 fuzzy hits scoring 92, 2 that match
/// nothing.
pub fn awards() -> Vec<SourceRecord> {
    vec![
        SourceRecord::new("award-01").with_primary_id("uei-0001"),
        SourceRecord::new("award-02").with_primary_id("UEI 0002").with_name("Initech"),
        SourceRecord::new("award-03").with_primary_id("uei0003"),
        SourceRecord::new("award-04").with_primary_id("UEI0004"),
        SourceRecord::new("award-05").with_primary_id("UEI-0005"),
        // one extra letter over twelve characters
        SourceRecord::new("award-06").with_name("Globex Corps"),
        SourceRecord::new("award-07").with_name("Vandal Corps"),
        SourceRecord::new("award-08").with_name("Tyrell Corps"),
        SourceRecord::new("award-09").with_name("Zorblax Bakery"),
        SourceRecord::new("award-10").with_name("Quuxly Plumbing"),
    ]
}

pub fn ok<T>(records: T) -> impl Iterator<Item = Result<SourceRecord, Infallible>>
where
    T: IntoIterator<Item = SourceRecord>,
{
    records.into_iter().map(Ok)
}

/// Small chunks, no real memory sampling, millisecond backoff.
pub fn config() -> EngineConfig {
    EngineConfig {
        chunk_size: 4,
        match_rate_threshold: 0.8,
        enable_memory_monitoring: false,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 10,
        ..EngineConfig::default()
    }
}

pub fn builder(config: EngineConfig) -> EngineBuilder {
    Engine::builder(config).candidates(candidates())
}

pub fn engine(config: EngineConfig) -> Engine {
    builder(config).build().expect("engine builds")
}

pub fn ids(results: &[MatchResult]) -> Vec<String> {
    results.iter().map(|r| r.source_id().to_string()).collect()
}

/// Fails with a transient error for the first `failures` calls.
pub struct FlakySink {
    remaining: AtomicU32,
    pub calls: AtomicU32,
}

impl FlakySink {
    pub fn new(failures: u32) -> Arc<Self> {
        Arc::new(Self {
            remaining: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        })
    }
}

impl ResultSink for FlakySink {
    fn accept(&self, _chunk: u64, _results: &[MatchResult]) -> Result<(), SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match left {
            Ok(_) => Err(SinkError::Unavailable("loader throttled".into())),
            Err(_) => Ok(()),
        }
    }
}

/// Permanently rejects every batch.
pub struct RejectingSink;

impl ResultSink for RejectingSink {
    fn accept(&self, _chunk: u64, _results: &[MatchResult]) -> Result<(), SinkError> {
        Err(SinkError::Rejected("schema mismatch".into()))
    }
}

/// Blocks for `delay` on every call.
pub struct SlowSink {
    delay: Duration,
    pub calls: AtomicU32,
}

impl SlowSink {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            calls: AtomicU32::new(0),
        })
    }
}

impl ResultSink for SlowSink {
    fn accept(&self, _chunk: u64, _results: &[MatchResult]) -> Result<(), SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        Ok(())
    }
}

/// Always reports the same resident size.
pub struct FixedSampler(pub u64);

impl MemorySampler for FixedSampler {
    fn sample_mb(&self) -> Option<u64> {
        Some(self.0)
    }
}

/// Sleeps on every sample, which slows scoring of each sampled record.
pub struct SlowSampler(pub Duration);

impl MemorySampler for SlowSampler {
    fn sample_mb(&self) -> Option<u64> {
        std::thread::sleep(self.0);
        Some(1)
    }
}
