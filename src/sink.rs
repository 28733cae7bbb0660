//! Downstream delivery of match results.

use std::sync::Mutex;

use matcher::MatchResult;

use crate::error::SinkError;

/// Receives each successful chunk's results, in chunk order.
///
/// Called from a blocking worker thread. A chunk whose attempt times out may
/// still be delivered by the abandoned attempt, so implementations that load
/// into a store should upsert by `source_id`.
pub trait ResultSink: Send + Sync {
    fn accept(&self, chunk_index: u64, results: &[MatchResult]) -> Result<(), SinkError>;
}

/// Keeps every delivered batch in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    batches: Mutex<Vec<(u64, Vec<MatchResult>)>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivered batches as `(chunk_index, results)`, in delivery order.
    pub fn batches(&self) -> Vec<(u64, Vec<MatchResult>)> {
        self.batches
            .lock()
            .map(|b| b.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// All delivered results flattened in delivery order.
    pub fn results(&self) -> Vec<MatchResult> {
        self.batches().into_iter().flat_map(|(_, r)| r).collect()
    }
}

impl ResultSink for CollectingSink {
    fn accept(&self, chunk_index: u64, results: &[MatchResult]) -> Result<(), SinkError> {
        let mut batches = self
            .batches
            .lock()
            .map_err(|_| SinkError::Unavailable("collector lock poisoned".into()))?;
        batches.push((chunk_index, results.to_vec()));
        Ok(())
    }
}
