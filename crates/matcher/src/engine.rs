use std::sync::Arc;

use crate::fuzzy::FuzzyMatcher;
use crate::index::LookupIndex;
use crate::prepare::PreparedRecord;
use crate::types::{IdentifierKind, MatchResult, SourceRecord};


/// One way of pairing a source record with a candidate.
///
/// Strategies are pure with respect to the index: the same record against the
/// same index always yields the same answer, so they can run from any thread.
pub trait MatchStrategy: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &'static str;

    /// `None` means "no acceptable candidate, try the next strategy".
    fn try_match(&self, record: &PreparedRecord<'_>, index: &LookupIndex) -> Option<MatchResult>;
}

/// Probes a single identifier family. A hit is final with score 100.
#[derive(Debug, Clone, Copy)]
pub struct ExactMatcher {
    kind: IdentifierKind,
}

impl ExactMatcher {
    pub fn new(kind: IdentifierKind) -> Self {
        Self { kind }
    }

    pub fn kind(&self) -> IdentifierKind {
        self.kind
    }
}

impl MatchStrategy for ExactMatcher {
    fn name(&self) -> &'static str {
        match self.kind {
            IdentifierKind::Primary => "exact-primary",
            IdentifierKind::Secondary => "exact-secondary",
        }
    }

    fn try_match(&self, record: &PreparedRecord<'_>, index: &LookupIndex) -> Option<MatchResult> {
        let key = record.key(self.kind)?;
        let slot = index.lookup(self.kind, key)?;
        let candidate = index.candidate_ref(slot)?;
        Some(MatchResult::exact(record.source.id.clone(), self.kind, candidate))
    }
}

/// Ordered strategy chain over a shared index.
///
/// Exact matchers run first in the configured order; the first hit
/// short-circuits. The fuzzy matcher, when enabled, only sees records every
/// exact matcher passed on.
pub struct MatchPipeline {
    index: Arc<LookupIndex>,
    strategies: Vec<Box<dyn MatchStrategy>>,
}

impl MatchPipeline {
    pub fn new(index: Arc<LookupIndex>) -> Self {
        Self {
            index,
            strategies: Vec::new(),
        }
    }

    /// Appends exact matchers in priority order.
    pub fn with_exact(mut self, order: &[IdentifierKind]) -> Self {
        for kind in order {
            self.strategies.push(Box::new(ExactMatcher::new(*kind)));
        }
        self
    }

    pub fn with_fuzzy(mut self, fuzzy: FuzzyMatcher) -> Self {
        self.strategies.push(Box::new(fuzzy));
        self
    }

    /// Appends any other strategy after those already registered.
    pub fn with_strategy(mut self, strategy: Box<dyn MatchStrategy>) -> Self {
        self.strategies.push(strategy);
        self
    }

    pub fn index(&self) -> &Arc<LookupIndex> {
        &self.index
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Matches one record. Never fails: malformed input becomes an
    /// unmatched result carrying its defect.
    pub fn match_record(&self, record: &SourceRecord) -> MatchResult {
        let prepared = match PreparedRecord::prepare(record, self.index.name_config()) {
            Ok(prepared) => prepared,
            Err(defect) => return MatchResult::malformed(record.id.clone(), defect),
        };

        self.strategies
            .iter()
            .find_map(|strategy| strategy.try_match(&prepared, &self.index))
            .unwrap_or_else(|| MatchResult::unmatched(record.id.clone()))
    }
}

impl std::fmt::Debug for MatchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchPipeline")
            .field("candidates", &self.index.len())
            .field("strategies", &self.strategy_names())
            .finish()
    }
}
