//! # Award Matcher (`matcher`)
//!
//! ## Purpose
//!
//! `matcher` pairs award records with recipient (candidate) records. It owns
//! the read-only [`LookupIndex`] built once over the candidate set and the
//! strategies that probe it:
//!
//! - [`ExactMatcher`]: one per identifier family (primary, secondary),
//!   comparing normalized keys for equality. A hit is final, score 100.
//! - [`FuzzyMatcher`]: edit-distance similarity over normalized names, for
//!   records every exact matcher passed on.
//!
//! [`MatchPipeline`] chains them in a configured order and turns malformed
//! records into unmatched results instead of errors, so one bad row never
//! aborts a batch.
//!
//! ## Determinism
//!
//! Every strategy is a pure function of `(record, index)`. Fuzzy ties are
//! broken by normalized candidate name and then arena slot, never by hash
//! order, so the same inputs produce the same results on any thread.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use canonical::NameConfig;
//! use matcher::{
//!     CandidateRecord, FuzzyMatcher, IdentifierKind, LookupIndex, MatchMethod, MatchPipeline,
//!     SourceRecord, TierThresholds,
//! };
//!
//! let index = LookupIndex::build(
//!     vec![CandidateRecord::new("rcp-1", "Acme Widgets Inc").with_primary_id("ZQ1")],
//!     &NameConfig::default(),
//! );
//! let pipeline = MatchPipeline::new(Arc::new(index))
//!     .with_exact(&IdentifierKind::ALL)
//!     .with_fuzzy(FuzzyMatcher::new(TierThresholds::default()));
//!
//! let hit = pipeline.match_record(&SourceRecord::new("award-1").with_primary_id("zq-1"));
//! assert_eq!(hit.method(), MatchMethod::ExactPrimary);
//!
//! let fuzzy = pipeline.match_record(&SourceRecord::new("award-2").with_name("ACME WIDGETS, INC."));
//! assert_eq!(fuzzy.method(), MatchMethod::Fuzzy);
//! assert_eq!(fuzzy.score(), 100);
//! ```

mod engine;
mod fuzzy;
mod index;
mod prepare;
mod tier;
mod types;

pub use crate::engine::{ExactMatcher, MatchPipeline, MatchStrategy};
pub use crate::fuzzy::{similarity, FuzzyHit, FuzzyMatcher};
pub use crate::index::{DuplicateCounts, LookupIndex};
pub use crate::prepare::PreparedRecord;
pub use crate::tier::{TierConfigError, TierThresholds};
pub use crate::types::{
    CandidateRecord, CandidateRef, ConfidenceTier, IdentifierKind, MatchMethod, MatchResult,
    RecordDefect, SourceRecord,
};
