//! Edit-distance name matching.
//!
//! Scores are `round(100 * (1 - levenshtein / max_chars))` over normalized
//! names, computed in integer arithmetic so identical inputs always produce
//! identical scores regardless of platform.

use crate::engine::MatchStrategy;
use crate::index::LookupIndex;
use crate::prepare::PreparedRecord;
use crate::tier::TierThresholds;
use crate::types::MatchResult;

/// Similarity score for two normalized names, 0–100.
///
/// Two empty names score 0; an empty name never matches anything.
pub fn similarity(a: &str, b: &str) -> u8 {
    let la = a.chars().count();
    let lb = b.chars().count();
    let longest = la.max(lb);
    if longest == 0 || la == 0 || lb == 0 {
        return 0;
    }
    let distance = strsim::levenshtein(a, b);
    ratio_score(longest - distance.min(longest), longest)
}

/// Highest score any name of length `candidate_len` could reach against a
/// query of length `query_len` (edit distance is at least the length gap).
fn score_ceiling(query_len: usize, candidate_len: usize) -> u8 {
    let longest = query_len.max(candidate_len);
    let gap = query_len.abs_diff(candidate_len);
    ratio_score(longest - gap, longest)
}

/// `round(100 * same / longest)` with halves rounded up.
fn ratio_score(same: usize, longest: usize) -> u8 {
    let scaled = (200 * same + longest) / (2 * longest);
    scaled.min(100) as u8
}

/// Best fuzzy candidate for a normalized name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuzzyHit {
    pub slot: usize,
    pub score: u8,
}

/// Accepts the best-scoring candidate whose score reaches the low threshold.
///
/// Ties on score go to the lexicographically smallest normalized candidate
/// name, then to the lowest arena slot, so results never depend on hash or
/// thread ordering.
#[derive(Debug, Clone, Copy, Default)]
pub struct FuzzyMatcher {
    thresholds: TierThresholds,
}

impl FuzzyMatcher {
    pub fn new(thresholds: TierThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &TierThresholds {
        &self.thresholds
    }

    /// Scans every fuzzy-eligible candidate, skipping length buckets whose
    /// score ceiling is below both the acceptance floor and the best so far.
    /// Returns the best candidate at or above the low threshold.
    pub fn best_candidate(&self, name: &str, index: &LookupIndex) -> Option<FuzzyHit> {
        let query_len = name.chars().count();
        if query_len == 0 {
            return None;
        }
        let floor = self.thresholds.low();
        let mut best: Option<FuzzyHit> = None;

        for (len, slots) in index.length_buckets() {
            let ceiling = score_ceiling(query_len, len);
            let bar = best.map_or(floor, |b| b.score.max(floor));
            if ceiling < bar {
                continue;
            }
            for &slot in slots {
                let candidate_name = index.normalized_name(slot);
                let score = similarity(name, candidate_name);
                if score < floor {
                    continue;
                }
                let better = match best {
                    None => true,
                    Some(current) if score != current.score => score > current.score,
                    Some(current) => {
                        (candidate_name, slot) < (index.normalized_name(current.slot), current.slot)
                    }
                };
                if better {
                    best = Some(FuzzyHit { slot, score });
                }
            }
        }
        best
    }
}

impl MatchStrategy for FuzzyMatcher {
    fn name(&self) -> &'static str {
        "fuzzy"
    }

    fn try_match(&self, record: &PreparedRecord<'_>, index: &LookupIndex) -> Option<MatchResult> {
        let hit = self.best_candidate(record.name(), index)?;
        let candidate = index.candidate_ref(hit.slot)?;
        let tier = self.thresholds.classify(hit.score);
        Some(MatchResult::fuzzy(
            record.source.id.clone(),
            candidate,
            hit.score,
            tier,
        ))
    }
}
