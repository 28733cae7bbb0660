//! Read-only lookup structure built once over the candidate set.
//!
//! Candidates live in an arena (`Vec`) addressed by slot. Exact keys map to
//! slots; fuzzy matching walks the normalized names grouped by character
//! length so whole length buckets can be skipped when their best possible
//! score cannot beat the current best.

use std::collections::{BTreeMap, HashMap};

use canonical::{normalize_identifier_opt, normalize_name, NameConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::types::{CandidateRecord, CandidateRef, IdentifierKind};

/// Keys claimed by more than one candidate. First occurrence wins.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DuplicateCounts {
    pub primary: u64,
    pub secondary: u64,
}

impl DuplicateCounts {
    pub fn get(&self, kind: IdentifierKind) -> u64 {
        match kind {
            IdentifierKind::Primary => self.primary,
            IdentifierKind::Secondary => self.secondary,
        }
    }

    pub fn total(&self) -> u64 {
        self.primary + self.secondary
    }

    fn bump(&mut self, kind: IdentifierKind) {
        match kind {
            IdentifierKind::Primary => self.primary += 1,
            IdentifierKind::Secondary => self.secondary += 1,
        }
    }
}

/// Immutable after [`LookupIndex::build`]; share it behind an `Arc`.
#[derive(Debug)]
pub struct LookupIndex {
    candidates: Vec<CandidateRecord>,
    names: Vec<String>,
    keys: [HashMap<String, usize>; 2],
    by_length: BTreeMap<usize, Vec<usize>>,
    duplicates: DuplicateCounts,
    name_config: NameConfig,
}

impl LookupIndex {
    /// Builds the index from candidates in input order.
    ///
    /// When two candidates share a normalized key the earlier one keeps it and
    /// the collision is counted in [`LookupIndex::duplicates`]. Candidates
    /// whose normalized name is empty are exact-only.
    pub fn build<I>(candidates: I, name_config: &NameConfig) -> Self
    where
        I: IntoIterator<Item = CandidateRecord>,
    {
        let candidates: Vec<CandidateRecord> = candidates.into_iter().collect();
        let mut keys: [HashMap<String, usize>; 2] = [
            HashMap::with_capacity(candidates.len()),
            HashMap::with_capacity(candidates.len()),
        ];
        let mut names = Vec::with_capacity(candidates.len());
        let mut by_length: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        let mut duplicates = DuplicateCounts::default();

        for (slot, candidate) in candidates.iter().enumerate() {
            for kind in IdentifierKind::ALL {
                let Some(key) = normalize_identifier_opt(candidate.identifier(kind)) else {
                    continue;
                };
                let map = &mut keys[kind.position()];
                if let Some(&kept) = map.get(&key) {
                    duplicates.bump(kind);
                    debug!(
                        event = "duplicate_key",
                        kind = ?kind,
                        key = %key,
                        kept_slot = kept,
                        dropped_slot = slot,
                        "candidate key already indexed"
                    );
                    continue;
                }
                map.insert(key, slot);
            }

            let name = normalize_name(&candidate.name, name_config);
            let len = name.chars().count();
            if len > 0 {
                by_length.entry(len).or_default().push(slot);
            }
            names.push(name);
        }

        info!(
            event = "lookup_index_built",
            candidates = candidates.len(),
            primary_keys = keys[0].len(),
            secondary_keys = keys[1].len(),
            duplicate_keys = duplicates.total(),
            "lookup index ready"
        );

        Self {
            candidates,
            names,
            keys,
            by_length,
            duplicates,
            name_config: name_config.clone(),
        }
    }

    /// Exact probe with an already normalized key.
    pub fn lookup(&self, kind: IdentifierKind, key: &str) -> Option<usize> {
        self.keys[kind.position()].get(key).copied()
    }

    pub fn candidate(&self, slot: usize) -> Option<&CandidateRecord> {
        self.candidates.get(slot)
    }

    /// Normalized canonical name stored for `slot` (empty when out of range).
    pub fn normalized_name(&self, slot: usize) -> &str {
        self.names.get(slot).map(String::as_str).unwrap_or("")
    }

    pub fn candidate_ref(&self, slot: usize) -> Option<CandidateRef> {
        self.candidate(slot).map(|c| CandidateRef {
            slot,
            id: c.id.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn key_count(&self, kind: IdentifierKind) -> usize {
        self.keys[kind.position()].len()
    }

    pub fn duplicates(&self) -> DuplicateCounts {
        self.duplicates
    }

    /// Name normalization used at build time. Probes must use the same.
    pub fn name_config(&self) -> &NameConfig {
        &self.name_config
    }

    /// Fuzzy-eligible slots grouped by normalized name length, shortest first.
    pub(crate) fn length_buckets(&self) -> impl Iterator<Item = (usize, &[usize])> {
        self.by_length.iter().map(|(len, slots)| (*len, slots.as_slice()))
    }
}
