use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};

/// Exact identifier families. Each gets its own map in the
/// [`LookupIndex`](crate::LookupIndex).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    /// Primary registry key (e.g. UEI).
    Primary,
    /// Secondary/legacy registry key (e.g. DUNS).
    Secondary,
}

impl IdentifierKind {
    /// Every kind, in default probe priority.
    pub const ALL: [IdentifierKind; 2] = [IdentifierKind::Primary, IdentifierKind::Secondary];

    /// Method recorded on a result produced by probing this kind.
    pub fn method(self) -> MatchMethod {
        match self {
            IdentifierKind::Primary => MatchMethod::ExactPrimary,
            IdentifierKind::Secondary => MatchMethod::ExactSecondary,
        }
    }

    pub(crate) fn position(self) -> usize {
        match self {
            IdentifierKind::Primary => 0,
            IdentifierKind::Secondary => 1,
        }
    }
}

/// One award/entity to be enriched. Immutable once read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SourceRecord {
    /// Stable identifier of the award record. Missing reads as blank.
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_id: Option<String>,
    /// Display name used for fuzzy matching.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Passthrough fields carried untouched to the downstream loader.
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
    #[serde(skip)]
    unreadable: bool,
}

impl SourceRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Stands in for an entry the source could not decode, so it is still
    /// counted and reported as [`RecordDefect::Unreadable`].
    pub fn unreadable() -> Self {
        Self {
            unreadable: true,
            ..Default::default()
        }
    }

    pub fn is_unreadable(&self) -> bool {
        self.unreadable
    }

    pub fn with_primary_id(mut self, value: impl Into<String>) -> Self {
        self.primary_id = Some(value.into());
        self
    }

    pub fn with_secondary_id(mut self, value: impl Into<String>) -> Self {
        self.secondary_id = Some(value.into());
        self
    }

    pub fn with_name(mut self, value: impl Into<String>) -> Self {
        self.name = Some(value.into());
        self
    }

    /// Raw (un-normalized) identifier of the given kind.
    pub fn identifier(&self, kind: IdentifierKind) -> Option<&str> {
        match kind {
            IdentifierKind::Primary => self.primary_id.as_deref(),
            IdentifierKind::Secondary => self.secondary_id.as_deref(),
        }
    }
}

/// One reference/lookup entity (a recipient).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CandidateRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_id: Option<String>,
    /// Canonical organization name.
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

impl CandidateRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_primary_id(mut self, value: impl Into<String>) -> Self {
        self.primary_id = Some(value.into());
        self
    }

    pub fn with_secondary_id(mut self, value: impl Into<String>) -> Self {
        self.secondary_id = Some(value.into());
        self
    }

    pub fn identifier(&self, kind: IdentifierKind) -> Option<&str> {
        match kind {
            IdentifierKind::Primary => self.primary_id.as_deref(),
            IdentifierKind::Secondary => self.secondary_id.as_deref(),
        }
    }
}

/// How a result was produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum MatchMethod {
    ExactPrimary,
    ExactSecondary,
    Fuzzy,
    None,
}

impl MatchMethod {
    pub const ALL: [MatchMethod; 4] = [
        MatchMethod::ExactPrimary,
        MatchMethod::ExactSecondary,
        MatchMethod::Fuzzy,
        MatchMethod::None,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MatchMethod::ExactPrimary => "exact-primary",
            MatchMethod::ExactSecondary => "exact-secondary",
            MatchMethod::Fuzzy => "fuzzy",
            MatchMethod::None => "none",
        }
    }
}

/// Categorical confidence bucket derived from a score and the configured
/// [`TierThresholds`](crate::TierThresholds).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
    None,
}

impl ConfidenceTier {
    pub const ALL: [ConfidenceTier; 4] = [
        ConfidenceTier::High,
        ConfidenceTier::Medium,
        ConfidenceTier::Low,
        ConfidenceTier::None,
    ];
}

/// Reference into the lookup index's candidate arena.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CandidateRef {
    /// Arena slot; resolve with [`LookupIndex::candidate`](crate::LookupIndex::candidate).
    pub slot: usize,
    /// Candidate's own identifier, copied for downstream loaders.
    pub id: String,
}

/// Why a source record could not be matched at all.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordDefect {
    /// The record's own identifier is blank.
    BlankId,
    /// An identifier field is present but contains nothing usable.
    UnparseableIdentifier(IdentifierKind),
    /// No usable identifier and no usable name.
    NothingToMatch,
    /// The source entry could not be decoded into a record.
    Unreadable,
}

/// Outcome of matching one source record.
///
/// Constructors uphold the invariant
/// `method == None` ⇔ `tier == None` ⇔ `candidate.is_none()`, so the fields
/// are private.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MatchResult {
    source_id: String,
    candidate: Option<CandidateRef>,
    method: MatchMethod,
    score: u8,
    tier: ConfidenceTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    defect: Option<RecordDefect>,
}

impl MatchResult {
    /// No strategy accepted a candidate.
    pub fn unmatched(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            candidate: None,
            method: MatchMethod::None,
            score: 0,
            tier: ConfidenceTier::None,
            defect: None,
        }
    }

    /// The record was rejected by validation before any strategy ran.
    pub fn malformed(source_id: impl Into<String>, defect: RecordDefect) -> Self {
        Self {
            defect: Some(defect),
            ..Self::unmatched(source_id)
        }
    }

    /// Exact identifier hit: always score 100, tier HIGH.
    pub fn exact(source_id: impl Into<String>, kind: IdentifierKind, candidate: CandidateRef) -> Self {
        Self {
            source_id: source_id.into(),
            candidate: Some(candidate),
            method: kind.method(),
            score: 100,
            tier: ConfidenceTier::High,
            defect: None,
        }
    }

    /// Fuzzy result. A `None` tier means the candidate was rejected and the
    /// result degrades to [`MatchResult::unmatched`].
    pub fn fuzzy(
        source_id: impl Into<String>,
        candidate: CandidateRef,
        score: u8,
        tier: ConfidenceTier,
    ) -> Self {
        if tier == ConfidenceTier::None {
            return Self::unmatched(source_id);
        }
        Self {
            source_id: source_id.into(),
            candidate: Some(candidate),
            method: MatchMethod::Fuzzy,
            score: score.min(100),
            tier,
            defect: None,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn candidate(&self) -> Option<&CandidateRef> {
        self.candidate.as_ref()
    }

    pub fn method(&self) -> MatchMethod {
        self.method
    }

    /// Confidence score 0–100. Exact matches are always 100; unmatched
    /// results report 0.
    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn tier(&self) -> ConfidenceTier {
        self.tier
    }

    pub fn defect(&self) -> Option<RecordDefect> {
        self.defect
    }

    pub fn is_matched(&self) -> bool {
        self.method != MatchMethod::None
    }

    pub fn is_malformed(&self) -> bool {
        self.defect.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cref(slot: usize) -> CandidateRef {
        CandidateRef {
            slot,
            id: format!("cand-{slot}"),
        }
    }

    #[test]
    fn exact_results_are_full_confidence() {
        let r = MatchResult::exact("a-1", IdentifierKind::Secondary, cref(3));
        assert_eq!(r.method(), MatchMethod::ExactSecondary);
        assert_eq!(r.score(), 100);
        assert_eq!(r.tier(), ConfidenceTier::High);
        assert!(r.is_matched());
    }

    #[test]
    fn rejected_fuzzy_collapses_to_unmatched() {
        let r = MatchResult::fuzzy("a-1", cref(0), 40, ConfidenceTier::None);
        assert_eq!(r.method(), MatchMethod::None);
        assert_eq!(r.tier(), ConfidenceTier::None);
        assert!(r.candidate().is_none());
    }

    #[test]
    fn malformed_is_unmatched_with_defect() {
        let r = MatchResult::malformed("", RecordDefect::BlankId);
        assert!(!r.is_matched());
        assert!(r.is_malformed());
        assert_eq!(r.tier(), ConfidenceTier::None);
    }

    #[test]
    fn passthrough_fields_survive_serde() {
        let raw = json!({
            "id": "award-9",
            "primary_id": "abc123",
            "name": "Acme",
            "amount": 1250.5,
            "agency": "DOE"
        });
        let rec: SourceRecord = serde_json::from_value(raw.clone()).expect("record parses");
        assert_eq!(rec.identifier(IdentifierKind::Primary), Some("abc123"));
        assert_eq!(rec.extra.get("agency"), Some(&json!("DOE")));
        assert_eq!(serde_json::to_value(&rec).expect("serializes"), raw);
    }

    #[test]
    fn missing_id_reads_as_blank() {
        let rec: SourceRecord =
            serde_json::from_value(json!({"name": "Globex Corps"})).expect("record parses");
        assert_eq!(rec.id, "");
        assert!(!rec.is_unreadable());
        assert!(serde_json::to_value(&rec).expect("serializes").get("unreadable").is_none());
    }

    #[test]
    fn method_serializes_kebab_case() {
        let r = MatchResult::exact("a", IdentifierKind::Primary, cref(1));
        let v = serde_json::to_value(&r).expect("serializes");
        assert_eq!(v["method"], json!("exact-primary"));
        assert_eq!(v["tier"], json!("HIGH"));
        assert!(v.get("defect").is_none());
    }
}
