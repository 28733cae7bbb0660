use canonical::{normalize_identifier, normalize_name, NameConfig};

use crate::types::{IdentifierKind, RecordDefect, SourceRecord};

/// A source record with every matchable field normalized once up front.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRecord<'a> {
    pub source: &'a SourceRecord,
    keys: [Option<String>; 2],
    unparseable: Vec<IdentifierKind>,
    name: String,
}

impl<'a> PreparedRecord<'a> {
    /// Normalizes `source`, rejecting records no strategy could act on.
    ///
    /// An identifier field that is absent or blank is fine. One that has
    /// content but normalizes to nothing (`"--"`) only disables the exact lookup of
    /// its own kind; the record is rejected for it when nothing else is left
    /// to match on.
    pub fn prepare(source: &'a SourceRecord, name_config: &NameConfig) -> Result<Self, RecordDefect> {
        if source.is_unreadable() {
            return Err(RecordDefect::Unreadable);
        }
        if source.id.trim().is_empty() {
            return Err(RecordDefect::BlankId);
        }

        let mut keys: [Option<String>; 2] = [None, None];
        let mut unparseable = Vec::new();
        for kind in IdentifierKind::ALL {
            let Some(raw) = source.identifier(kind) else {
                continue;
            };
            if raw.trim().is_empty() {
                continue;
            }
            match normalize_identifier(raw) {
                Some(key) => keys[kind.position()] = Some(key),
                None => unparseable.push(kind),
            }
        }

        let name = source
            .name
            .as_deref()
            .map(|n| normalize_name(n, name_config))
            .unwrap_or_default();

        if keys.iter().all(Option::is_none) && name.is_empty() {
            return Err(match unparseable.first() {
                Some(kind) => RecordDefect::UnparseableIdentifier(*kind),
                None => RecordDefect::NothingToMatch,
            });
        }

        Ok(Self {
            source,
            keys,
            unparseable,
            name,
        })
    }

    pub fn key(&self, kind: IdentifierKind) -> Option<&str> {
        self.keys[kind.position()].as_deref()
    }

    /// Identifier kinds that were present but unusable.
    pub fn unparseable(&self) -> &[IdentifierKind] {
        &self.unparseable
    }

    /// Normalized display name; empty when the record has none.
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prep(record: &SourceRecord) -> Result<PreparedRecord<'_>, RecordDefect> {
        PreparedRecord::prepare(record, &NameConfig::default())
    }

    #[test]
    fn normalizes_keys_and_name() {
        let rec = SourceRecord::new("a-1")
            .with_primary_id(" zq-1 ")
            .with_name("Acme, Inc.");
        let p = prep(&rec).expect("valid record");
        assert_eq!(p.key(IdentifierKind::Primary), Some("ZQ1"));
        assert_eq!(p.key(IdentifierKind::Secondary), None);
        assert_eq!(p.name(), "ACME INC");
    }

    #[test]
    fn blank_id_is_defect() {
        let rec = SourceRecord::new("  ").with_name("Acme");
        assert_eq!(prep(&rec), Err(RecordDefect::BlankId));
    }

    #[test]
    fn garbage_identifier_only_disables_its_own_lookup() {
        let rec = SourceRecord::new("a-1")
            .with_primary_id("UEI0001")
            .with_secondary_id("--/--");
        let p = prep(&rec).expect("primary still usable");
        assert_eq!(p.key(IdentifierKind::Primary), Some("UEI0001"));
        assert_eq!(p.key(IdentifierKind::Secondary), None);
        assert_eq!(p.unparseable(), &[IdentifierKind::Secondary]);

        let named = SourceRecord::new("a-2").with_secondary_id("--").with_name("Acme");
        assert_eq!(prep(&named).expect("name still usable").name(), "ACME");
    }

    #[test]
    fn garbage_identifier_with_nothing_else_is_defect() {
        let rec = SourceRecord::new("a-1").with_secondary_id("--/--");
        assert_eq!(
            prep(&rec),
            Err(RecordDefect::UnparseableIdentifier(IdentifierKind::Secondary))
        );
    }

    #[test]
    fn unreadable_entry_is_defect() {
        assert_eq!(prep(&SourceRecord::unreadable()), Err(RecordDefect::Unreadable));
    }

    #[test]
    fn blank_identifier_counts_as_absent() {
        let rec = SourceRecord::new("a-1").with_primary_id("   ").with_name("Acme");
        let p = prep(&rec).expect("blank identifier is just missing");
        assert_eq!(p.key(IdentifierKind::Primary), None);
    }

    #[test]
    fn record_without_anything_to_match() {
        let rec = SourceRecord::new("a-1").with_name(" ... ");
        assert_eq!(prep(&rec), Err(RecordDefect::NothingToMatch));
        assert_eq!(prep(&SourceRecord::new("a-2")), Err(RecordDefect::NothingToMatch));
    }
}
