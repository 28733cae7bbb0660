//! Exact-identifier normalization.
//!
//! Identifiers (UEI, DUNS, and similar registry keys) are compared by plain
//! equality after this normalization, so the lookup index and the probing side
//! must both go through [`normalize_identifier`].

use unicode_normalization::UnicodeNormalization;

/// Normalizes a raw identifier for exact lookup.
///
/// Steps, in order:
/// 1. NFKC, so fullwidth digits and letters fold to ASCII
/// 2. Uppercase
/// 3. Drop everything that is not a letter or digit (this also trims);
///    non-ASCII letters such as `É` are kept
///
/// An identifier that is empty after these steps is treated as absent and
/// yields `None`; it is never indexed and never probed.
///
/// ```rust
/// use canonical::normalize_identifier;
///
/// assert_eq!(normalize_identifier(" ab-12.3c "), Some("AB123C".to_string()));
/// assert_eq!(normalize_identifier("12-345-6789"), Some("123456789".to_string()));
/// assert_eq!(normalize_identifier(" -- "), None);
/// assert_eq!(normalize_identifier(""), None);
/// ```
pub fn normalize_identifier(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.nfkc() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_uppercase());
        }
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Normalizes an optional identifier field, treating `None` and blank values
/// alike.
pub fn normalize_identifier_opt(raw: Option<&str>) -> Option<String> {
    raw.and_then(normalize_identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_case_and_punctuation() {
        assert_eq!(normalize_identifier("abc-def_123"), Some("ABCDEF123".into()));
        assert_eq!(normalize_identifier("\tQ1W2 E3\n"), Some("Q1W2E3".into()));
    }

    #[test]
    fn fullwidth_digits_fold_to_ascii() {
        assert_eq!(normalize_identifier("１２３ａｂ"), Some("123AB".into()));
    }

    #[test]
    fn non_ascii_letters_survive() {
        assert_eq!(normalize_identifier("café-12"), Some("CAFÉ12".into()));
        // decomposed accent composes under NFKC first
        assert_eq!(normalize_identifier("cafe\u{301}12"), Some("CAFÉ12".into()));
        assert_ne!(normalize_identifier("É1"), normalize_identifier("1"));
    }

    #[test]
    fn empty_after_normalization_is_absent() {
        assert_eq!(normalize_identifier("   "), None);
        assert_eq!(normalize_identifier("---/."), None);
        assert_eq!(normalize_identifier_opt(None), None);
        assert_eq!(normalize_identifier_opt(Some("")), None);
    }

    #[test]
    fn same_key_from_differently_formatted_inputs() {
        let a = normalize_identifier("ZQGGHJH74DW7");
        let b = normalize_identifier(" zqgg-hjh7-4dw7 ");
        assert_eq!(a, b);
    }
}
