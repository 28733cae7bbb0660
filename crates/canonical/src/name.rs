use std::borrow::Cow;

use unicode_categories::UnicodeCategories;
use unicode_normalization::UnicodeNormalization;

use crate::config::NameConfig;

/// Long corporate suffix spellings and the abbreviation they fold into.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("INCORPORATED", "INC"),
    ("CORPORATION", "CORP"),
    ("COMPANY", "CO"),
    ("LIMITED", "LTD"),
];

/// Normalizes an organization name for fuzzy comparison.
///
/// The output is uppercase, single-space separated, and free of punctuation:
///
/// - `&` becomes the word `AND` (when `expand_ampersand` is set)
/// - `.` and `'` are dropped without splitting, so `L.L.C.` → `LLC` and
///   `Inc.` → `INC`
/// - every other punctuation, symbol, or whitespace run is a single separator
/// - long corporate suffixes fold to their abbreviation (when
///   `fold_abbreviations` is set)
///
/// ```rust
/// use canonical::{normalize_name, NameConfig};
///
/// let cfg = NameConfig::default();
/// assert_eq!(normalize_name("Smith & Wesson, Inc.", &cfg), "SMITH AND WESSON INC");
/// assert_eq!(normalize_name("ACME Widgets Corporation", &cfg), "ACME WIDGETS CORP");
/// assert_eq!(normalize_name("  o'reilly   l.l.c. ", &cfg), "OREILLY LLC");
/// assert_eq!(normalize_name(" ... ", &cfg), "");
/// ```
pub fn normalize_name(input: &str, cfg: &NameConfig) -> String {
    let text: Cow<str> = if cfg.normalize_unicode {
        Cow::Owned(input.nfkc().collect::<String>())
    } else {
        Cow::Borrowed(input)
    };

    let mut tokens: Vec<String> = Vec::with_capacity(text.len() / 4 + 1);
    let mut current = String::new();

    for ch in text.chars() {
        for upper in ch.to_uppercase() {
            dispatch_char(upper, cfg, &mut tokens, &mut current);
        }
    }
    finalize_token(&mut tokens, &mut current, cfg);

    tokens.join(" ")
}

fn dispatch_char(ch: char, cfg: &NameConfig, tokens: &mut Vec<String>, current: &mut String) {
    match ch {
        '&' if cfg.expand_ampersand => {
            finalize_token(tokens, current, cfg);
            tokens.push("AND".to_string());
        }
        // Joiners: dropped without ending the token.
        '.' | '\'' | '\u{2019}' => {}
        c if c.is_alphanumeric() => current.push(c),
        // Combining marks stay attached to their base letter.
        c if c.is_mark() => current.push(c),
        _ => finalize_token(tokens, current, cfg),
    }
}

fn finalize_token(tokens: &mut Vec<String>, current: &mut String, cfg: &NameConfig) {
    if current.is_empty() {
        return;
    }
    let token = std::mem::take(current);
    let token = if cfg.fold_abbreviations {
        fold_abbreviation(token)
    } else {
        token
    };
    tokens.push(token);
}

fn fold_abbreviation(token: String) -> String {
    ABBREVIATIONS
        .iter()
        .find(|(long, _)| *long == token)
        .map(|(_, short)| (*short).to_string())
        .unwrap_or(token)
}
