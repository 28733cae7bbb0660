//! Configuration for organization-name normalization.
//!
//! [`NameConfig`] controls how display names on award records and canonical
//! names on recipient records are folded before fuzzy scoring. Both sides of
//! a comparison must be normalized with the same config, otherwise scores are
//! meaningless.
//!
//! # Versioning
//!
//! Any change to normalization output (even a bug fix) must bump `version`.
//! The engine folds the version into its checkpoint digest so a resumed run
//! never mixes results produced by two different normalizations.
//!
//! # Examples
//!
//! ```rust
//! use canonical::NameConfig;
//!
//! let config = NameConfig::default();
//! assert_eq!(config.version, 1);
//! assert!(config.fold_abbreviations);
//! assert!(config.expand_ampersand);
//! config.validate().expect("default config is valid");
//! ```

use serde::{Deserialize, Serialize};

use crate::error::CanonicalError;

/// Settings for [`normalize_name`](crate::normalize_name).
///
/// # Serialization
///
/// ```json
/// {
///   "version": 1,
///   "normalize_unicode": true,
///   "expand_ampersand": true,
///   "fold_abbreviations": true
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NameConfig {
    /// Normalization behavior version. Must be >= 1.
    #[serde(default = "default_version")]
    pub version: u32,

    /// Apply Unicode NFKC before folding, so fullwidth and compatibility
    /// forms compare equal to their plain counterparts.
    #[serde(default = "true_value")]
    pub normalize_unicode: bool,

    /// Rewrite `&` as the word `AND` ("A&B" → "A AND B").
    #[serde(default = "true_value")]
    pub expand_ampersand: bool,

    /// Fold long corporate suffixes into their usual abbreviation
    /// (`INCORPORATED` → `INC`, `CORPORATION` → `CORP`, ...).
    #[serde(default = "true_value")]
    pub fold_abbreviations: bool,
}

impl NameConfig {
    /// Reject settings that cannot produce a stable normalization.
    pub fn validate(&self) -> Result<(), CanonicalError> {
        if self.version == 0 {
            return Err(CanonicalError::InvalidConfig(
                "name normalization version must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

impl Default for NameConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            normalize_unicode: true,
            expand_ampersand: true,
            fold_abbreviations: true,
        }
    }
}

fn default_version() -> u32 {
    1
}

fn true_value() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_zero_rejected() {
        let cfg = NameConfig {
            version: 0,
            ..Default::default()
        };
        let err = cfg.validate().expect_err("version 0 must be rejected");
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: NameConfig = serde_json::from_str(r#"{"fold_abbreviations": false}"#)
            .expect("partial config parses");
        assert_eq!(cfg.version, 1);
        assert!(cfg.normalize_unicode);
        assert!(cfg.expand_ampersand);
        assert!(!cfg.fold_abbreviations);
    }
}
