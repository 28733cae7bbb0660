//! Normalization layer for award/recipient reconciliation.
//!
//! Everything that compares an award record to a recipient record goes
//! through this crate first:
//!
//! - [`normalize_identifier`] folds registry identifiers (UEI, DUNS, ...) into
//!   the exact keys used by the lookup index.
//! - [`normalize_name`] folds organization names into the form scored by the
//!   fuzzy matcher.
//!
//! ## Pure function guarantee
//!
//! No I/O, no clock calls, no locale dependence. Same input and same
//! [`NameConfig`] give the same output on any machine, which is what makes
//! reruns of a reconciliation idempotent.

mod config;
mod error;
mod identifier;
mod name;

pub use crate::config::NameConfig;
pub use crate::error::CanonicalError;
pub use crate::identifier::{normalize_identifier, normalize_identifier_opt};
pub use crate::name::normalize_name;
