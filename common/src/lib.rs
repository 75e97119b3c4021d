//! Result model for asset reachability runs.
//!
//! The [`Summary`] aggregates everything a verification run learns, split
//! into a `prepare` and a `verify` [`Phase`]. External report writers consume
//! it only through the canonical [`SummaryDocument`].

pub mod document;
pub mod error_format;
pub mod summary;

pub use document::{PhaseDocument, SummaryDocument, Verdict};
pub use error_format::{format_error, format_exception};
pub use summary::{Phase, PhaseState, Summary};
