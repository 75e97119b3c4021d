//! Canonical serialized form of a [`Summary`](crate::Summary).
//!
//! Report renderers read this document and nothing else. They must treat the
//! `ok` flags and `result` as authoritative rather than re-deriving them from
//! the error lists.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Overall outcome of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// Both phases were marked ok.
    Pass,
    /// At least one phase was not marked ok.
    Fail,
}

/// One phase as it appears in the document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDocument {
    /// Whether the phase was explicitly marked ok.
    pub ok: bool,
    /// Log lines in append order.
    pub log: Vec<String>,
    /// Error lines in append order.
    pub errors: Vec<String>,
}

/// The complete result document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryDocument {
    /// State of the prepare phase.
    pub prepare: PhaseDocument,
    /// State of the verify phase.
    pub verify: PhaseDocument,
    /// Named timings in seconds.
    pub timings: BTreeMap<String, f64>,
    /// Logical names found unreachable.
    pub diff_missing: Vec<String>,
    /// Overall verdict.
    pub result: Verdict,
}
