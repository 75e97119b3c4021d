//! Phase-scoped aggregation of logs, errors, timings, and missing artefacts.
//!
//! A [`Summary`] is created once per run. Logs and errors are append-only and
//! a phase only becomes ok through an explicit [`Summary::mark_ok`] call, so
//! an empty error list observed halfway through a run never reads as
//! success.

use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt;
use std::time::Duration;

use log::debug;

use crate::document::{PhaseDocument, SummaryDocument, Verdict};
use crate::error_format::{format_error, format_exception};

/// The two phases of an asset pipeline run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Producing the output tree.
    Prepare,
    /// Checking that the output tree is servable.
    Verify,
}

impl Phase {
    /// Returns the lowercase phase label used in documents.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Verify => "verify",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Mutable state held for one phase.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PhaseState {
    ok: bool,
    log: Vec<String>,
    errors: Vec<String>,
}

impl PhaseState {
    /// Whether the phase was explicitly marked ok.
    #[must_use]
    pub const fn ok(&self) -> bool {
        self.ok
    }

    /// Log lines in the order they were appended.
    #[must_use]
    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Error lines in the order they were appended.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    fn to_document(&self) -> PhaseDocument {
        PhaseDocument {
            ok: self.ok,
            log: self.log.clone(),
            errors: self.errors.clone(),
        }
    }
}

/// Aggregated result of one verification run.
///
/// # Examples
///
/// ```
/// use assetcheck_common::{Phase, Summary};
///
/// let mut summary = Summary::new();
/// summary.log(Phase::Verify, "probing 1 manifest entry");
/// assert!(summary.failed(), "nothing has been marked ok yet");
///
/// summary.mark_ok(Phase::Prepare);
/// summary.mark_ok(Phase::Verify);
/// assert!(!summary.failed());
/// ```
#[derive(Clone, Debug, Default)]
pub struct Summary {
    prepare: PhaseState,
    verify: PhaseState,
    timings: BTreeMap<String, Duration>,
    diff_missing: BTreeSet<String>,
}

impl Summary {
    /// Creates an empty summary with both phases not ok.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the state of `phase`.
    #[must_use]
    pub const fn phase(&self, phase: Phase) -> &PhaseState {
        match phase {
            Phase::Prepare => &self.prepare,
            Phase::Verify => &self.verify,
        }
    }

    const fn phase_mut(&mut self, phase: Phase) -> &mut PhaseState {
        match phase {
            Phase::Prepare => &mut self.prepare,
            Phase::Verify => &mut self.verify,
        }
    }

    /// Appends a log line to `phase`.
    pub fn log(&mut self, phase: Phase, line: impl Into<String>) {
        self.phase_mut(phase).log.push(line.into());
    }

    /// Appends an error to `phase`, prefixed with the phase tag.
    pub fn error(&mut self, phase: Phase, message: impl fmt::Display) {
        let line = format_error(phase, message);
        debug!(target: "summary", "{line}");
        self.phase_mut(phase).errors.push(line);
    }

    /// Appends an error and its source chain to `phase` as one line.
    pub fn exception(&mut self, phase: Phase, error: &dyn Error) {
        let line = format_exception(phase, error);
        debug!(target: "summary", "{line}");
        self.phase_mut(phase).errors.push(line);
    }

    /// Marks `phase` as having passed.
    pub fn mark_ok(&mut self, phase: Phase) {
        self.phase_mut(phase).ok = true;
    }

    /// Marks `phase` as having failed.
    pub fn mark_failed(&mut self, phase: Phase) {
        self.phase_mut(phase).ok = false;
    }

    /// Records a named timing, replacing any earlier value under that name.
    pub fn record_timing(&mut self, name: impl Into<String>, elapsed: Duration) {
        self.timings.insert(name.into(), elapsed);
    }

    /// Records a logical asset name as unreachable.
    pub fn record_missing(&mut self, name: impl Into<String>) {
        self.diff_missing.insert(name.into());
    }

    /// Returns `true` unless both phases were marked ok.
    #[must_use]
    pub const fn failed(&self) -> bool {
        !self.prepare.ok || !self.verify.ok
    }

    /// Errors recorded against `phase`.
    #[must_use]
    pub fn errors(&self, phase: Phase) -> &[String] {
        self.phase(phase).errors()
    }

    /// Logical names recorded as unreachable, in sorted order.
    #[must_use]
    pub const fn diff_missing(&self) -> &BTreeSet<String> {
        &self.diff_missing
    }

    /// Returns the recorded timing for `name`, if any.
    #[must_use]
    pub fn timing(&self, name: &str) -> Option<Duration> {
        self.timings.get(name).copied()
    }

    /// Snapshots the summary into its canonical document form.
    ///
    /// Safe to call at any point in a run, including after a partial failure.
    #[must_use]
    pub fn to_document(&self) -> SummaryDocument {
        SummaryDocument {
            prepare: self.prepare.to_document(),
            verify: self.verify.to_document(),
            timings: self
                .timings
                .iter()
                .map(|(name, elapsed)| (name.clone(), elapsed.as_secs_f64()))
                .collect(),
            diff_missing: self.diff_missing.iter().cloned().collect(),
            result: if self.failed() {
                Verdict::Fail
            } else {
                Verdict::Pass
            },
        }
    }

    /// Renders the canonical document as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns the serializer error; the document contains only strings,
    /// booleans, and finite numbers, so this does not fail in practice.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.to_document())
    }
}
