//! Single-line error formatting shared by every phase.

use std::error::Error;
use std::fmt::Display;

use crate::summary::Phase;

/// Formats `message` as `"[PHASE] message"`.
///
/// # Examples
///
/// ```
/// use assetcheck_common::{Phase, format_error};
///
/// assert_eq!(
///     format_error(Phase::Prepare, "missing manifest"),
///     "[PREPARE] missing manifest"
/// );
/// ```
#[must_use]
pub fn format_error(phase: Phase, message: impl Display) -> String {
    format!("[{}] {message}", phase.as_str().to_uppercase())
}

/// Formats an error and its source chain on one line.
#[must_use]
pub fn format_exception(phase: Phase, error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    format_error(phase, message)
}
