//! Summary document output.
//!
//! Writes the canonical JSON document for external renderers and builds the
//! short plain-text result printed by the CLI.

use assetcheck_common::{Phase, Summary};
use camino::{Utf8Path, Utf8PathBuf};

/// Errors that prevent the summary document from being written.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Creating the parent directory failed.
    #[error("failed to create summary directory {path}: {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Serializing the summary failed.
    #[error("failed to serialize summary: {source}")]
    Serialize {
        /// Underlying serialization error.
        #[source]
        source: serde_json::Error,
    },

    /// Writing the summary file failed.
    #[error("failed to write summary {path}: {source}")]
    Write {
        /// File that could not be written.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Writes the summary's canonical JSON document to `path`.
///
/// # Errors
///
/// Returns a [`ReportError`] when the directory cannot be created or the
/// file cannot be written.
pub fn write_summary(summary: &Summary, path: &Utf8Path) -> Result<(), ReportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ReportError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let json = summary
        .to_json_pretty()
        .map_err(|source| ReportError::Serialize { source })?;
    std::fs::write(path, json).map_err(|source| ReportError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Plain-text result lines for the terminal.
///
/// Failed phases list their errors; `quiet` keeps only the final line.
#[must_use]
pub fn result_lines(summary: &Summary, quiet: bool) -> Vec<String> {
    let mut lines = Vec::new();
    if !quiet {
        for phase in [Phase::Prepare, Phase::Verify] {
            let state = summary.phase(phase);
            let status = if state.ok() { "OK" } else { "FAILED" };
            lines.push(format!("{phase}: {status}"));
            if !state.ok() {
                lines.extend(state.errors().iter().map(|error| format!("  {error}")));
            }
        }
    }
    let verdict = if summary.failed() { "FAIL" } else { "PASS" };
    lines.push(format!("FINAL RESULT: {verdict}"));
    lines
}
