//! Error types for the verification engine.
//!
//! Every variant is caught at the orchestrator boundary and turned into a
//! verify-phase error line; none of them terminates a run. Per-item probe
//! failures are built as values of this type purely so that their messages
//! share one format.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors that can occur while verifying an output tree.
#[derive(Debug, Error)]
pub enum VerifyError {
    /// A required input path does not exist.
    #[error("missing {what} at {path}")]
    PrerequisiteMissing {
        /// Human-readable name of the input.
        what: &'static str,
        /// Where it was expected.
        path: Utf8PathBuf,
    },

    /// A manifest or import map could not be read or parsed.
    #[error("malformed {what} at {path}: {reason}")]
    MalformedManifest {
        /// Which document was malformed.
        what: &'static str,
        /// Path of the document.
        path: Utf8PathBuf,
        /// Parser or I/O message.
        reason: String,
    },

    /// No candidate port could be bound.
    #[error("no bindable port among candidates {tried:?}")]
    PortExhausted {
        /// Ports attempted, in order (`0` means any free port).
        tried: Vec<u16>,
    },

    /// The verification server could not bind its selected port.
    #[error("verification server could not bind 127.0.0.1:{port}")]
    ServerBind {
        /// The selected port.
        port: u16,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The verification server did not answer within its readiness budget.
    #[error("verification server at {url} not ready after {attempts} attempts")]
    ServerStartTimeout {
        /// URL that was polled.
        url: String,
        /// Number of polls made.
        attempts: u32,
    },

    /// A probe could not complete an HTTP exchange.
    #[error("{name}: request for {path} failed: {reason}")]
    ProbeTransportFailure {
        /// Logical asset name.
        name: String,
        /// Root-relative path that was requested.
        path: String,
        /// Transport error message.
        reason: String,
    },

    /// A probe received a non-success HTTP status.
    #[error("{name}: {outcome} (HTTP {status}) at {path}")]
    ProbeHttpFailure {
        /// Logical asset name.
        name: String,
        /// Root-relative path that was requested.
        path: String,
        /// Received status code.
        status: u16,
        /// Outcome category label.
        outcome: &'static str,
    },

    /// The verification server failed while shutting down.
    #[error("verification server did not stop cleanly")]
    ServerShutdown {
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The server's base URL could not be used to build probe URLs.
    #[error("invalid probe base URL {url}: {reason}")]
    InvalidBaseUrl {
        /// The rejected base URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An I/O operation failed.
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// Result type alias using [`VerifyError`].
pub type Result<T> = std::result::Result<T, VerifyError>;
