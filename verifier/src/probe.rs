//! HTTP reachability probes for declared artefacts.
//!
//! Probing is fail-open: every entry is checked even after earlier failures,
//! and each failure is recorded in the summary rather than returned. Probes
//! run serially so the summary's log order is stable between runs.

use std::path::Path;
use std::time::Duration;

use assetcheck_common::{Phase, Summary};
use log::{debug, warn};
use url::Url;

use crate::config::ASSET_PREFIX;
use crate::error::{Result, VerifyError};
use crate::manifest::{ImportMap, ImportTarget, Manifest};

/// Per-request timeout used by [`HttpFetcher`].
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// What came back from one HTTP request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchResponse {
    /// The server answered with this status code.
    Status(u16),
    /// No HTTP response was received.
    Transport(String),
}

/// Issues HTTP GET requests.
///
/// The seam lets probe logic be tested without opening sockets.
#[cfg_attr(test, mockall::automock)]
pub trait AssetFetcher {
    /// Requests `url` and reports the status or transport failure.
    fn fetch(&self, url: &str) -> FetchResponse;
}

/// [`AssetFetcher`] backed by a `ureq` agent.
///
/// Status codes are reported rather than raised, and environment proxies are
/// ignored because every request targets loopback.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    /// Creates a fetcher whose requests time out after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .proxy(None)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(PROBE_TIMEOUT)
    }
}

impl AssetFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> FetchResponse {
        match self.agent.get(url).call() {
            Ok(response) => FetchResponse::Status(response.status().as_u16()),
            Err(ureq::Error::StatusCode(status)) => FetchResponse::Status(status),
            Err(err) => FetchResponse::Transport(err.to_string()),
        }
    }
}

/// Outcome category of a probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 2xx response.
    Success,
    /// 404 response.
    NotFound,
    /// 403 response.
    Forbidden,
    /// 5xx response.
    ServerError,
    /// Any other status.
    OtherHttp,
    /// Connection refused, reset, or timed out.
    TransportFailure,
}

impl ProbeOutcome {
    /// Classifies an HTTP status code.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Success,
            404 => Self::NotFound,
            403 => Self::Forbidden,
            500..=599 => Self::ServerError,
            _ => Self::OtherHttp,
        }
    }

    /// Whether the artefact counts as reachable.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Short human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Success => "ok",
            Self::NotFound => "not found",
            Self::Forbidden => "forbidden",
            Self::ServerError => "server error",
            Self::OtherHttp => "unexpected status",
            Self::TransportFailure => "transport failure",
        }
    }
}

/// Immutable result of probing one artefact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeResult {
    name: String,
    url: String,
    path: String,
    outcome: ProbeOutcome,
    status: Option<u16>,
    detail: Option<String>,
    hint: Option<&'static str>,
}

impl ProbeResult {
    fn new(name: &str, url: String, path: &str, response: FetchResponse) -> Self {
        let (outcome, status, detail) = match response {
            FetchResponse::Status(code) => (ProbeOutcome::from_status(code), Some(code), None),
            FetchResponse::Transport(reason) => {
                (ProbeOutcome::TransportFailure, None, Some(reason))
            }
        };
        let hint = (!outcome.is_success()).then(|| hint_for(path));
        Self {
            name: name.to_owned(),
            url,
            path: path.to_owned(),
            outcome,
            status,
            detail,
            hint,
        }
    }

    /// Logical name of the artefact.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// URL that was requested.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Root-relative path that was requested, before escaping.
    ///
    /// Recorded lines use this rather than [`url`](Self::url) so they do not
    /// depend on the port the server happened to bind.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Outcome category.
    #[must_use]
    pub const fn outcome(&self) -> ProbeOutcome {
        self.outcome
    }

    /// HTTP status, when a response was received.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    /// Diagnostic hint attached to failures.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.hint
    }

    /// The error describing this result, or `None` on success.
    #[must_use]
    pub fn to_error(&self) -> Option<VerifyError> {
        if self.outcome.is_success() {
            return None;
        }
        Some(match self.status {
            Some(status) => VerifyError::ProbeHttpFailure {
                name: self.name.clone(),
                path: self.path.clone(),
                status,
                outcome: self.outcome.label(),
            },
            None => VerifyError::ProbeTransportFailure {
                name: self.name.clone(),
                path: self.path.clone(),
                reason: self.detail.clone().unwrap_or_default(),
            },
        })
    }
}

/// Informational hint derived from the artefact's extension.
///
/// Hints never influence pass/fail classification.
#[must_use]
pub fn hint_for(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("js" | "mjs") => {
            "script: check the build copied it and that pins reference the digested name"
        }
        Some("css") => "stylesheet: check the stylesheet was compiled into the output tree",
        Some("map") => "source map: emitted beside its script or stylesheet; check both were copied",
        Some("woff" | "woff2" | "ttf" | "otf" | "eot") => {
            "font: fonts referenced from stylesheets are easy to miss in copy steps"
        }
        Some("png" | "jpg" | "jpeg" | "gif" | "svg" | "webp" | "ico" | "avif") => {
            "image: check the image directory was included in the output tree"
        }
        _ => "check that the build wrote this file into the output tree",
    }
}

/// Pass and fail counts for one probe set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProbeTally {
    /// Reachable artefacts.
    pub passed: usize,
    /// Unreachable artefacts.
    pub failed: usize,
}

/// Shared inputs for every probe set.
pub struct ProbeContext<'a> {
    fetcher: &'a dyn AssetFetcher,
    base: Url,
}

impl<'a> ProbeContext<'a> {
    /// Creates a context probing under `base_url` (e.g. `http://127.0.0.1:4579`).
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::InvalidBaseUrl`] when `base_url` does not parse
    /// or cannot carry a path.
    pub fn new(fetcher: &'a dyn AssetFetcher, base_url: &str) -> Result<Self> {
        let invalid = |reason: String| VerifyError::InvalidBaseUrl {
            url: base_url.to_owned(),
            reason,
        };
        let base = Url::parse(base_url).map_err(|err| invalid(err.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(invalid("URL cannot carry a path".to_owned()));
        }
        Ok(Self { fetcher, base })
    }

    /// Request URL for a root-relative path, escaping each segment.
    fn url_for(&self, root_relative: &str) -> String {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .clear()
                .extend(root_relative.split('/').filter(|segment| !segment.is_empty()));
        }
        url.into()
    }

    /// Probes one root-relative path and records the outcome under `kind`.
    fn probe_one(
        &self,
        kind: &str,
        name: &str,
        root_relative: &str,
        summary: &mut Summary,
    ) -> ProbeResult {
        let url = self.url_for(root_relative);
        debug!(target: "probe", "GET {url} for {kind} {name}");
        let response = self.fetcher.fetch(&url);
        let result = ProbeResult::new(name, url, root_relative, response);
        record(kind, &result, summary);
        result
    }
}

fn record(kind: &str, result: &ProbeResult, summary: &mut Summary) {
    match result.to_error() {
        None => summary.log(
            Phase::Verify,
            format!("OK {kind} {} -> {}", result.name(), result.path()),
        ),
        Some(err) => {
            warn!(target: "probe", "{kind} {err}");
            let line = match result.hint() {
                Some(hint) => format!("{kind} {err}; hint: {hint}"),
                None => format!("{kind} {err}"),
            };
            summary.error(Phase::Verify, line);
            summary.record_missing(result.name());
        }
    }
}

fn tally<'r>(results: impl IntoIterator<Item = &'r ProbeResult>) -> ProbeTally {
    results
        .into_iter()
        .fold(ProbeTally::default(), |mut tally, result| {
            if result.outcome().is_success() {
                tally.passed += 1;
            } else {
                tally.failed += 1;
            }
            tally
        })
}

/// Path under the asset prefix for an asset-relative path.
///
/// # Examples
///
/// ```
/// use assetcheck::probe::asset_path;
///
/// assert_eq!(asset_path("app-abc123.js"), "/assets/app-abc123.js");
/// assert_eq!(asset_path("./controllers/hello.js"), "/assets/controllers/hello.js");
/// ```
#[must_use]
pub fn asset_path(relative: &str) -> String {
    let trimmed = relative.trim_start_matches("./").trim_start_matches('/');
    format!("{ASSET_PREFIX}/{trimmed}")
}

/// Resolves a local import target to a root-relative path.
///
/// Root-relative targets are kept; anything else is taken as relative to the
/// asset prefix.
#[must_use]
pub fn resolve_import_path(target: &str) -> String {
    if target.starts_with('/') {
        target.to_owned()
    } else {
        asset_path(target)
    }
}

/// Probes every manifest entry under the asset prefix.
pub fn probe_manifest(
    manifest: &Manifest,
    context: &ProbeContext<'_>,
    summary: &mut Summary,
) -> ProbeTally {
    summary.log(
        Phase::Verify,
        format!("probing {} manifest entries", manifest.len()),
    );
    let results: Vec<_> = manifest
        .iter()
        .map(|(name, entry)| {
            context.probe_one("manifest", name, &asset_path(entry.path()), summary)
        })
        .collect();
    tally(&results)
}

/// Probes every local import map entry, skipping external targets.
pub fn probe_import_map(
    import_map: &ImportMap,
    context: &ProbeContext<'_>,
    summary: &mut Summary,
) -> ProbeTally {
    let mut results = Vec::with_capacity(import_map.len());
    let mut skipped = 0_usize;
    for (specifier, target) in import_map.iter() {
        match target {
            ImportTarget::External(_) => skipped += 1,
            ImportTarget::Local(path) => {
                let resolved = resolve_import_path(path);
                results.push(context.probe_one("import", specifier, &resolved, summary));
            }
        }
    }
    if skipped > 0 {
        summary.log(
            Phase::Verify,
            format!("skipped {skipped} external import map entries"),
        );
    }
    tally(&results)
}

/// Probes explicitly required asset paths under the asset prefix.
pub fn probe_required(
    paths: &[String],
    context: &ProbeContext<'_>,
    summary: &mut Summary,
) -> ProbeTally {
    let results: Vec<_> = paths
        .iter()
        .map(|path| context.probe_one("required", path, &asset_path(path), summary))
        .collect();
    tally(&results)
}
