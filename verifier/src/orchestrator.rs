//! Sequencing of one verification run.
//!
//! A run moves through [`RunState`] in order and always ends finalized:
//! every failure is recorded in the [`Summary`] and the run returns early to
//! finalization instead of propagating. The server handle stops itself on
//! drop, so every early return after startup also releases it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use assetcheck_common::{Phase, Summary};
use log::debug;

use crate::config::{SiteLayout, VerifyConfig};
use crate::error::VerifyError;
use crate::manifest::{ImportMap, Manifest};
use crate::port::PortAllocator;
use crate::probe::{
    AssetFetcher, HttpFetcher, ProbeContext, ProbeTally, probe_import_map, probe_manifest,
    probe_required,
};
use crate::server::EphemeralServer;

/// Timing name for the whole verify phase.
pub const VERIFY_TIMING: &str = "verify_total";

/// Timing name for server startup and readiness.
pub const SERVER_READY_TIMING: &str = "server_ready";

/// Stages of a verification run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    /// Nothing checked yet.
    Idle,
    /// The output directory exists.
    PrerequisitesChecked,
    /// Both declarations were read, successfully or not.
    ManifestsParsed,
    /// The verification server is accepting connections.
    ServerRunning,
    /// Every probe set has run.
    ProbesComplete,
    /// The verify phase has been marked ok or failed.
    Finalized,
}

/// What a run reached before finalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    /// The last state reached before finalization.
    pub furthest: RunState,
    /// Probe counts across every probe set.
    pub tally: ProbeTally,
}

/// Records that the output tree was produced outside this tool.
pub fn record_external_prepare(layout: &SiteLayout, summary: &mut Summary) {
    summary.log(
        Phase::Prepare,
        format!("using output tree built externally at {}", layout.public_dir()),
    );
    summary.mark_ok(Phase::Prepare);
}

/// Runs verification for `config`, recording everything into `summary`.
///
/// Never panics and never returns an error: faults, including unexpected
/// panics, become verify-phase errors, and the verify phase is finalized
/// exactly once.
pub fn run_verification(config: &VerifyConfig, summary: &mut Summary) -> RunOutcome {
    run_verification_with(config, HttpFetcher::default(), summary)
}

/// Runs verification with `fetcher` issuing the readiness polls and probes.
///
/// The fetcher is dropped before the server is stopped, so none of its
/// pooled connections outlive the server.
pub fn run_verification_with<F: AssetFetcher>(
    config: &VerifyConfig,
    fetcher: F,
    summary: &mut Summary,
) -> RunOutcome {
    let started = Instant::now();
    let mut run = VerificationRun::new(config);

    guarded(summary, |summary| run.execute(fetcher, summary));

    summary.record_timing(VERIFY_TIMING, started.elapsed());
    let furthest = run.furthest;
    finalize(summary);
    run.advance(RunState::Finalized);

    RunOutcome {
        furthest,
        tally: run.tally,
    }
}

/// Runs `step`, converting a panic into a verify-phase error.
fn guarded<F>(summary: &mut Summary, step: F)
where
    F: FnOnce(&mut Summary),
{
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| step(&mut *summary)));
    if let Err(payload) = outcome {
        summary.error(
            Phase::Verify,
            format!("unexpected fault: {}", panic_message(&*payload)),
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

fn finalize(summary: &mut Summary) {
    let error_count = summary.errors(Phase::Verify).len();
    if error_count == 0 {
        summary.log(Phase::Verify, "verification passed");
        summary.mark_ok(Phase::Verify);
    } else {
        summary.log(
            Phase::Verify,
            format!("verification failed with {error_count} error(s)"),
        );
        summary.mark_failed(Phase::Verify);
    }
}

#[derive(Default)]
struct Declarations {
    manifest: Option<Manifest>,
    import_map: Option<ImportMap>,
}

impl Declarations {
    fn is_empty(&self) -> bool {
        self.manifest.is_none() && self.import_map.is_none()
    }
}

struct VerificationRun<'a> {
    config: &'a VerifyConfig,
    furthest: RunState,
    tally: ProbeTally,
}

impl<'a> VerificationRun<'a> {
    const fn new(config: &'a VerifyConfig) -> Self {
        Self {
            config,
            furthest: RunState::Idle,
            tally: ProbeTally {
                passed: 0,
                failed: 0,
            },
        }
    }

    fn advance(&mut self, state: RunState) {
        debug!(target: "orchestrator", "{:?} -> {state:?}", self.furthest);
        self.furthest = state;
    }

    fn execute<F: AssetFetcher>(&mut self, fetcher: F, summary: &mut Summary) {
        let config = self.config;
        let layout = &config.layout;
        summary.log(Phase::Verify, format!("verifying {}", layout.assets_dir()));

        if !self.check_prerequisites(summary) {
            return;
        }
        self.advance(RunState::PrerequisitesChecked);

        let declarations = load_declarations(layout, summary);
        self.advance(RunState::ManifestsParsed);

        if declarations.is_empty() && config.required_assets.is_empty() {
            summary.log(Phase::Verify, "nothing to probe; server not started");
            return;
        }

        let server_started = Instant::now();
        let server = match self.start_server(summary) {
            Ok(server) => server,
            Err(err) => {
                summary.exception(Phase::Verify, &err);
                return;
            }
        };

        self.probe_running_server(fetcher, &server, &declarations, server_started, summary);

        match server.stop() {
            Ok(()) => summary.log(Phase::Verify, "server stopped"),
            Err(err) => summary.exception(Phase::Verify, &err),
        }
    }

    /// Waits for readiness, then runs every probe set. Consumes `fetcher`.
    fn probe_running_server<F: AssetFetcher>(
        &mut self,
        fetcher: F,
        server: &EphemeralServer,
        declarations: &Declarations,
        server_started: Instant,
        summary: &mut Summary,
    ) {
        let context = server
            .wait_until_ready(&fetcher, self.config.readiness)
            .and_then(|attempts| {
                summary.record_timing(SERVER_READY_TIMING, server_started.elapsed());
                summary.log(
                    Phase::Verify,
                    format!(
                        "server listening on {} after {attempts} attempt(s)",
                        server.base_url()
                    ),
                );
                ProbeContext::new(&fetcher, &server.base_url())
            });

        match context {
            Ok(context) => {
                self.advance(RunState::ServerRunning);
                self.run_probes(declarations, &context, summary);
                self.advance(RunState::ProbesComplete);
            }
            Err(err) => summary.exception(Phase::Verify, &err),
        }
        drop(fetcher);
    }

    /// Returns `false` when the output directory is missing.
    fn check_prerequisites(&self, summary: &mut Summary) -> bool {
        let layout = &self.config.layout;
        let assets_dir = layout.assets_dir();
        if !assets_dir.is_dir() {
            summary.error(
                Phase::Verify,
                VerifyError::PrerequisiteMissing {
                    what: "output directory",
                    path: assets_dir,
                },
            );
            return false;
        }
        summary.log(Phase::Verify, "output directory present");
        true
    }

    fn start_server(&self, summary: &mut Summary) -> Result<EphemeralServer, VerifyError> {
        let allocator = PortAllocator::from_override(
            self.config.port_override.as_deref(),
            &self.config.port_candidates,
            summary,
        );
        let port = allocator.allocate(summary)?;
        EphemeralServer::start(&self.config.layout.public_dir(), port)
    }

    fn run_probes(
        &mut self,
        declarations: &Declarations,
        context: &ProbeContext<'_>,
        summary: &mut Summary,
    ) {
        if let Some(manifest) = &declarations.manifest {
            let tally = probe_manifest(manifest, context, summary);
            self.add_tally("manifest", tally, summary);
        }
        if let Some(import_map) = &declarations.import_map {
            let tally = probe_import_map(import_map, context, summary);
            self.add_tally("import map", tally, summary);
        }
        if !self.config.required_assets.is_empty() {
            let tally = probe_required(&self.config.required_assets, context, summary);
            self.add_tally("required assets", tally, summary);
        }
    }

    fn add_tally(&mut self, label: &str, tally: ProbeTally, summary: &mut Summary) {
        summary.log(
            Phase::Verify,
            format!(
                "{label}: {} reachable, {} unreachable",
                tally.passed, tally.failed
            ),
        );
        self.tally.passed += tally.passed;
        self.tally.failed += tally.failed;
    }
}

/// Reads both declarations; a missing or malformed one is recorded and
/// skipped without affecting the other.
fn load_declarations(layout: &SiteLayout, summary: &mut Summary) -> Declarations {
    let mut declarations = Declarations::default();

    let manifest_path = layout.manifest_path();
    if manifest_path.is_file() {
        match Manifest::load(&manifest_path) {
            Ok(manifest) => {
                summary.log(
                    Phase::Verify,
                    format!("parsed manifest with {} entries", manifest.len()),
                );
                declarations.manifest = Some(manifest);
            }
            Err(err) => summary.error(Phase::Verify, err),
        }
    } else {
        summary.error(
            Phase::Verify,
            VerifyError::PrerequisiteMissing {
                what: "manifest",
                path: manifest_path,
            },
        );
    }

    let import_map_path = layout.import_map_path();
    if import_map_path.is_file() {
        match ImportMap::load(&import_map_path) {
            Ok(import_map) => {
                summary.log(
                    Phase::Verify,
                    format!("parsed import map with {} entries", import_map.len()),
                );
                declarations.import_map = Some(import_map);
            }
            Err(err) => summary.error(Phase::Verify, err),
        }
    } else {
        summary.error(
            Phase::Verify,
            VerifyError::PrerequisiteMissing {
                what: "import map",
                path: import_map_path,
            },
        );
    }

    declarations
}
