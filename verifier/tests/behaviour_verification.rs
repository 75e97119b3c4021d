//! Behaviour tests for end-to-end asset verification against a real server.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, TcpListener};

use assetcheck::config::{SiteLayout, VerifyConfig};
use assetcheck::orchestrator::run_verification;
use assetcheck_common::{Phase, Summary};
use camino::Utf8PathBuf;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

#[derive(Default)]
struct VerificationWorld {
    _temp_dir: Option<TempDir>,
    root: Option<Utf8PathBuf>,
    manifest: BTreeMap<String, String>,
    imports: BTreeMap<String, String>,
    port_override: Option<String>,
    required: Vec<String>,
    held: Option<TcpListener>,
    summaries: Vec<Summary>,
}

#[fixture]
fn world() -> VerificationWorld {
    VerificationWorld::default()
}

fn root(world: &VerificationWorld) -> &Utf8PathBuf {
    world.root.as_ref().expect("site root set")
}

fn assets_dir(world: &VerificationWorld) -> Utf8PathBuf {
    SiteLayout::new(root(world).clone()).assets_dir()
}

fn write_declarations(world: &VerificationWorld) {
    let layout = SiteLayout::new(root(world).clone());
    let manifest: BTreeMap<_, _> = world
        .manifest
        .iter()
        .map(|(name, digested)| (name, serde_json::json!({ "digestedPath": digested })))
        .collect();
    std::fs::write(
        layout.manifest_path(),
        serde_json::to_string(&manifest).expect("serialize manifest"),
    )
    .expect("write manifest");
    std::fs::write(
        layout.import_map_path(),
        serde_json::json!({ "imports": world.imports }).to_string(),
    )
    .expect("write import map");
}

fn build_config(world: &VerificationWorld) -> VerifyConfig {
    let mut config = VerifyConfig::new(SiteLayout::new(root(world).clone()));
    config.port_override = world.port_override.clone();
    config.required_assets = world.required.clone();
    config.port_candidates = match &world.held {
        Some(listener) => vec![listener.local_addr().expect("held addr").port(), 0],
        None => vec![0],
    };
    config
}

fn run_once(world: &mut VerificationWorld) {
    write_declarations(world);
    let config = build_config(world);
    let mut summary = Summary::new();
    run_verification(&config, &mut summary);
    world.summaries.push(summary);
}

fn last_summary(world: &VerificationWorld) -> &Summary {
    world.summaries.last().expect("verification has run")
}

fn verify_log(world: &VerificationWorld) -> &[String] {
    last_summary(world).phase(Phase::Verify).log()
}

// ---------------------------------------------------------------------------
// Step definitions
// ---------------------------------------------------------------------------

#[given("a site whose manifest maps \"{name}\" to \"{digested}\"")]
fn given_manifest_entry(world: &mut VerificationWorld, name: String, digested: String) {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let root = Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf()).expect("utf-8 temp path");
    world.root = Some(root);
    world._temp_dir = Some(temp_dir);
    std::fs::create_dir_all(assets_dir(world)).expect("create assets dir");
    world.manifest.insert(name, digested);
}

#[given("the manifest also maps \"{name}\" to \"{digested}\"")]
fn given_extra_manifest_entry(world: &mut VerificationWorld, name: String, digested: String) {
    world.manifest.insert(name, digested);
}

#[given("the compiled asset \"{file}\" exists")]
fn given_compiled_asset(world: &mut VerificationWorld, file: String) {
    std::fs::write(assets_dir(world).join(&file), format!("// {file}")).expect("write asset");
}

#[given("the port override \"{raw}\"")]
fn given_port_override(world: &mut VerificationWorld, raw: String) {
    world.port_override = Some(raw);
}

#[given("the first candidate port is held by another listener")]
fn given_held_port(world: &mut VerificationWorld) {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("hold a port");
    world.held = Some(listener);
}

#[given("the import map maps \"{specifier}\" to \"{target}\"")]
fn given_import(world: &mut VerificationWorld, specifier: String, target: String) {
    world.imports.insert(specifier, target);
}

#[given("the required asset \"{path}\"")]
fn given_required_asset(world: &mut VerificationWorld, path: String) {
    world.required.push(path);
}

#[when("verification runs")]
fn when_verification_runs(world: &mut VerificationWorld) {
    run_once(world);
}

#[when("verification runs twice")]
fn when_verification_runs_twice(world: &mut VerificationWorld) {
    run_once(world);
    run_once(world);
}

#[then("the verify phase passes")]
fn then_verify_passes(world: &mut VerificationWorld) {
    let summary = last_summary(world);
    assert!(
        summary.phase(Phase::Verify).ok(),
        "expected success, got errors {:?}",
        summary.errors(Phase::Verify)
    );
    assert!(summary.errors(Phase::Verify).is_empty());
}

#[then("the verify phase fails")]
fn then_verify_fails(world: &mut VerificationWorld) {
    let summary = last_summary(world);
    assert!(!summary.phase(Phase::Verify).ok());
    assert!(summary.failed());
}

#[then("no assets are reported missing")]
fn then_nothing_missing(world: &mut VerificationWorld) {
    assert!(last_summary(world).diff_missing().is_empty());
}

#[then("the missing assets are exactly \"{name}\"")]
fn then_missing_exactly(world: &mut VerificationWorld, name: String) {
    let missing: Vec<_> = last_summary(world).diff_missing().iter().cloned().collect();
    assert_eq!(missing, [name]);
}

#[then("the verify phase has {count} error mentioning \"{needle}\"")]
fn then_error_count(world: &mut VerificationWorld, count: usize, needle: String) {
    let errors = last_summary(world).errors(Phase::Verify);
    assert_eq!(errors.len(), count, "errors: {errors:?}");
    assert!(errors.iter().all(|error| error.contains(&needle)));
}

#[then("the verify log mentions \"{needle}\"")]
fn then_log_mentions(world: &mut VerificationWorld, needle: String) {
    let log = verify_log(world);
    assert!(
        log.iter().any(|line| line.contains(&needle)),
        "no log line contains {needle:?}: {log:?}"
    );
}

#[then("no verify log line mentions \"{needle}\"")]
fn then_log_omits(world: &mut VerificationWorld, needle: String) {
    assert!(!verify_log(world).iter().any(|line| line.contains(&needle)));
    assert!(
        !last_summary(world)
            .errors(Phase::Verify)
            .iter()
            .any(|line| line.contains(&needle))
    );
}

#[then("the held port is reported unavailable")]
fn then_held_port_skipped(world: &mut VerificationWorld) {
    let held = world
        .held
        .as_ref()
        .expect("held listener")
        .local_addr()
        .expect("held addr")
        .port();
    let expected = format!("port {held} unavailable");
    let log = verify_log(world);
    assert!(log.iter().any(|line| line.starts_with(&expected)));
    assert!(log.iter().any(|line| line.starts_with("selected port ")));
}

#[then("both runs report the same outcome")]
fn then_runs_agree(world: &mut VerificationWorld) {
    let [first, second] = world.summaries.as_slice() else {
        panic!("expected two runs, got {}", world.summaries.len());
    };
    assert_eq!(first.phase(Phase::Verify).ok(), second.phase(Phase::Verify).ok());
    assert_eq!(first.diff_missing(), second.diff_missing());
    assert!(!first.errors(Phase::Verify).is_empty());
    assert_eq!(first.errors(Phase::Verify), second.errors(Phase::Verify));
}

// ---------------------------------------------------------------------------
// Scenario bindings
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/verification.feature",
    name = "Every manifest asset is served"
)]
fn scenario_every_asset_served(world: VerificationWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/verification.feature",
    name = "A missing compiled asset fails verification"
)]
fn scenario_missing_asset(world: VerificationWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/verification.feature",
    name = "An invalid port override is ignored"
)]
fn scenario_invalid_override(world: VerificationWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/verification.feature",
    name = "A held candidate port is skipped"
)]
fn scenario_held_port(world: VerificationWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/verification.feature",
    name = "External import map targets are not probed"
)]
fn scenario_external_imports(world: VerificationWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/verification.feature",
    name = "A required asset absent from the manifests is probed"
)]
fn scenario_required_asset(world: VerificationWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/verification.feature",
    name = "Repeated runs against an unchanged tree agree"
)]
fn scenario_repeated_runs(world: VerificationWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/verification.feature",
    name = "Asset names with URL-reserved characters are served"
)]
fn scenario_reserved_characters(world: VerificationWorld) {
    let _ = world;
}
