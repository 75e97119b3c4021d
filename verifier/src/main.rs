//! assetcheck CLI entrypoint.
//!
//! Verifies an externally built output tree, writes the JSON summary, and
//! prints a short result. The exit status is 1 when either phase failed or
//! the summary could not be written.

use assetcheck::cli::Cli;
use assetcheck::config::Settings;
use assetcheck::orchestrator::{record_external_prepare, run_verification};
use assetcheck::report::{ReportError, result_lines, write_summary};
use assetcheck_common::Summary;
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use std::io::Write;

fn main() {
    let cli = Cli::parse();
    let settings = Settings::from_env();
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &settings, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &Cli, settings: &Settings, stderr: &mut dyn Write) -> Result<Summary, ReportError> {
    let root = settings.site_root(cli.root.as_deref());
    let config = settings.verify_config(root, cli.required.clone());

    let mut summary = Summary::new();
    record_external_prepare(&config.layout, &mut summary);
    run_verification(&config, &mut summary);

    let summary_path = summary_path_for(cli, &config.layout.summary_path());
    write_summary(&summary, &summary_path)?;
    if !cli.quiet {
        write_stderr_line(stderr, format!("Summary written to {summary_path}"));
    }

    for line in result_lines(&summary, cli.quiet) {
        write_stderr_line(stderr, line);
    }
    Ok(summary)
}

fn summary_path_for(cli: &Cli, default: &Utf8Path) -> Utf8PathBuf {
    cli.summary_out
        .clone()
        .unwrap_or_else(|| default.to_path_buf())
}

fn exit_code_for_run_result(result: Result<Summary, ReportError>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(summary) if summary.failed() => 1,
        Ok(_) => 0,
        Err(err) => {
            write_stderr_line(stderr, err);
            1
        }
    }
}

fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort output; ignore write failures.
    }
}
