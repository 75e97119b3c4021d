//! CLI argument definitions for assetcheck.
//!
//! Environment-sourced settings live in [`crate::config::Settings`]; the
//! flags here only override them.

use camino::Utf8PathBuf;
use clap::Parser;

/// Verify that compiled web assets are reachable over HTTP.
#[derive(Parser, Debug, Default)]
#[command(name = "assetcheck")]
#[command(version, about)]
#[command(long_about = concat!(
    "Verify that compiled web assets are reachable over HTTP.\n\n",
    "assetcheck serves <ROOT>/public from a short-lived loopback server and ",
    "requests every entry of <ROOT>/public/assets/.manifest.json and every local ",
    "entry of <ROOT>/public/assets/importmap.json. External import map targets ",
    "are skipped.\n\n",
    "A JSON summary is written for report renderers. The exit status is 1 when ",
    "any artefact is unreachable.",
))]
#[command(after_help = concat!(
    "ENVIRONMENT:\n",
    "  ASSETCHECK_PORT     Preferred server port (1-65535)\n",
    "  ASSETCHECK_ROOT     Site root when --root is not given\n",
    "  GITHUB_WORKSPACE    Directory a relative root is resolved against\n",
    "  CI                  Extends the server readiness timeout\n\n",
    "EXAMPLES:\n",
    "  Verify the default site root:\n",
    "    $ assetcheck\n\n",
    "  Verify another root and require an entry script:\n",
    "    $ assetcheck --root spec/dummy --require panda/core/application.js\n",
))]
pub struct Cli {
    /// Site root containing `public/assets` [default: spec/dummy].
    #[arg(short, long, value_name = "DIR")]
    pub root: Option<Utf8PathBuf>,

    /// Asset path that must be served, relative to /assets (repeatable).
    #[arg(long = "require", value_name = "PATH")]
    pub required: Vec<String>,

    /// Where to write the JSON summary [default: <ROOT>/tmp/assetcheck_summary.json].
    #[arg(long, value_name = "FILE")]
    pub summary_out: Option<Utf8PathBuf>,

    /// Only print the final result line.
    #[arg(short, long)]
    pub quiet: bool,
}
