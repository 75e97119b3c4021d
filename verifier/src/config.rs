//! Run configuration.
//!
//! All environment access happens in [`Settings::from_env`]. Everything below
//! the orchestrator receives explicit values, so probes and the port
//! allocator never consult the process environment themselves.

use camino::{Utf8Path, Utf8PathBuf};
use std::time::Duration;

use crate::port::DEFAULT_CANDIDATES;

/// Environment variable holding an explicit port override.
pub const PORT_ENV: &str = "ASSETCHECK_PORT";

/// Environment variable signalling a continuous-integration run.
pub const CI_ENV: &str = "CI";

/// Environment variable naming the site root when no CLI flag is given.
pub const ROOT_ENV: &str = "ASSETCHECK_ROOT";

/// Environment variable naming the checkout a relative root is resolved in.
pub const WORKSPACE_ENV: &str = "GITHUB_WORKSPACE";

/// Site root used when neither the CLI nor the environment names one.
pub const DEFAULT_ROOT: &str = "spec/dummy";

/// URL prefix under which the output tree's assets are served.
pub const ASSET_PREFIX: &str = "/assets";

const MANIFEST_FILENAME: &str = ".manifest.json";
const IMPORT_MAP_FILENAME: &str = "importmap.json";

/// How long to wait for the verification server to accept connections.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadinessBudget {
    /// Maximum number of polls.
    pub attempts: u32,
    /// Delay between polls.
    pub interval: Duration,
}

impl ReadinessBudget {
    /// Budget for interactive runs, roughly five seconds.
    pub const INTERACTIVE: Self = Self {
        attempts: 50,
        interval: Duration::from_millis(100),
    };

    /// Budget for CI runs, roughly fifteen seconds.
    pub const CI: Self = Self {
        attempts: 150,
        interval: Duration::from_millis(100),
    };

    /// Selects the budget for the execution context.
    #[must_use]
    pub const fn for_context(ci: bool) -> Self {
        if ci { Self::CI } else { Self::INTERACTIVE }
    }

    /// Upper bound on the time spent polling.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.interval.saturating_mul(self.attempts)
    }
}

/// Paths inside a site root.
///
/// # Examples
///
/// ```
/// use assetcheck::config::SiteLayout;
///
/// let layout = SiteLayout::new("spec/dummy");
/// assert_eq!(layout.assets_dir(), "spec/dummy/public/assets");
/// assert_eq!(layout.manifest_path(), "spec/dummy/public/assets/.manifest.json");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SiteLayout {
    root: Utf8PathBuf,
}

impl SiteLayout {
    /// Creates a layout rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The site root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Document root served by the verification server.
    #[must_use]
    pub fn public_dir(&self) -> Utf8PathBuf {
        self.root.join("public")
    }

    /// Output directory holding compiled assets.
    #[must_use]
    pub fn assets_dir(&self) -> Utf8PathBuf {
        self.public_dir().join("assets")
    }

    /// Location of the build manifest.
    #[must_use]
    pub fn manifest_path(&self) -> Utf8PathBuf {
        self.assets_dir().join(MANIFEST_FILENAME)
    }

    /// Location of the import map.
    #[must_use]
    pub fn import_map_path(&self) -> Utf8PathBuf {
        self.assets_dir().join(IMPORT_MAP_FILENAME)
    }

    /// Default location for the summary document.
    #[must_use]
    pub fn summary_path(&self) -> Utf8PathBuf {
        self.root.join("tmp").join("assetcheck_summary.json")
    }
}

/// Everything one verification run needs.
#[derive(Clone, Debug)]
pub struct VerifyConfig {
    /// Site layout to verify.
    pub layout: SiteLayout,
    /// Raw port override, validated by the allocator.
    pub port_override: Option<String>,
    /// Candidate ports tried after the override.
    pub port_candidates: Vec<u16>,
    /// Server readiness budget.
    pub readiness: ReadinessBudget,
    /// Asset paths that must be served regardless of the manifests.
    pub required_assets: Vec<String>,
}

impl VerifyConfig {
    /// Creates a configuration with default ports and the interactive budget.
    #[must_use]
    pub fn new(layout: SiteLayout) -> Self {
        Self {
            layout,
            port_override: None,
            port_candidates: DEFAULT_CANDIDATES.to_vec(),
            readiness: ReadinessBudget::INTERACTIVE,
            required_assets: Vec::new(),
        }
    }
}

/// Values sourced from the process environment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Settings {
    /// Site root from [`ROOT_ENV`].
    pub root: Option<Utf8PathBuf>,
    /// Checkout directory from [`WORKSPACE_ENV`].
    pub workspace: Option<Utf8PathBuf>,
    /// Raw port override from [`PORT_ENV`].
    pub port_override: Option<String>,
    /// Whether [`CI_ENV`] marks this as a CI run.
    pub ci: bool,
}

impl Settings {
    /// Reads settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, treating blank values as unset.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        Self {
            root: read(ROOT_ENV).map(Utf8PathBuf::from),
            workspace: read(WORKSPACE_ENV).map(Utf8PathBuf::from),
            port_override: read(PORT_ENV),
            ci: read(CI_ENV).is_some_and(|value| is_truthy(&value)),
        }
    }

    /// Resolves the site root from the CLI, the environment, or the default.
    ///
    /// A relative root is joined onto the workspace directory when one is set.
    #[must_use]
    pub fn site_root(&self, cli_root: Option<&Utf8Path>) -> Utf8PathBuf {
        let root = cli_root
            .map(Utf8Path::to_path_buf)
            .or_else(|| self.root.clone())
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_ROOT));

        match &self.workspace {
            Some(workspace) if root.is_relative() => workspace.join(root),
            _ => root,
        }
    }

    /// Builds the run configuration for `root`.
    #[must_use]
    pub fn verify_config(&self, root: Utf8PathBuf, required_assets: Vec<String>) -> VerifyConfig {
        VerifyConfig {
            port_override: self.port_override.clone(),
            readiness: ReadinessBudget::for_context(self.ci),
            required_assets,
            ..VerifyConfig::new(SiteLayout::new(root))
        }
    }
}

fn is_truthy(value: &str) -> bool {
    !matches!(value.to_ascii_lowercase().as_str(), "0" | "false" | "no")
}
