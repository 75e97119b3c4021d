//! Ingestion of the build manifest and the import map.
//!
//! Both documents are normalized once here, so probes only ever see tagged
//! values and never branch on raw JSON shape.

use std::collections::BTreeMap;

use camino::Utf8Path;
use serde::Deserialize;

use crate::error::{Result, VerifyError};

/// Physical artefact reference for one manifest entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManifestEntry {
    /// Entry given as a record carrying a digested path.
    Digested(String),
    /// Entry given as a bare path string.
    Raw(String),
}

impl ManifestEntry {
    /// The physical path to probe.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Digested(path) | Self::Raw(path) => path,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawManifestEntry {
    Path(String),
    Record {
        #[serde(rename = "digestedPath", alias = "digested_path", alias = "digest_path")]
        digested_path: String,
    },
}

impl From<RawManifestEntry> for ManifestEntry {
    fn from(raw: RawManifestEntry) -> Self {
        match raw {
            RawManifestEntry::Path(path) => Self::Raw(path),
            RawManifestEntry::Record { digested_path } => Self::Digested(digested_path),
        }
    }
}

/// Normalized build manifest keyed by logical asset name.
///
/// # Examples
///
/// ```
/// use assetcheck::manifest::{Manifest, ManifestEntry};
///
/// let manifest = Manifest::parse(r#"{"app.js": {"digestedPath": "app-abc123.js"}}"#)?;
/// assert_eq!(
///     manifest.get("app.js"),
///     Some(&ManifestEntry::Digested("app-abc123.js".to_owned()))
/// );
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    /// Parses and normalizes a manifest document.
    ///
    /// # Errors
    ///
    /// Fails when the document is not an object, or when any entry is neither
    /// a string nor a record carrying a digested path.
    pub fn parse(json: &str) -> serde_json::Result<Self> {
        let raw: BTreeMap<String, RawManifestEntry> = serde_json::from_str(json)?;
        Ok(Self {
            entries: raw
                .into_iter()
                .map(|(name, entry)| (name, entry.into()))
                .collect(),
        })
    }

    /// Reads and parses the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::MalformedManifest`] when reading or parsing fails.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let content = read_document("manifest", path)?;
        Self::parse(&content).map_err(|err| malformed("manifest", path, &err))
    }

    /// Looks up the entry for a logical name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ManifestEntry> {
        self.entries.get(name)
    }

    /// Entries in logical-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ManifestEntry)> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.as_str(), entry))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the manifest has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Where an import map specifier points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImportTarget {
    /// An absolute URL on another origin; never probed.
    External(String),
    /// A path served by the verification server.
    Local(String),
}

impl ImportTarget {
    /// Classifies a raw target string.
    ///
    /// # Examples
    ///
    /// ```
    /// use assetcheck::manifest::ImportTarget;
    ///
    /// assert!(ImportTarget::classify("https://ga.jspm.io/npm:lodash.js").is_external());
    /// assert!(!ImportTarget::classify("/assets/app-abc123.js").is_external());
    /// ```
    #[must_use]
    pub fn classify(target: &str) -> Self {
        let lowered = target.trim_start().to_ascii_lowercase();
        let external = ["http://", "https://", "//"]
            .iter()
            .any(|prefix| lowered.starts_with(prefix));
        if external {
            Self::External(target.to_owned())
        } else {
            Self::Local(target.to_owned())
        }
    }

    /// Whether the target lives on another origin.
    #[must_use]
    pub const fn is_external(&self) -> bool {
        matches!(self, Self::External(_))
    }
}

#[derive(Deserialize)]
struct RawImportMap {
    #[serde(default)]
    imports: BTreeMap<String, String>,
}

/// Normalized import map keyed by module specifier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportMap {
    imports: BTreeMap<String, ImportTarget>,
}

impl ImportMap {
    /// Parses an import map document.
    ///
    /// A document without an `imports` object yields an empty map.
    ///
    /// # Errors
    ///
    /// Fails when the document is not an object or `imports` does not map
    /// strings to strings.
    pub fn parse(json: &str) -> serde_json::Result<Self> {
        let raw: RawImportMap = serde_json::from_str(json)?;
        Ok(Self {
            imports: raw
                .imports
                .into_iter()
                .map(|(specifier, target)| {
                    let classified = ImportTarget::classify(&target);
                    (specifier, classified)
                })
                .collect(),
        })
    }

    /// Reads and parses the import map at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::MalformedManifest`] when reading or parsing fails.
    pub fn load(path: &Utf8Path) -> Result<Self> {
        let content = read_document("import map", path)?;
        Self::parse(&content).map_err(|err| malformed("import map", path, &err))
    }

    /// Entries in specifier order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ImportTarget)> {
        self.imports
            .iter()
            .map(|(specifier, target)| (specifier.as_str(), target))
    }

    /// Number of entries, external ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.imports.len()
    }

    /// Whether the map has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.imports.is_empty()
    }
}

fn read_document(what: &'static str, path: &Utf8Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|err| malformed(what, path, &err))
}

fn malformed(what: &'static str, path: &Utf8Path, err: &dyn std::error::Error) -> VerifyError {
    VerifyError::MalformedManifest {
        what,
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use rstest::rstest;

    #[test]
    fn record_and_string_entries_are_normalized() {
        let manifest = Manifest::parse(
            r#"{
                "app.js": {"digestedPath": "app-abc123.js", "integrity": "sha384-x"},
                "admin.css": "admin-def456.css",
                "legacy.js": {"digested_path": "legacy-0f0f.js"}
            }"#,
        )
        .expect("parse manifest");

        assert_eq!(manifest.len(), 3);
        assert_eq!(
            manifest.get("app.js"),
            Some(&ManifestEntry::Digested("app-abc123.js".to_owned()))
        );
        assert_eq!(
            manifest.get("admin.css"),
            Some(&ManifestEntry::Raw("admin-def456.css".to_owned()))
        );
        assert_eq!(
            manifest.get("legacy.js").map(ManifestEntry::path),
            Some("legacy-0f0f.js")
        );
    }

    #[test]
    fn entries_iterate_in_name_order() {
        let manifest = Manifest::parse(r#"{"b.js": "b-1.js", "a.js": "a-1.js"}"#)
            .expect("parse manifest");
        let names: Vec<_> = manifest.iter().map(|(name, _)| name).collect();
        assert_eq!(names, ["a.js", "b.js"]);
    }

    #[rstest]
    #[case::not_json("{not json")]
    #[case::array(r#"["app.js"]"#)]
    #[case::record_without_path(r#"{"app.js": {"integrity": "sha384-x"}}"#)]
    #[case::number_entry(r#"{"app.js": 42}"#)]
    fn malformed_manifests_are_rejected(#[case] json: &str) {
        assert!(Manifest::parse(json).is_err());
    }

    #[test]
    fn load_reports_missing_file_as_malformed() {
        let err = Manifest::load(Utf8Path::new("/nonexistent/.manifest.json"))
            .expect_err("expected read failure");
        assert!(matches!(
            err,
            VerifyError::MalformedManifest { what: "manifest", .. }
        ));
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("importmap.json"))
            .expect("utf-8 temp path");
        std::fs::write(&path, r#"{"imports": {"app": "/assets/app-abc123.js"}}"#)
            .expect("write import map");

        let map = ImportMap::load(&path).expect("load import map");
        assert_eq!(map.len(), 1);
    }

    #[rstest]
    #[case::https("https://cdn.example.test/lib.js", true)]
    #[case::http("http://cdn.example.test/lib.js", true)]
    #[case::upper_case("HTTPS://cdn.example.test/lib.js", true)]
    #[case::protocol_relative("//cdn.example.test/lib.js", true)]
    #[case::root_relative("/assets/app-abc123.js", false)]
    #[case::relative("controllers/hello.js", false)]
    #[case::dot_relative("./app.js", false)]
    fn import_targets_are_classified(#[case] target: &str, #[case] external: bool) {
        assert_eq!(ImportTarget::classify(target).is_external(), external);
    }

    #[test]
    fn import_map_without_imports_is_empty() {
        let map = ImportMap::parse(r#"{"scopes": {}}"#).expect("parse import map");
        assert!(map.is_empty());
    }

    #[test]
    fn import_map_with_non_string_target_is_rejected() {
        assert!(ImportMap::parse(r#"{"imports": {"app": 1}}"#).is_err());
    }
}
