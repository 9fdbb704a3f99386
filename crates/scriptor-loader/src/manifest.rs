//! Capability manifest.
//!
//! An optional `manifest.toml` in the scan root lists script files that are
//! eligible for registration whether or not their text carries a marker:
//!
//! ```toml
//! [[capability]]
//! file = "tools/format.ts"
//! id = "formatter"   # optional, overrides the export's own id
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LoaderError, LoaderResult};
use crate::resolver::normalize;

/// One declared capability file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    /// Path relative to the scan root.
    pub file: PathBuf,
    /// Registration id to use instead of the export's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Parsed `manifest.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapabilityManifest {
    /// Declared capability files.
    #[serde(default, rename = "capability")]
    pub capabilities: Vec<ManifestEntry>,
}

impl CapabilityManifest {
    /// Parse manifest text. `path` is only used for error messages.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Manifest`] on invalid TOML or unknown keys.
    pub fn parse(text: &str, path: &Path) -> LoaderResult<Self> {
        toml::from_str(text).map_err(|e| LoaderError::Manifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Read the manifest at `path`. A missing file is an empty manifest.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Io`] if the file exists but cannot be read and
    /// [`LoaderError::Manifest`] if it does not parse.
    pub async fn load(path: &Path) -> LoaderResult<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                let manifest = Self::parse(&text, path)?;
                debug!(
                    path = %path.display(),
                    entries = manifest.capabilities.len(),
                    "loaded capability manifest"
                );
                Ok(manifest)
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(LoaderError::io(path, e)),
        }
    }

    fn entry(&self, scan_root: &Path, file: &Path) -> Option<&ManifestEntry> {
        let relative = normalize(file.strip_prefix(scan_root).unwrap_or(file));
        self.capabilities
            .iter()
            .find(|entry| normalize(&entry.file) == relative)
    }

    /// Whether `file` (absolute, under `scan_root`) is declared.
    #[must_use]
    pub fn declares(&self, scan_root: &Path, file: &Path) -> bool {
        self.entry(scan_root, file).is_some()
    }

    /// The id override declared for `file`, if any.
    #[must_use]
    pub fn declared_id(&self, scan_root: &Path, file: &Path) -> Option<&str> {
        self.entry(scan_root, file).and_then(|e| e.id.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[capability]]
file = "tools/format.ts"
id = "formatter"

[[capability]]
file = "./lint.ts"
"#;

    #[test]
    fn parses_entries_and_matches_paths() {
        let manifest = CapabilityManifest::parse(SAMPLE, Path::new("manifest.toml")).unwrap();
        assert_eq!(manifest.capabilities.len(), 2);

        let root = Path::new("/ws/.scriptor");
        assert!(manifest.declares(root, &root.join("tools/format.ts")));
        assert!(manifest.declares(root, &root.join("lint.ts")));
        assert!(!manifest.declares(root, &root.join("other.ts")));
        assert_eq!(
            manifest.declared_id(root, &root.join("tools/format.ts")),
            Some("formatter")
        );
        assert_eq!(manifest.declared_id(root, &root.join("lint.ts")), None);
    }

    #[test]
    fn unknown_keys_rejected() {
        let err = CapabilityManifest::parse("[[capability]]\nfile = \"a.ts\"\nentry = 1\n", Path::new("m.toml"))
            .unwrap_err();
        assert!(matches!(err, LoaderError::Manifest { .. }));
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = CapabilityManifest::load(&dir.path().join("manifest.toml"))
            .await
            .unwrap();
        assert!(manifest.capabilities.is_empty());
    }
}
