//! Directory scan and eligibility filter.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{LoaderError, LoaderResult};
use crate::manifest::CapabilityManifest;
use crate::resolver::SCRIPT_EXTENSIONS;

/// Marker comment that opts a file in explicitly.
pub const REGISTER_MARKER: &str = "@scriptor-register";

/// Marker for any file with a default export.
pub const DEFAULT_EXPORT_MARKER: &str = "export default";

/// Directory names never descended into, besides hidden ones.
pub const DEFAULT_SKIP_DIRS: &[&str] = &["node_modules", "out"];

/// What the scan looks for.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Substrings that make a file eligible. Any one suffices.
    pub markers: Vec<String>,
    /// Directory names to skip at any depth.
    pub skip_dirs: Vec<String>,
    /// Files declared here are eligible regardless of markers.
    pub manifest: CapabilityManifest,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            markers: vec![REGISTER_MARKER.to_owned(), DEFAULT_EXPORT_MARKER.to_owned()],
            skip_dirs: DEFAULT_SKIP_DIRS.iter().map(|d| (*d).to_owned()).collect(),
            manifest: CapabilityManifest::default(),
        }
    }
}

/// One discovered script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFile {
    /// Absolute path.
    pub path: PathBuf,
    /// File contents as read during the scan.
    pub text: String,
    /// Whether the file should be compiled and loaded.
    pub eligible: bool,
}

/// Plain substring check; no parsing.
#[must_use]
pub fn is_eligible(text: &str, markers: &[String]) -> bool {
    markers.iter().any(|m| !m.is_empty() && text.contains(m.as_str()))
}

/// Whether `path` is a script source this loader compiles. Declaration
/// files are not.
#[must_use]
pub fn is_candidate(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if [".d.ts", ".d.mts", ".d.cts"].iter().any(|s| name.ends_with(s)) {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| SCRIPT_EXTENSIONS.contains(&e))
}

/// Walk `root` and return every candidate script, sorted by path.
///
/// Hidden directories below `root`, directories named in
/// `options.skip_dirs` and symlinks are skipped. A missing `root` yields an
/// empty list; an unreadable file is logged and left out.
///
/// # Errors
///
/// Returns [`LoaderError::Io`] if `root` exists but cannot be listed.
pub async fn discover(root: &Path, options: &DiscoveryOptions) -> LoaderResult<Vec<ScriptFile>> {
    if !tokio::fs::try_exists(root).await.unwrap_or(false) {
        debug!(root = %root.display(), "scan root does not exist");
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if dir == root => return Err(LoaderError::io(&dir, e)),
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Skipping unreadable directory");
                continue;
            },
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LoaderError::io(&dir, e))?
        {
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if file_type.is_symlink() {
                continue;
            }
            let path = entry.path();
            let name = entry.file_name();
            let name = name.to_string_lossy();

            if file_type.is_dir() {
                if name.starts_with('.') || options.skip_dirs.iter().any(|d| *d == name) {
                    continue;
                }
                pending.push(path);
            } else if file_type.is_file() && is_candidate(&path) {
                match tokio::fs::read_to_string(&path).await {
                    Ok(text) => {
                        let eligible = is_eligible(&text, &options.markers)
                            || options.manifest.declares(root, &path);
                        files.push(ScriptFile { path, text, eligible });
                    },
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable script");
                    },
                }
            }
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    debug!(
        root = %root.display(),
        discovered = files.len(),
        eligible = files.iter().filter(|f| f.eligible).count(),
        "scan complete"
    );
    Ok(files)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, body).unwrap();
    }

    #[test]
    fn markers_are_plain_substrings() {
        let markers = DiscoveryOptions::default().markers;
        assert!(is_eligible("// @scriptor-register\nconst x = 1;", &markers));
        assert!(is_eligible("export default { id: 'a' };", &markers));
        assert!(!is_eligible("export const a = 1;", &markers));
        assert!(!is_eligible("anything", &[String::new()]));
    }

    #[test]
    fn candidates_exclude_declarations() {
        assert!(is_candidate(Path::new("/a/b.ts")));
        assert!(is_candidate(Path::new("/a/b.mts")));
        assert!(!is_candidate(Path::new("/a/b.d.ts")));
        assert!(!is_candidate(Path::new("/a/b.js")));
        assert!(!is_candidate(Path::new("/a/b.json")));
    }

    #[tokio::test]
    async fn walk_skips_hidden_and_dependency_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "b.ts", "export default {};");
        write(root, "a.ts", "export const x = 1;");
        write(root, "nested/c.ts", "// @scriptor-register");
        write(root, "types.d.ts", "export default interface X {}");
        write(root, ".cache/d.ts", "export default {};");
        write(root, "node_modules/pkg/e.ts", "export default {};");
        write(root, "out/b.ts", "export default {};");

        let files = discover(root, &DiscoveryOptions::default()).await.unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.path.strip_prefix(root).unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.ts", "b.ts", "nested/c.ts"]);
        let eligible: Vec<_> = files.iter().map(|f| f.eligible).collect();
        assert_eq!(eligible, [false, true, true]);
    }

    #[tokio::test]
    async fn manifest_declares_eligibility() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "plain.ts", "module.exports = {};");
        let manifest =
            CapabilityManifest::parse("[[capability]]\nfile = \"plain.ts\"\n", Path::new("m.toml")).unwrap();
        let options = DiscoveryOptions {
            manifest,
            ..DiscoveryOptions::default()
        };
        let files = discover(dir.path(), &options).await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].eligible);
    }

    #[tokio::test]
    async fn missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let files = discover(&dir.path().join("absent"), &DiscoveryOptions::default())
            .await
            .unwrap();
        assert!(files.is_empty());
    }
}
