//! Ordered search roots for one loader session.

use std::path::{Path, PathBuf};

/// Directories consulted, in priority order, when resolving a package-style
/// specifier. The first root that produces a file wins.
///
/// The list is fixed for the lifetime of a [`LoaderSession`](crate::LoaderSession);
/// a different order needs a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRootList {
    roots: Vec<PathBuf>,
}

impl SearchRootList {
    /// Build from an explicit list. Order is preserved and duplicates dropped.
    #[must_use]
    pub fn new(roots: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut unique: Vec<PathBuf> = Vec::new();
        for root in roots {
            let root = crate::resolver::normalize(&root);
            if !unique.contains(&root) {
                unique.push(root);
            }
        }
        Self { roots: unique }
    }

    /// The standard roots for a workspace:
    ///
    /// 1. `{scan_dir}/{dependency_dir}`
    /// 2. `{workspace}/{dependency_dir}`
    /// 3. `{scan_dir}`
    #[must_use]
    pub fn for_workspace(workspace_root: &Path, scan_dir: &Path, dependency_dir: &str) -> Self {
        Self::new([
            scan_dir.join(dependency_dir),
            workspace_root.join(dependency_dir),
            scan_dir.to_path_buf(),
        ])
    }

    /// Iterate roots in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(PathBuf::as_path)
    }

    /// The roots as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Number of roots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Roots as display strings, for `module.paths`.
    #[must_use]
    pub fn to_strings(&self) -> Vec<String> {
        self.roots
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect()
    }
}
