//! Test harness helpers.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Scan directory name inside a workspace.
pub const SCAN_DIR: &str = ".scriptor";

/// A throwaway workspace with a `.scriptor/` scan directory.
///
/// Everything is removed when the value is dropped.
#[derive(Debug)]
pub struct TestWorkspace {
    dir: TempDir,
}

impl TestWorkspace {
    /// Create a workspace with an empty scan directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::with_prefix("scriptor-").expect("Failed to create temp directory");
        fs::create_dir_all(dir.path().join(SCAN_DIR)).expect("Failed to create scan directory");
        Self { dir }
    }

    /// The workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// `<root>/.scriptor`.
    #[must_use]
    pub fn scan_dir(&self) -> PathBuf {
        self.root().join(SCAN_DIR)
    }

    /// Write `content` to `rel` under the workspace root, creating parent
    /// directories. Returns the absolute path.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        write_file(&self.root().join(rel), content)
    }

    /// Write `content` to `rel` under the scan directory.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn script(&self, rel: &str, content: &str) -> PathBuf {
        write_file(&self.scan_dir().join(rel), content)
    }

    /// Write a package under `<dir>/node_modules/<name>/` with the given
    /// `main` entry and file contents.
    ///
    /// # Panics
    ///
    /// Panics if a file cannot be written.
    pub fn package(&self, dir: &Path, name: &str, main: Option<&str>, files: &[(&str, &str)]) -> PathBuf {
        let package_dir = dir.join("node_modules").join(name);
        let manifest = match main {
            Some(main) => format!("{{\"name\": \"{name}\", \"main\": \"{main}\"}}"),
            None => format!("{{\"name\": \"{name}\"}}"),
        };
        write_file(&package_dir.join("package.json"), &manifest);
        for (rel, content) in files {
            write_file(&package_dir.join(rel), content);
        }
        package_dir
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

fn write_file(path: &Path, content: &str) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    fs::write(path, content).expect("Failed to write file");
    path.to_path_buf()
}

/// Set up test logging with the given filter.
///
/// Safe to call from every test; only the first call installs a
/// subscriber.
pub fn setup_test_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

/// Set up test logging at `warn`.
pub fn setup_test_logging_default() {
    setup_test_logging("warn");
}
