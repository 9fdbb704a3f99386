//! Configuration struct definitions.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Discovery settings.
    pub scan: ScanSection,
    /// Compiler settings.
    pub compiler: CompilerSection,
    /// Logging settings.
    pub logging: LoggingSection,
}

/// `[scan]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSection {
    /// Scan root, relative to the workspace root.
    pub directory: String,
    /// Compiled output directory, relative to the scan root.
    pub output_directory: String,
    /// Dependency directory name.
    pub dependency_directory: String,
    /// Eligibility markers.
    pub markers: Vec<String>,
    /// Directory names the walk never enters. Hidden directories are always skipped.
    pub skip_directories: Vec<String>,
    /// Typed manifest file, relative to the scan root.
    pub manifest: String,
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            directory: ".scriptor".to_owned(),
            output_directory: "out".to_owned(),
            dependency_directory: "node_modules".to_owned(),
            markers: vec!["@scriptor-register".to_owned(), "export default".to_owned()],
            skip_directories: vec!["node_modules".to_owned(), "out".to_owned()],
            manifest: "manifest.toml".to_owned(),
        }
    }
}

/// `[compiler]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerSection {
    /// Output language target (`esnext`, `es2022`, ...).
    pub target: String,
    /// Lower decorators with the legacy transform.
    pub experimental_decorators: bool,
    /// Emit `design:*` metadata for decorated members.
    pub emit_decorator_metadata: bool,
}

impl Default for CompilerSection {
    fn default() -> Self {
        Self {
            target: "esnext".to_owned(),
            experimental_decorators: true,
            emit_decorator_metadata: true,
        }
    }
}

/// `[logging]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Base level filter.
    pub level: String,
    /// `pretty`, `compact`, `json` or `full`.
    pub format: String,
    /// Extra filter directives.
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "pretty".to_owned(),
            directives: Vec::new(),
        }
    }
}
