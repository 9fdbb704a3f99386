//! Loader error types.

use std::path::{Path, PathBuf};

use crate::compiler::Diagnostic;

/// Errors from resolution, compilation, execution and registration.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    /// A file or directory could not be read or written.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// No search root produced a file for the specifier.
    #[error("Cannot find module '{specifier}' (searched: {})", join_paths(searched))]
    NotFound {
        /// The specifier as written in the importing file.
        specifier: String,
        /// Every directory consulted, in order.
        searched: Vec<PathBuf>,
    },

    /// The full-program compile reported errors and emitted nothing.
    #[error("compilation of {} failed with {} error(s)", path.display(), diagnostics.len())]
    Compile {
        /// The entry file.
        path: PathBuf,
        /// Collected diagnostics.
        diagnostics: Vec<Diagnostic>,
    },

    /// Single-file transpilation of a dependency failed.
    #[error("transpile failed for {}: {message}", path.display())]
    Transpile {
        /// The dependency file.
        path: PathBuf,
        /// Parser or transformer output.
        message: String,
    },

    /// Module top-level code threw.
    #[error("execution of {} failed: {message}", path.display())]
    Execution {
        /// The module whose code threw.
        path: PathBuf,
        /// The exception text, with stack when available.
        message: String,
    },

    /// The compiler reported success but the emitted file is missing.
    #[error("compiled output {} for {} is missing", output.display(), source_path.display())]
    MissingOutput {
        /// The script that was compiled.
        source_path: PathBuf,
        /// Where the output was expected.
        output: PathBuf,
    },

    /// The default export is not an object.
    #[error("invalid default export in {}: {message}", path.display())]
    InvalidExport {
        /// The entry file.
        path: PathBuf,
        /// What was found instead.
        message: String,
    },

    /// A capability with this id is already registered.
    #[error("capability already registered: {0}")]
    DuplicateCapability(String),

    /// The capability manifest could not be parsed.
    #[error("manifest error in {}: {message}", path.display())]
    Manifest {
        /// Manifest path.
        path: PathBuf,
        /// Parse error.
        message: String,
    },

    /// The script engine failed outside of module code.
    #[error("engine error: {0}")]
    Engine(String),
}

impl LoaderError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<rquickjs::Error> for LoaderError {
    fn from(e: rquickjs::Error) -> Self {
        Self::Engine(e.to_string())
    }
}

fn join_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "<no search roots>".to_owned();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn display_relative(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .display()
        .to_string()
}

/// Result type for loader operations.
pub type LoaderResult<T> = Result<T, LoaderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_every_root() {
        let err = LoaderError::NotFound {
            specifier: "left-pad".into(),
            searched: vec![PathBuf::from("/ws/.scriptor/node_modules"), PathBuf::from("/ws/node_modules")],
        };
        let msg = err.to_string();
        assert!(msg.contains("'left-pad'"), "got: {msg}");
        assert!(msg.contains("/ws/.scriptor/node_modules, /ws/node_modules"), "got: {msg}");
    }

    #[test]
    fn not_found_without_roots_says_so() {
        let err = LoaderError::NotFound {
            specifier: "x".into(),
            searched: Vec::new(),
        };
        assert!(err.to_string().contains("<no search roots>"));
    }
}
