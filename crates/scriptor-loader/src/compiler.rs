//! Full-program compiler host.
//!
//! `compile` checks each entry together with every relative script it
//! imports, transitively, and emits CommonJS for the entry only. Import
//! specifiers are resolved with [`resolver::resolve`] so the compiler and
//! the loader never disagree about where a module lives.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::path::{Path, PathBuf};

use oxc::diagnostics::OxcDiagnostic;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::resolver::{self, Resolved, SpecifierKind};
use crate::search_roots::SearchRootList;
use crate::transpile;

/// Extension of emitted files.
pub const COMPILED_EXTENSION: &str = "js";

/// Compiler settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerOptions {
    /// Output language target, e.g. `esnext` or `es2022`.
    pub target: String,
    /// Lower decorators with the legacy (experimental) semantics.
    pub experimental_decorators: bool,
    /// Emit `design:*` metadata for decorated members.
    pub emit_decorator_metadata: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            target: "esnext".to_owned(),
            experimental_decorators: true,
            emit_decorator_metadata: true,
        }
    }
}

/// Diagnostic severity. Only errors are surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks emission.
    Error,
}

/// One compiler message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Offending file; `None` for whole-program errors.
    pub file: Option<PathBuf>,
    /// 1-based line, 0 when unknown.
    pub line: u32,
    /// 1-based column, 0 when unknown.
    pub column: u32,
    /// Message text.
    pub message: String,
    /// Always [`Severity::Error`].
    pub severity: Severity,
}

impl Diagnostic {
    /// A diagnostic at byte `offset` of `source`.
    #[must_use]
    pub fn at(file: &Path, source: &str, offset: usize, message: impl Into<String>) -> Self {
        let (line, column) = line_col(source, offset);
        Self {
            file: Some(file.to_path_buf()),
            line,
            column,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    /// A diagnostic about a file with no position.
    #[must_use]
    pub fn file(file: &Path, message: impl Into<String>) -> Self {
        Self {
            file: Some(file.to_path_buf()),
            line: 0,
            column: 0,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    /// A whole-program diagnostic.
    #[must_use]
    pub fn global(message: impl Into<String>) -> Self {
        Self {
            file: None,
            line: 0,
            column: 0,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub(crate) fn from_oxc(file: &Path, source: &str, diag: &OxcDiagnostic) -> Self {
        let offset = diag
            .labels
            .as_ref()
            .and_then(|labels| labels.first())
            .map(|label| label.offset());
        match offset {
            Some(offset) => Self::at(file, source, offset, diag.message.to_string()),
            None => Self::file(file, diag.message.to_string()),
        }
    }

    /// Whether this applies to the whole program rather than one file.
    #[must_use]
    pub fn is_global(&self) -> bool {
        self.file.is_none()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.file {
            Some(file) if self.line > 0 => {
                write!(f, "{}:{}:{}: error: {}", file.display(), self.line, self.column, self.message)
            },
            Some(file) => write!(f, "{}: error: {}", file.display(), self.message),
            None => write!(f, "error: {}", self.message),
        }
    }
}

/// 1-based line and column (in characters) of byte `offset`.
fn line_col(source: &str, offset: usize) -> (u32, u32) {
    let end = offset.min(source.len());
    let prefix = source.get(..end).unwrap_or(source);
    let line = prefix.matches('\n').count();
    let column = prefix
        .rsplit_once('\n')
        .map_or(prefix, |(_, tail)| tail)
        .chars()
        .count();
    let to_u32 = |n: usize| u32::try_from(n).unwrap_or(u32::MAX).saturating_add(1);
    (to_u32(line), to_u32(column))
}

/// Result of compiling one entry file.
#[derive(Debug, Clone, Serialize)]
pub struct CompiledUnit {
    /// The entry file.
    pub source: PathBuf,
    /// Where output was (or would have been) written.
    pub output: PathBuf,
    /// Errors from every file in the entry's program, in discovery order.
    pub diagnostics: Vec<Diagnostic>,
    /// `true` only if output was written.
    pub success: bool,
}

/// Where the compiled form of `source` lives: the path relative to
/// `source_root`, under `out_dir`, with a `.js` extension.
#[must_use]
pub fn output_path(source_root: &Path, out_dir: &Path, source: &Path) -> PathBuf {
    let relative = source
        .strip_prefix(source_root)
        .ok()
        .map(Path::to_path_buf)
        .or_else(|| source.file_name().map(PathBuf::from))
        .unwrap_or_default();
    out_dir.join(relative).with_extension(COMPILED_EXTENSION)
}

/// Programmatic compiler session.
#[derive(Debug)]
pub struct CompilerHost {
    options: CompilerOptions,
    source_root: PathBuf,
    invocations: usize,
}

impl CompilerHost {
    /// Create a host. Output layout mirrors paths relative to `source_root`.
    #[must_use]
    pub fn new(options: CompilerOptions, source_root: impl Into<PathBuf>) -> Self {
        Self {
            options,
            source_root: source_root.into(),
            invocations: 0,
        }
    }

    /// Compiler settings.
    #[must_use]
    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Number of entry files compiled so far.
    #[must_use]
    pub fn invocations(&self) -> usize {
        self.invocations
    }

    /// Compile each entry as its own program and emit it under `out_dir`.
    ///
    /// Failures are reported in the returned units, never as an `Err`: a
    /// unit with `success == false` has not been emitted.
    pub fn compile(
        &mut self,
        entries: &[PathBuf],
        roots: &SearchRootList,
        out_dir: &Path,
    ) -> Vec<CompiledUnit> {
        let transform_options = transpile::transform_options(&self.options);

        entries
            .iter()
            .map(|entry| {
                self.invocations = self.invocations.saturating_add(1);
                let output = output_path(&self.source_root, out_dir, entry);

                let diagnostics = match &transform_options {
                    Ok(opts) => self.compile_entry(entry, roots, &output, opts),
                    Err(message) => vec![Diagnostic::global(message.clone())],
                };
                let success = diagnostics.is_empty();
                if !success {
                    warn!(
                        source = %entry.display(),
                        errors = diagnostics.len(),
                        "emit skipped"
                    );
                }

                CompiledUnit {
                    source: entry.clone(),
                    output,
                    diagnostics,
                    success,
                }
            })
            .collect()
    }

    fn compile_entry(
        &self,
        entry: &Path,
        roots: &SearchRootList,
        output: &Path,
        options: &oxc::transformer::TransformOptions,
    ) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let mut visited: HashSet<PathBuf> = HashSet::new();
        let mut queue = VecDeque::from([resolver::normalize(entry)]);
        let mut entry_code: Option<String> = None;

        while let Some(file) = queue.pop_front() {
            if !visited.insert(file.clone()) {
                continue;
            }

            let source = match std::fs::read_to_string(&file) {
                Ok(s) => s,
                Err(e) => {
                    diagnostics.push(Diagnostic::file(&file, format!("cannot read file: {e}")));
                    continue;
                },
            };

            let transformed = transpile::transform(&source, &file, options);
            diagnostics.extend(transformed.errors);

            let from_dir = file.parent().unwrap_or_else(|| Path::new("/"));
            for import in &transformed.imports {
                let offset = usize::try_from(import.offset).unwrap_or(usize::MAX);
                match resolver::resolve(&import.specifier, from_dir, roots) {
                    Ok(Resolved::File(dep)) => {
                        let relative = resolver::classify(&import.specifier) == SpecifierKind::Relative;
                        if relative && resolver::is_script(&dep) {
                            queue.push_back(dep);
                        }
                    },
                    Ok(Resolved::Host(_)) => {},
                    Err(_) => diagnostics.push(Diagnostic::at(
                        &file,
                        &source,
                        offset,
                        format!("Cannot find module '{}'", import.specifier),
                    )),
                }
            }

            if entry_code.is_none() {
                entry_code = Some(transformed.code);
            }
        }

        if !diagnostics.is_empty() {
            return diagnostics;
        }

        let code = transpile::lower_esm(&entry_code.unwrap_or_default());
        if let Err(e) = write_output(output, &code) {
            diagnostics.push(Diagnostic::file(entry, format!("cannot write {}: {e}", output.display())));
        } else {
            debug!(source = %entry.display(), output = %output.display(), "emitted");
        }
        diagnostics
    }
}

fn write_output(output: &Path, code: &str) -> std::io::Result<()> {
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, code)
}
