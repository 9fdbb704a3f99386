//! Discovery & Registration Orchestrator.
//!
//! One scan: discover scripts under the scan root, compile each eligible
//! one on its own, execute the emitted file in the session and hand its
//! default export to the registry. A failure at any stage is logged against
//! the file and the scan moves on.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::compiler::{CompilerHost, CompilerOptions};
use crate::discovery::{self, DiscoveryOptions, ScriptFile};
use crate::error::{LoaderError, LoaderResult, display_relative};
use crate::manifest::CapabilityManifest;
use crate::registry::CapabilityRegistry;
use crate::search_roots::SearchRootList;
use crate::session::LoaderSession;

/// Name of the scan directory under a workspace root.
pub const SCAN_DIRECTORY: &str = ".scriptor";
/// Compiled output directory under the scan root.
pub const OUTPUT_DIRECTORY: &str = "out";
/// Package dependency directory name.
pub const DEPENDENCY_DIRECTORY: &str = "node_modules";
/// Capability manifest file name under the scan root.
pub const MANIFEST_FILE: &str = "manifest.toml";

/// Everything an [`Orchestrator`] needs to know about a workspace.
#[derive(Debug, Clone)]
pub struct LoaderOptions {
    /// The workspace root.
    pub workspace_root: PathBuf,
    /// The only directory scanned.
    pub scan_dir: PathBuf,
    /// Where compiled entries are emitted.
    pub out_dir: PathBuf,
    /// Dependency directory name, looked up under the scan root and the
    /// workspace root.
    pub dependency_dir: String,
    /// Eligibility markers.
    pub markers: Vec<String>,
    /// Directory names skipped during the scan.
    pub skip_dirs: Vec<String>,
    /// Manifest file name, relative to the scan root.
    pub manifest: String,
    /// Compiler settings for entries and dependencies.
    pub compiler: CompilerOptions,
}

impl LoaderOptions {
    /// Standard layout for `workspace_root`: `.scriptor/`, `.scriptor/out/`,
    /// `node_modules`.
    #[must_use]
    pub fn for_workspace(workspace_root: impl Into<PathBuf>) -> Self {
        let workspace_root = workspace_root.into();
        let scan_dir = workspace_root.join(SCAN_DIRECTORY);
        let defaults = DiscoveryOptions::default();
        Self {
            out_dir: scan_dir.join(OUTPUT_DIRECTORY),
            scan_dir,
            workspace_root,
            dependency_dir: DEPENDENCY_DIRECTORY.to_owned(),
            markers: defaults.markers,
            skip_dirs: defaults.skip_dirs,
            manifest: MANIFEST_FILE.to_owned(),
            compiler: CompilerOptions::default(),
        }
    }

    /// Search roots in priority order.
    #[must_use]
    pub fn search_roots(&self) -> SearchRootList {
        SearchRootList::for_workspace(&self.workspace_root, &self.scan_dir, &self.dependency_dir)
    }

    /// Absolute path of the capability manifest.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.scan_dir.join(&self.manifest)
    }
}

/// Outcome of one [`Orchestrator::scan_and_load`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    /// Candidate scripts found.
    pub discovered: usize,
    /// Candidates that passed the marker or manifest filter.
    pub eligible: usize,
    /// Files registered this scan, in scan order.
    pub loaded: Vec<PathBuf>,
    /// Files that failed, with the reason.
    pub failed: Vec<(PathBuf, String)>,
    /// Files that ran but exported no default object.
    pub skipped_no_default: Vec<PathBuf>,
}

/// Drives discovery, compilation, execution and registration.
pub struct Orchestrator<R: CapabilityRegistry> {
    registry: R,
    options: LoaderOptions,
    compiler: CompilerHost,
    session: LoaderSession,
    roots: SearchRootList,
    loaded: HashSet<PathBuf>,
}

impl<R: CapabilityRegistry> Orchestrator<R> {
    /// Create an orchestrator that registers into `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Engine`] if the script runtime cannot start.
    pub fn new(registry: R, options: LoaderOptions) -> LoaderResult<Self> {
        let roots = options.search_roots();
        let session = LoaderSession::new(roots.clone(), options.compiler.clone())?;
        let compiler = CompilerHost::new(options.compiler.clone(), options.scan_dir.clone());
        Ok(Self {
            registry,
            options,
            compiler,
            session,
            roots,
            loaded: HashSet::new(),
        })
    }

    /// The injected registry.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// The loader session shared by every file loaded so far.
    pub fn session(&self) -> &LoaderSession {
        &self.session
    }

    /// The compiler host, for its invocation counter.
    pub fn compiler(&self) -> &CompilerHost {
        &self.compiler
    }

    /// Workspace settings.
    pub fn options(&self) -> &LoaderOptions {
        &self.options
    }

    /// Give the registry back.
    pub fn into_registry(self) -> R {
        self.registry
    }

    /// Scan `root` and load every eligible file not already loaded by this
    /// orchestrator. Files that failed on an earlier scan are retried.
    ///
    /// # Errors
    ///
    /// Only a failure to read the manifest or to list `root` itself is an
    /// error. Per-file failures are recorded in the report.
    pub async fn scan_and_load(&mut self, root: &Path) -> LoaderResult<ScanReport> {
        let manifest = CapabilityManifest::load(&self.options.manifest_path()).await?;
        let discovery = DiscoveryOptions {
            markers: self.options.markers.clone(),
            skip_dirs: self.options.skip_dirs.clone(),
            manifest,
        };
        let files = discovery::discover(root, &discovery).await?;

        let mut report = ScanReport {
            discovered: files.len(),
            eligible: files.iter().filter(|f| f.eligible).count(),
            ..ScanReport::default()
        };

        for file in files.iter().filter(|f| f.eligible) {
            if self.loaded.contains(&file.path) {
                continue;
            }
            let shown = display_relative(&file.path, root);
            match self.load_one(file, &discovery.manifest, root) {
                Ok(true) => {
                    self.loaded.insert(file.path.clone());
                    report.loaded.push(file.path.clone());
                },
                Ok(false) => {
                    self.loaded.insert(file.path.clone());
                    warn!(file = %shown, "no default export object; nothing registered");
                    report.skipped_no_default.push(file.path.clone());
                },
                Err(err) => {
                    warn!(file = %shown, error = %err, "failed to load script");
                    if let LoaderError::Compile { diagnostics, .. } = &err {
                        for diagnostic in diagnostics {
                            warn!("{diagnostic}");
                        }
                    }
                    report.failed.push((file.path.clone(), err.to_string()));
                },
            }
        }

        info!(
            root = %root.display(),
            discovered = report.discovered,
            eligible = report.eligible,
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            "scan finished"
        );
        Ok(report)
    }

    /// Compile, execute and register one file. `Ok(false)` means it ran but
    /// had nothing to register.
    fn load_one(&mut self, file: &ScriptFile, manifest: &CapabilityManifest, root: &Path) -> LoaderResult<bool> {
        if self.session.is_loaded(&file.path) {
            debug!(path = %file.path.display(), "already loaded as a dependency, skipping compile");
        } else {
            self.compile_and_execute(file)?;
        }

        let Some(mut capability) = self.session.capability(&file.path)? else {
            return Ok(false);
        };
        if let Some(id) = manifest.declared_id(root, &file.path) {
            id.clone_into(&mut capability.id);
        }
        self.registry.register(capability)?;
        Ok(true)
    }

    fn compile_and_execute(&mut self, file: &ScriptFile) -> LoaderResult<()> {
        let unit = self
            .compiler
            .compile(std::slice::from_ref(&file.path), &self.roots, &self.options.out_dir)
            .pop()
            .ok_or_else(|| LoaderError::MissingOutput {
                source_path: file.path.clone(),
                output: self.options.out_dir.clone(),
            })?;
        if !unit.success {
            return Err(LoaderError::Compile {
                path: file.path.clone(),
                diagnostics: unit.diagnostics,
            });
        }

        let code = std::fs::read_to_string(&unit.output).map_err(|_| LoaderError::MissingOutput {
            source_path: file.path.clone(),
            output: unit.output.clone(),
        })?;
        self.session.execute_entry(&file.path, &code)
    }
}

impl<R: CapabilityRegistry + std::fmt::Debug> std::fmt::Debug for Orchestrator<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("options", &self.options)
            .field("loaded", &self.loaded.len())
            .finish_non_exhaustive()
    }
}
