//! One loader session: a script runtime, its module cache and the host
//! bindings every module shares.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use rquickjs::{CatchResultExt, Context, Ctx, Function, Object, Persistent, Runtime, Value};
use tracing::{debug, warn};

use crate::bridge::HELPERS_JS;
use crate::cache::DependencyCache;
use crate::compiler::CompilerOptions;
use crate::dependency;
use crate::error::{LoaderError, LoaderResult};
use crate::host::{DefaultHostApi, HostApi};
use crate::module_record::ModuleRecord;
use crate::platform;
use crate::registry::Capability;
use crate::sandbox::{self, PRELUDE_JS, TimerQueue, Trust};
use crate::search_roots::SearchRootList;

/// Upper bound on jobs and timers run by a single [`LoaderSession::drain`].
const MAX_DRAIN_STEPS: usize = 100_000;

type Saved = Persistent<Object<'static>>;

/// State shared between the session and the `require` closures it hands
/// out. Holds only Rust data and persistent handles, never borrowed script
/// values.
pub(crate) struct SessionState {
    roots: SearchRootList,
    options: CompilerOptions,
    cache: RefCell<DependencyCache>,
    timers: Rc<TimerQueue>,
    host: Box<dyn HostApi>,
    host_object: RefCell<Option<Saved>>,
    platform: RefCell<HashMap<&'static str, Saved>>,
    helpers: RefCell<Option<Saved>>,
    prelude: RefCell<Option<Saved>>,
    transpiles: Cell<usize>,
    executions: Cell<usize>,
}

impl SessionState {
    fn new(roots: SearchRootList, options: CompilerOptions, host: Box<dyn HostApi>) -> Self {
        Self {
            roots,
            options,
            cache: RefCell::new(DependencyCache::new()),
            timers: Rc::new(TimerQueue::default()),
            host,
            host_object: RefCell::new(None),
            platform: RefCell::new(HashMap::new()),
            helpers: RefCell::new(None),
            prelude: RefCell::new(None),
            transpiles: Cell::new(0),
            executions: Cell::new(0),
        }
    }

    pub(crate) fn roots(&self) -> &SearchRootList {
        &self.roots
    }

    pub(crate) fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub(crate) fn cache(&self) -> &RefCell<DependencyCache> {
        &self.cache
    }

    pub(crate) fn timers(&self) -> &Rc<TimerQueue> {
        &self.timers
    }

    pub(crate) fn count_transpile(&self) {
        self.transpiles.set(self.transpiles.get().saturating_add(1));
    }

    pub(crate) fn count_execution(&self) {
        self.executions.set(self.executions.get().saturating_add(1));
    }

    fn prelude<'js>(&self, ctx: &Ctx<'js>) -> LoaderResult<Object<'js>> {
        let saved = self.prelude.borrow().clone();
        match saved {
            Some(saved) => Ok(saved.restore(ctx)?),
            None => Err(LoaderError::Engine("loader session already released".into())),
        }
    }

    pub(crate) fn prelude_fn<'js>(&self, ctx: &Ctx<'js>, name: &str) -> LoaderResult<Function<'js>> {
        Ok(self.prelude(ctx)?.get(name)?)
    }

    /// The host API object, created and populated on first use.
    pub(crate) fn host_object<'js>(&self, ctx: &Ctx<'js>) -> LoaderResult<Object<'js>> {
        let saved = self.host_object.borrow().clone();
        if let Some(saved) = saved {
            return Ok(saved.restore(ctx)?);
        }
        let api = Object::new(ctx.clone())?;
        self.host.install(ctx, &api)?;
        *self.host_object.borrow_mut() = Some(Persistent::save(ctx, api.clone()));
        debug!("host API object created");
        Ok(api)
    }

    /// A platform module. `console` is per requiring module; the rest are
    /// shared across the session.
    pub(crate) fn platform_module<'js>(
        &self,
        ctx: &Ctx<'js>,
        name: &'static str,
        from_file: &Path,
    ) -> LoaderResult<Object<'js>> {
        match name {
            "console" => self.console(ctx, from_file),
            "timers" => {
                let timers = Object::new(ctx.clone())?;
                self.timers.install(ctx, &timers)?;
                Ok(timers)
            },
            _ => {
                let saved = self.platform.borrow().get(name).cloned();
                if let Some(saved) = saved {
                    return Ok(saved.restore(ctx)?);
                }
                let module = platform::build(ctx, name)?;
                self.platform
                    .borrow_mut()
                    .insert(name, Persistent::save(ctx, module.clone()));
                Ok(module)
            },
        }
    }

    /// A compiler helper module by name, if the embedded shim has it.
    pub(crate) fn helper<'js>(&self, ctx: &Ctx<'js>, name: &str) -> LoaderResult<Option<Value<'js>>> {
        let saved = self.helpers.borrow().clone();
        let helpers = match saved {
            Some(saved) => saved.restore(ctx)?,
            None => {
                let helpers: Object<'js> = ctx.eval(HELPERS_JS)?;
                *self.helpers.borrow_mut() = Some(Persistent::save(ctx, helpers.clone()));
                helpers
            },
        };
        let helper: Value<'js> = helpers.get(name)?;
        Ok((!helper.is_undefined()).then_some(helper))
    }

    /// A `console` whose output is tagged with `module_path`.
    pub(crate) fn console<'js>(&self, ctx: &Ctx<'js>, module_path: &Path) -> LoaderResult<Object<'js>> {
        let sink = sandbox::console_sink(ctx, module_path.to_string_lossy().into_owned())?;
        Ok(self.prelude_fn(ctx, "makeConsole")?.call((sink,))?)
    }

    /// A fresh module scope inheriting from the engine global.
    pub(crate) fn new_scope<'js>(&self, ctx: &Ctx<'js>) -> LoaderResult<Object<'js>> {
        Ok(self.prelude_fn(ctx, "createScope")?.call(())?)
    }

    fn release(&self) {
        self.cache.borrow_mut().clear();
        self.timers.clear();
        self.host_object.borrow_mut().take();
        self.platform.borrow_mut().clear();
        self.helpers.borrow_mut().take();
        self.prelude.borrow_mut().take();
    }
}

/// A script runtime plus the module cache for one scan.
///
/// Every module loaded through a session shares its cache, its host API
/// object and its timer queue. Sessions are single-threaded.
pub struct LoaderSession {
    state: Rc<SessionState>,
    context: Context,
    runtime: Runtime,
}

impl LoaderSession {
    /// Create a session with the [`DefaultHostApi`].
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Engine`] if the runtime cannot be created.
    pub fn new(roots: SearchRootList, options: CompilerOptions) -> LoaderResult<Self> {
        Self::with_host(roots, options, DefaultHostApi::new())
    }

    /// Create a session whose `require("scriptor")` object is populated by
    /// `host`.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Engine`] if the runtime cannot be created.
    pub fn with_host(
        roots: SearchRootList,
        options: CompilerOptions,
        host: impl HostApi + 'static,
    ) -> LoaderResult<Self> {
        let runtime = Runtime::new()?;
        let context = Context::full(&runtime)?;
        let state = Rc::new(SessionState::new(roots, options, Box::new(host)));

        context.with(|ctx| -> LoaderResult<()> {
            let prelude: Object<'_> = ctx
                .eval(PRELUDE_JS)
                .catch(&ctx)
                .map_err(|e| LoaderError::Engine(e.to_string()))?;
            *state.prelude.borrow_mut() = Some(Persistent::save(&ctx, prelude));
            Ok(())
        })?;

        Ok(Self {
            state,
            context,
            runtime,
        })
    }

    /// Directories package specifiers are searched in.
    #[must_use]
    pub fn roots(&self) -> &SearchRootList {
        self.state.roots()
    }

    /// Options used to transpile script dependencies.
    #[must_use]
    pub fn options(&self) -> &CompilerOptions {
        self.state.options()
    }

    /// Number of single-file transpiles performed so far.
    #[must_use]
    pub fn transpile_count(&self) -> usize {
        self.state.transpiles.get()
    }

    /// Number of module bodies executed so far.
    #[must_use]
    pub fn execution_count(&self) -> usize {
        self.state.executions.get()
    }

    /// Number of modules in the cache.
    #[must_use]
    pub fn cached_modules(&self) -> usize {
        self.state.cache.borrow().len()
    }

    /// Whether a module with this id is cached.
    #[must_use]
    pub fn is_loaded(&self, path: &Path) -> bool {
        self.state.cache.borrow().contains(path)
    }

    /// Timers scheduled but not yet fired.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.state.timers.pending()
    }

    /// Require `specifier` as if from `from_file` and return its exports as
    /// JSON.
    ///
    /// # Errors
    ///
    /// Returns any resolution, transpile or execution error.
    pub fn require(&self, from_file: &Path, specifier: &str) -> LoaderResult<serde_json::Value> {
        let state = &self.state;
        let settled = self.context.with(|ctx| -> LoaderResult<Saved> {
            let exports = dependency::require(state, &ctx, from_file, specifier, None)?;
            self.settle(&ctx, exports, from_file)
        })?;
        self.drain();
        self.read_settled(settled, from_file)
    }

    /// Execute a compiled entry under the module id `source`.
    ///
    /// The record is cached before the body runs and removed again if it
    /// throws. An entry that is already cached is not run twice.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Execution`] if the body throws.
    pub fn execute_entry(&self, source: &Path, code: &str) -> LoaderResult<()> {
        let state = &self.state;
        self.context.with(|ctx| -> LoaderResult<()> {
            if state.cache.borrow().contains(source) {
                return Ok(());
            }
            let record = ModuleRecord::new(&ctx, source, None, state.roots())?;
            state.cache.borrow_mut().insert_if_absent(&ctx, source, &record);
            match dependency::run_module(state, &ctx, source, &record, code, Trust::Sandboxed) {
                Ok(()) => Ok(record.mark_loaded()?),
                Err(err) => {
                    state.cache.borrow_mut().remove(source);
                    Err(err)
                },
            }
        })?;
        self.drain();
        Ok(())
    }

    /// Run `code` as a throwaway sandboxed module located at `module_path`
    /// and return its settled `module.exports` as JSON. The snippet is not
    /// cached, but it is still the `module.parent` of files it loads.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::Execution`] if the snippet throws or its
    /// exports reject.
    pub fn evaluate(&self, module_path: &Path, code: &str) -> LoaderResult<serde_json::Value> {
        let state = &self.state;
        let settled = self.context.with(|ctx| -> LoaderResult<Saved> {
            let record = ModuleRecord::new(&ctx, module_path, None, state.roots())?;
            dependency::run_module(state, &ctx, module_path, &record, code, Trust::Sandboxed)?;
            self.settle(&ctx, record.exports()?, module_path)
        })?;
        self.drain();
        self.read_settled(settled, module_path)
    }

    /// Describe the default export of the loaded module `source`.
    ///
    /// Returns `None` when the module has no object-valued default export.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::InvalidExport`] if the module is not loaded or
    /// inspecting the export throws.
    pub fn capability(&self, source: &Path) -> LoaderResult<Option<Capability>> {
        let shape = self.context.with(|ctx| -> LoaderResult<Option<(Option<String>, Vec<String>, String)>> {
            let Some(target) = self.default_export(&ctx, source)? else {
                return Ok(None);
            };
            let describe = self.state.prelude_fn(&ctx, "describe")?;
            let shape: Object<'_> = describe
                .call((target,))
                .catch(&ctx)
                .map_err(|e| invalid_export(source, e.to_string()))?;
            Ok(Some((shape.get("id")?, shape.get("members")?, shape.get("descriptor")?)))
        })?;

        let Some((id, members, descriptor)) = shape else {
            return Ok(None);
        };
        let id = id.unwrap_or_else(|| {
            source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default()
        });
        let descriptor =
            serde_json::from_str(&descriptor).map_err(|e| invalid_export(source, e.to_string()))?;
        Ok(Some(Capability {
            id,
            source: source.to_path_buf(),
            members,
            descriptor,
        }))
    }

    /// Call `member` on the default export of `source` with JSON `args`
    /// (an array, or a single value), wait for any returned promise and
    /// return the result as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::InvalidExport`] if there is no such export and
    /// [`LoaderError::Execution`] if the call throws or rejects.
    pub fn invoke(&self, source: &Path, member: &str, args_json: &str) -> LoaderResult<serde_json::Value> {
        let settled = self.context.with(|ctx| -> LoaderResult<Saved> {
            let target = self
                .default_export(&ctx, source)?
                .ok_or_else(|| invalid_export(source, "no default export to invoke"))?;
            let invoke = self.state.prelude_fn(&ctx, "invoke")?;
            let settled: Object<'_> = invoke
                .call((target, member, args_json))
                .catch(&ctx)
                .map_err(|e| LoaderError::Execution {
                    path: source.to_path_buf(),
                    message: e.to_string(),
                })?;
            Ok(Persistent::save(&ctx, settled))
        })?;
        self.drain();
        self.read_settled(settled, source)
    }

    /// Run pending promise jobs and due timers until both queues are empty.
    pub fn drain(&self) {
        for _ in 0..MAX_DRAIN_STEPS {
            if self.runtime.is_job_pending() {
                if self.runtime.execute_pending_job().is_err() {
                    warn!("a pending promise job threw");
                }
                continue;
            }
            let fired = self.context.with(|ctx| self.state.timers.fire_next(&ctx));
            match fired {
                Ok(true) => {},
                Ok(false) => return,
                Err(err) => {
                    warn!(error = %err, "timer dispatch failed");
                    return;
                },
            }
        }
        warn!(steps = MAX_DRAIN_STEPS, "drain stopped before the queues emptied");
    }

    fn default_export<'js>(&self, ctx: &Ctx<'js>, source: &Path) -> LoaderResult<Option<Value<'js>>> {
        let record = self
            .state
            .cache
            .borrow()
            .get(ctx, source)?
            .ok_or_else(|| invalid_export(source, "module is not loaded"))?;
        let pick = self.state.prelude_fn(ctx, "defaultExport")?;
        let value: Value<'js> = pick
            .call((record.exports()?,))
            .catch(ctx)
            .map_err(|e| invalid_export(source, e.to_string()))?;
        Ok((!value.is_undefined()).then_some(value))
    }

    fn settle<'js>(&self, ctx: &Ctx<'js>, value: Value<'js>, path: &Path) -> LoaderResult<Saved> {
        let settled: Object<'js> = self
            .state
            .prelude_fn(ctx, "settle")?
            .call((value,))
            .catch(ctx)
            .map_err(|e| LoaderError::Execution {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(Persistent::save(ctx, settled))
    }

    fn read_settled(&self, settled: Saved, path: &Path) -> LoaderResult<serde_json::Value> {
        let (done, error, value) = self.context.with(
            |ctx| -> LoaderResult<(bool, Option<String>, Option<String>)> {
                let settled = settled.restore(&ctx)?;
                Ok((settled.get("done")?, settled.get("error")?, settled.get("value")?))
            },
        )?;
        let execution = |message: String| LoaderError::Execution {
            path: path.to_path_buf(),
            message,
        };
        if !done {
            return Err(execution("promise never settled".into()));
        }
        if let Some(error) = error {
            return Err(execution(error));
        }
        serde_json::from_str(value.as_deref().unwrap_or("null"))
            .map_err(|e| invalid_export(path, e.to_string()))
    }
}

impl Drop for LoaderSession {
    fn drop(&mut self) {
        self.state.release();
    }
}

impl std::fmt::Debug for LoaderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderSession")
            .field("roots", self.state.roots())
            .field("cache", &*self.state.cache.borrow())
            .field("transpiles", &self.state.transpiles.get())
            .finish_non_exhaustive()
    }
}

fn invalid_export(path: &Path, message: impl Into<String>) -> LoaderError {
    LoaderError::InvalidExport {
        path: PathBuf::from(path),
        message: message.into(),
    }
}
