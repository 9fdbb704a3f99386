//! Dependency Loader.
//!
//! Implements the `require` every module receives. Host specifiers are
//! answered from the session's bindings; files are resolved, executed once
//! and cached by absolute path.

use std::path::Path;
use std::rc::Rc;

use rquickjs::{CatchResultExt, Ctx, Exception, Function, Object, Value};
use tracing::debug;

use crate::bridge::HostModule;
use crate::error::{LoaderError, LoaderResult};
use crate::module_record::ModuleRecord;
use crate::resolver::{self, Resolved, SpecifierKind};
use crate::sandbox::{Sandbox, Trust};
use crate::session::SessionState;
use crate::transpile;

/// Build the `require` function handed to the module `record` at
/// `module_path`.
///
/// The native loader takes the requiring `module` object as an argument and
/// a script-side wrapper supplies it, so every record reaches its children
/// whether or not it is cached.
pub(crate) fn require_fn<'js>(
    state: &Rc<SessionState>,
    ctx: &Ctx<'js>,
    module_path: &Path,
    record: &ModuleRecord<'js>,
) -> LoaderResult<Function<'js>> {
    let shared = Rc::clone(state);
    let module_path = module_path.to_path_buf();
    let load = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, specifier: String, module: Object<'js>| -> rquickjs::Result<Value<'js>> {
            let parent = ModuleRecord::from_object(module);
            require(&shared, &ctx, &module_path, &specifier, Some(&parent))
                .map_err(|err| Exception::throw_message(&ctx, &err.to_string()))
        },
    )?;
    let bind = state.prelude_fn(ctx, "bindRequire")?;
    Ok(bind.call((load, record.object().clone()))?)
}

/// Resolve and load `specifier` as required from `from_file`.
///
/// Without a `parent` record, the cached record of `from_file` (if any)
/// becomes the parent of a newly loaded file.
pub(crate) fn require<'js>(
    state: &Rc<SessionState>,
    ctx: &Ctx<'js>,
    from_file: &Path,
    specifier: &str,
    parent: Option<&ModuleRecord<'js>>,
) -> LoaderResult<Value<'js>> {
    let from_dir = from_file.parent().unwrap_or(from_file);
    match resolver::resolve(specifier, from_dir, state.roots())? {
        Resolved::Host(HostModule::Api) => Ok(state.host_object(ctx)?.into_value()),
        Resolved::Host(HostModule::Platform(name)) => {
            Ok(state.platform_module(ctx, name, from_file)?.into_value())
        },
        Resolved::Host(HostModule::Helper(name)) => state.helper(ctx, &name).and_then(|helper| {
            helper.ok_or_else(|| LoaderError::NotFound {
                specifier: specifier.to_owned(),
                searched: Vec::new(),
            })
        }),
        Resolved::File(path) => {
            let trust = match resolver::classify(specifier) {
                SpecifierKind::Relative => Trust::Sandboxed,
                _ => Trust::Trusted,
            };
            let parent = match parent {
                Some(parent) => Some(parent.clone()),
                None => state.cache().borrow().get(ctx, from_file)?,
            };
            load_file(state, ctx, &path, parent.as_ref(), trust)
        },
    }
}

/// Load the file at `path` unless it is already cached, and return its
/// `module.exports`.
///
/// A cached record is returned as is, even while it is still executing.
/// That is what makes require cycles terminate. A record whose body throws
/// is evicted and detached from `parent`, so a later attempt starts clean.
pub(crate) fn load_file<'js>(
    state: &Rc<SessionState>,
    ctx: &Ctx<'js>,
    path: &Path,
    parent: Option<&ModuleRecord<'js>>,
    trust: Trust,
) -> LoaderResult<Value<'js>> {
    let cached = state.cache().borrow().get(ctx, path)?;
    if let Some(record) = cached {
        return Ok(record.exports()?);
    }

    let record = ModuleRecord::new(ctx, path, parent, state.roots())?;
    state.cache().borrow_mut().insert_if_absent(ctx, path, &record);

    match execute_file(state, ctx, path, &record, trust) {
        Ok(()) => {
            record.mark_loaded()?;
            debug!(path = %path.display(), ?trust, "module loaded");
            Ok(record.exports()?)
        },
        Err(err) => {
            state.cache().borrow_mut().remove(path);
            if let Err(detach) = record.detach() {
                debug!(path = %path.display(), error = %detach, "could not detach failed module");
            }
            Err(err)
        },
    }
}

fn execute_file<'js>(
    state: &Rc<SessionState>,
    ctx: &Ctx<'js>,
    path: &Path,
    record: &ModuleRecord<'js>,
    trust: Trust,
) -> LoaderResult<()> {
    let source = std::fs::read_to_string(path).map_err(|e| LoaderError::io(path, e))?;
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or_default();

    if extension == "json" {
        let value = ctx
            .json_parse(source)
            .catch(ctx)
            .map_err(|e| LoaderError::Execution {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        record.set_exports(value)?;
        return Ok(());
    }

    let code = if resolver::is_script(path) {
        state.count_transpile();
        transpile::transpile(&source, path, state.options())?
    } else if extension == "mjs" {
        transpile::lower_esm(&source)
    } else {
        source
    };
    run_module(state, ctx, path, record, &code, trust)
}

/// Run already-compiled CommonJS `code` as the body of `record`.
pub(crate) fn run_module<'js>(
    state: &Rc<SessionState>,
    ctx: &Ctx<'js>,
    path: &Path,
    record: &ModuleRecord<'js>,
    code: &str,
    trust: Trust,
) -> LoaderResult<()> {
    let sandbox = Sandbox::new(ctx, record, path, trust)?;
    sandbox.bind("require", require_fn(state, ctx, path, record)?)?;
    sandbox.bind("console", state.console(ctx, path)?)?;
    state.timers().install(ctx, sandbox.bindings())?;
    if sandbox.trust() == Trust::Sandboxed {
        sandbox.bind("globalThis", state.new_scope(ctx)?)?;
    }
    state.count_execution();

    sandbox.run(code).catch(ctx).map_err(|e| LoaderError::Execution {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
