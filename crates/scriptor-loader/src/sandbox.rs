//! Sandbox Builder.
//!
//! Every module body runs inside a function wrapper whose parameters are
//! the injected bindings. Sandboxed modules also get a private `globalThis`
//! whose prototype is the real global, so writes through it stay local
//! while every built-in stays readable.
//!
//! This is a scoping convenience, not a security boundary.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use rquickjs::function::{Opt, Rest};
use rquickjs::{CatchResultExt, Ctx, Function, Object, Persistent, Value};
use tracing::{debug, error, info, trace, warn};

use crate::module_record::ModuleRecord;

/// Script-side helpers shared by every module in a session.
///
/// `settle` and `invoke` return a box `{ done, value, error }` that the
/// host polls after draining the job queue. `value` is JSON text.
pub(crate) const PRELUDE_JS: &str = r#"(function () {
  "use strict";
  function render(value) {
    if (typeof value === "string") return value;
    if (value instanceof Error) return value.stack ? String(value) + "\n" + value.stack : String(value);
    if (typeof value === "object" && value !== null) {
      try { return JSON.stringify(value); } catch (_) { return String(value); }
    }
    return String(value);
  }
  function toJson(value) {
    if (value === undefined || typeof value === "function") return "null";
    try {
      var text = JSON.stringify(value);
      return text === undefined ? "null" : text;
    } catch (_) {
      return "null";
    }
  }
  function settle(value) {
    var box = { done: false, value: undefined, error: undefined };
    Promise.resolve(value).then(
      function (v) { box.done = true; box.value = toJson(v); },
      function (e) { box.done = true; box.error = render(e); }
    );
    return box;
  }
  function methodNames(target) {
    var names = [];
    var seen = {};
    var proto = target;
    while (proto && proto !== Object.prototype && proto !== Function.prototype) {
      Object.getOwnPropertyNames(proto).forEach(function (name) {
        if (name === "constructor" || seen[name]) return;
        var desc = Object.getOwnPropertyDescriptor(proto, name);
        if (proto === target ? desc.enumerable || typeof desc.value === "function" : typeof desc.value === "function") {
          seen[name] = true;
          names.push(name);
        }
      });
      proto = Object.getPrototypeOf(proto);
    }
    return names;
  }
  return {
    createScope: function () { return Object.create(globalThis); },
    bindRequire: function (load, module) {
      return function require(specifier) { return load(specifier, module); };
    },
    makeConsole: function (sink) {
      var out = {};
      ["log", "info", "warn", "error", "debug", "trace"].forEach(function (level) {
        out[level] = function () {
          sink(level, Array.prototype.map.call(arguments, render).join(" "));
        };
      });
      return out;
    },
    defaultExport: function (exports) {
      if (exports === null || exports === undefined) return undefined;
      var value = exports["default"];
      if (value === null || (typeof value !== "object" && typeof value !== "function")) return undefined;
      return value;
    },
    describe: function (value) {
      return {
        id: typeof value.id === "string" && value.id.length > 0 ? value.id : undefined,
        members: methodNames(value),
        descriptor: toJson(value)
      };
    },
    invoke: function (target, member, argsJson) {
      try {
        var fn = target[member];
        if (typeof fn !== "function") {
          throw new TypeError("'" + member + "' is not a function on this capability");
        }
        var args = argsJson ? JSON.parse(argsJson) : [];
        return settle(fn.apply(target, Array.isArray(args) ? args : [args]));
      } catch (e) {
        return { done: true, value: undefined, error: render(e) };
      }
    },
    settle: settle,
    toJson: toJson
  };
})()"#;

/// How much of the environment a module body is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trust {
    /// Private `globalThis`, strict mode.
    Sandboxed,
    /// Runs directly against the engine global.
    Trusted,
}

const SHARED_PARAMS: &[&str] = &[
    "exports",
    "require",
    "module",
    "__filename",
    "__dirname",
    "console",
    "setTimeout",
    "clearTimeout",
];

/// Wrap a CommonJS body so it can be called with one bindings object.
pub(crate) fn wrap(code: &str, trust: Trust) -> String {
    let mut params: Vec<&str> = SHARED_PARAMS.to_vec();
    let directive = match trust {
        Trust::Sandboxed => {
            params.push("globalThis");
            "\"use strict\";"
        },
        Trust::Trusted => "",
    };
    let args = params
        .iter()
        .map(|p| format!("__scriptor.{p}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "(function (__scriptor) {{\nreturn (function ({}) {{{directive}\n{code}\n}}).call(__scriptor.exports, {args});\n}})",
        params.join(", ")
    )
}

/// The bindings one module body is called with.
pub(crate) struct Sandbox<'js> {
    ctx: Ctx<'js>,
    trust: Trust,
    bindings: Object<'js>,
}

impl<'js> Sandbox<'js> {
    /// Seed `module`, `exports`, `__filename` and `__dirname` from `record`.
    pub(crate) fn new(ctx: &Ctx<'js>, record: &ModuleRecord<'js>, path: &Path, trust: Trust) -> rquickjs::Result<Self> {
        let bindings = Object::new(ctx.clone())?;
        bindings.set("module", record.object().clone())?;
        bindings.set("exports", record.exports()?)?;
        bindings.set("__filename", path.to_string_lossy().into_owned())?;
        bindings.set(
            "__dirname",
            path.parent()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
        )?;
        Ok(Self {
            ctx: ctx.clone(),
            trust,
            bindings,
        })
    }

    pub(crate) fn trust(&self) -> Trust {
        self.trust
    }

    pub(crate) fn bindings(&self) -> &Object<'js> {
        &self.bindings
    }

    pub(crate) fn bind(&self, name: &str, value: impl rquickjs::IntoJs<'js>) -> rquickjs::Result<()> {
        self.bindings.set(name, value)
    }

    /// Evaluate the wrapper and run the body.
    pub(crate) fn run(self, code: &str) -> rquickjs::Result<()> {
        let wrapper: Function<'js> = self.ctx.eval(wrap(code, self.trust))?;
        wrapper.call::<_, ()>((self.bindings,))
    }
}

/// Rust end of a module's `console`: routes each line to `tracing`.
pub(crate) fn console_sink<'js>(ctx: &Ctx<'js>, module: String) -> rquickjs::Result<Function<'js>> {
    Function::new(ctx.clone(), move |level: String, line: String| {
        let module = module.as_str();
        match level.as_str() {
            "error" => error!(target: "scriptor::console", module, "{line}"),
            "warn" => warn!(target: "scriptor::console", module, "{line}"),
            "debug" => debug!(target: "scriptor::console", module, "{line}"),
            "trace" => trace!(target: "scriptor::console", module, "{line}"),
            _ => info!(target: "scriptor::console", module, "{line}"),
        }
    })
}

struct Timer {
    id: u32,
    due: f64,
    callback: Persistent<Function<'static>>,
    args: Vec<Persistent<Value<'static>>>,
}

#[derive(Default)]
struct TimerState {
    now: f64,
    next_id: u32,
    pending: Vec<Timer>,
}

/// Session-wide `setTimeout` queue on a virtual clock.
///
/// Nothing fires while a module body runs. The session fires timers one at
/// a time, earliest due first, once the job queue is empty.
#[derive(Default)]
pub(crate) struct TimerQueue {
    state: RefCell<TimerState>,
}

impl TimerQueue {
    /// Define `setTimeout` and `clearTimeout` on `target`.
    pub(crate) fn install<'js>(self: &Rc<Self>, ctx: &Ctx<'js>, target: &Object<'js>) -> rquickjs::Result<()> {
        let queue = Rc::clone(self);
        target.set(
            "setTimeout",
            Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>, callback: Function<'js>, delay: Opt<f64>, args: Rest<Value<'js>>| {
                    queue.schedule(&ctx, callback, delay.0.unwrap_or(0.0), args.0)
                },
            )?,
        )?;
        let queue = Rc::clone(self);
        target.set(
            "clearTimeout",
            Function::new(ctx.clone(), move |id: Opt<f64>| {
                if let Some(id) = id.0 {
                    queue.cancel(id);
                }
            })?,
        )?;
        Ok(())
    }

    fn schedule<'js>(&self, ctx: &Ctx<'js>, callback: Function<'js>, delay: f64, args: Vec<Value<'js>>) -> u32 {
        let mut state = self.state.borrow_mut();
        state.next_id = state.next_id.saturating_add(1);
        let id = state.next_id;
        let delay = if delay.is_finite() && delay > 0.0 { delay } else { 0.0 };
        let due = state.now + delay;
        state.pending.push(Timer {
            id,
            due,
            callback: Persistent::save(ctx, callback),
            args: args.into_iter().map(|a| Persistent::save(ctx, a)).collect(),
        });
        id
    }

    #[allow(clippy::float_cmp)]
    fn cancel(&self, id: f64) {
        self.state
            .borrow_mut()
            .pending
            .retain(|t| f64::from(t.id) != id);
    }

    /// Number of timers not yet fired.
    pub(crate) fn pending(&self) -> usize {
        self.state.borrow().pending.len()
    }

    /// Fire the earliest timer. Returns `false` when none is pending.
    ///
    /// A callback that throws is logged and otherwise ignored.
    pub(crate) fn fire_next(&self, ctx: &Ctx<'_>) -> rquickjs::Result<bool> {
        let next = {
            let mut state = self.state.borrow_mut();
            let index = state
                .pending
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.due.total_cmp(&b.due).then(a.id.cmp(&b.id)))
                .map(|(i, _)| i);
            let Some(index) = index else {
                return Ok(false);
            };
            let timer = state.pending.remove(index);
            if timer.due > state.now {
                state.now = timer.due;
            }
            timer
        };

        let callback = next.callback.restore(ctx)?;
        let args = next
            .args
            .into_iter()
            .map(|a| a.restore(ctx))
            .collect::<rquickjs::Result<Vec<_>>>()?;
        if let Err(err) = callback.call::<_, ()>((Rest(args),)).catch(ctx) {
            warn!(timer = next.id, error = %err, "timer callback threw");
        }
        Ok(true)
    }

    /// Drop every pending timer. Must run before the runtime is dropped.
    pub(crate) fn clear(&self) {
        self.state.borrow_mut().pending.clear();
    }
}
