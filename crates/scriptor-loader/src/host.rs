//! The privileged host API object.
//!
//! Whatever the embedder installs here is what scripts get from
//! `require("scriptor")`. The object is built once per session and every
//! requirer receives the same instance.

use std::cell::RefCell;
use std::rc::Rc;

use rquickjs::convert::Coerced;
use rquickjs::{Ctx, Function, Object};
use tracing::info;

/// Populates the host API object for a session.
pub trait HostApi {
    /// Install members onto `api`. Called exactly once per session.
    ///
    /// # Errors
    ///
    /// Returns an engine error if a property cannot be defined.
    fn install<'js>(&self, ctx: &Ctx<'js>, api: &Object<'js>) -> rquickjs::Result<()>;
}

/// Minimal host API: `version`, `log(message)` and
/// `registerCommand(id, handler)`.
///
/// Registered command ids are recorded on the Rust side. The handlers stay
/// in the script runtime.
#[derive(Debug, Default, Clone)]
pub struct DefaultHostApi {
    commands: Rc<RefCell<Vec<String>>>,
}

impl DefaultHostApi {
    /// Create a host API with no commands recorded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Command ids registered so far, in registration order.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }
}

impl HostApi for DefaultHostApi {
    fn install<'js>(&self, ctx: &Ctx<'js>, api: &Object<'js>) -> rquickjs::Result<()> {
        api.set("version", env!("CARGO_PKG_VERSION"))?;
        api.set(
            "log",
            Function::new(ctx.clone(), |message: Coerced<String>| {
                info!(target: "scriptor::host", "{}", message.0);
            })?,
        )?;

        let commands = Rc::clone(&self.commands);
        api.set(
            "registerCommand",
            Function::new(ctx.clone(), move |id: String, _handler: Function<'js>| {
                commands.borrow_mut().push(id);
            })?,
        )?;
        Ok(())
    }
}
