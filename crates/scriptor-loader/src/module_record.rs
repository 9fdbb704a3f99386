//! Per-file module bookkeeping.

use std::path::Path;

use rquickjs::function::This;
use rquickjs::{Array, Ctx, Function, Object, Value};

use crate::search_roots::SearchRootList;

/// Rust view over a script-side `module` object:
/// `{ id, filename, exports, loaded, parent, children, paths }`.
///
/// The object itself is what code sees as `module`, so anything holding on
/// to `module.exports` shares it by reference.
#[derive(Debug, Clone)]
pub struct ModuleRecord<'js> {
    object: Object<'js>,
}

impl<'js> ModuleRecord<'js> {
    /// Create a record for `path` with empty exports, and append it to the
    /// parent's `children`.
    ///
    /// # Errors
    ///
    /// Returns an engine error if object allocation fails.
    pub fn new(
        ctx: &Ctx<'js>,
        path: &Path,
        parent: Option<&ModuleRecord<'js>>,
        roots: &SearchRootList,
    ) -> rquickjs::Result<Self> {
        let id = path.to_string_lossy().into_owned();
        let object = Object::new(ctx.clone())?;
        object.set("id", id.as_str())?;
        object.set("filename", id.as_str())?;
        object.set("exports", Object::new(ctx.clone())?)?;
        object.set("loaded", false)?;
        object.set("children", Array::new(ctx.clone())?)?;
        object.set("paths", roots.to_strings())?;

        match parent {
            Some(parent) => {
                object.set("parent", parent.object.clone())?;
                let children: Array<'js> = parent.object.get("children")?;
                children.set(children.len(), object.clone())?;
            },
            None => object.set("parent", Value::new_null(ctx.clone()))?,
        }

        Ok(Self { object })
    }

    /// Wrap an existing `module` object.
    #[must_use]
    pub fn from_object(object: Object<'js>) -> Self {
        Self { object }
    }

    /// The `module` object.
    #[must_use]
    pub fn object(&self) -> &Object<'js> {
        &self.object
    }

    /// Current `module.exports`. Code may have replaced it.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the property read throws.
    pub fn exports(&self) -> rquickjs::Result<Value<'js>> {
        self.object.get("exports")
    }

    /// Replace `module.exports`.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the property write throws.
    pub fn set_exports(&self, exports: Value<'js>) -> rquickjs::Result<()> {
        self.object.set("exports", exports)
    }

    /// Mark execution finished.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the property write throws.
    pub fn mark_loaded(&self) -> rquickjs::Result<()> {
        self.object.set("loaded", true)
    }

    /// Whether execution finished.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the property read throws.
    pub fn is_loaded(&self) -> rquickjs::Result<bool> {
        self.object.get("loaded")
    }

    /// Remove this record from its parent's `children`.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the parent's `children` cannot be edited.
    pub fn detach(&self) -> rquickjs::Result<()> {
        let parent: Option<Object<'js>> = self.object.get("parent")?;
        let Some(parent) = parent else {
            return Ok(());
        };
        let children: Array<'js> = parent.get("children")?;
        let index_of: Function<'js> = children.as_object().get("indexOf")?;
        let index: i32 = index_of.call((This(children.clone()), self.object.clone()))?;
        if index >= 0 {
            let splice: Function<'js> = children.as_object().get("splice")?;
            splice.call::<_, Value<'js>>((This(children), index, 1))?;
        }
        Ok(())
    }

    /// `module.id`, the absolute resolved path.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the property read throws.
    pub fn id(&self) -> rquickjs::Result<String> {
        self.object.get("id")
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use rquickjs::{Context, Runtime};

    use super::*;

    #[test]
    fn detach_removes_only_that_child() {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        let roots = SearchRootList::new([PathBuf::from("/deps")]);
        context.with(|ctx| {
            let parent = ModuleRecord::new(&ctx, Path::new("/app/main.js"), None, &roots).unwrap();
            let first = ModuleRecord::new(&ctx, Path::new("/app/a.js"), Some(&parent), &roots).unwrap();
            let second = ModuleRecord::new(&ctx, Path::new("/app/b.js"), Some(&parent), &roots).unwrap();

            first.detach().unwrap();
            let children: Array<'_> = parent.object().get("children").unwrap();
            assert_eq!(children.len(), 1);
            let remaining = ModuleRecord::from_object(children.get(0).unwrap());
            assert_eq!(remaining.id().unwrap(), second.id().unwrap());

            // Detaching twice, or a record without a parent, is a no-op.
            first.detach().unwrap();
            parent.detach().unwrap();
            let children: Array<'_> = parent.object().get("children").unwrap();
            assert_eq!(children.len(), 1);
        });
    }
}
