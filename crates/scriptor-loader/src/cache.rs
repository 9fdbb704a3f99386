//! Session-wide module cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rquickjs::{Ctx, Object, Persistent};

use crate::module_record::ModuleRecord;

/// Resolved absolute path → module record, for one loader session.
///
/// The cache holds the whole record so a lookup always yields the current
/// `module.exports`, including a partially populated one while the module is
/// still executing. Entries are only added if absent and only removed when
/// the module's own execution failed. There is no invalidation when the
/// file changes on disk.
#[derive(Default)]
pub struct DependencyCache {
    records: HashMap<PathBuf, Persistent<Object<'static>>>,
}

impl DependencyCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a record.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the record belongs to another runtime.
    pub fn get<'js>(&self, ctx: &Ctx<'js>, path: &Path) -> rquickjs::Result<Option<ModuleRecord<'js>>> {
        self.records
            .get(path)
            .map(|saved| saved.clone().restore(ctx).map(ModuleRecord::from_object))
            .transpose()
    }

    /// Store `record` unless `path` is already present. Returns whether it
    /// was inserted.
    pub fn insert_if_absent<'js>(&mut self, ctx: &Ctx<'js>, path: &Path, record: &ModuleRecord<'js>) -> bool {
        if self.records.contains_key(path) {
            return false;
        }
        self.records
            .insert(path.to_path_buf(), Persistent::save(ctx, record.object().clone()));
        true
    }

    /// Drop a record so the next load starts from scratch.
    pub fn remove(&mut self, path: &Path) -> bool {
        self.records.remove(path).is_some()
    }

    /// Whether `path` has a record.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.records.contains_key(path)
    }

    /// Number of cached modules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Release every record. Must run before the owning runtime is dropped.
    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }
}

impl std::fmt::Debug for DependencyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyCache")
            .field("paths", &self.records.keys().collect::<Vec<_>>())
            .finish()
    }
}
