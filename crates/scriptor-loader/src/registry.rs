//! Capability registry.
//!
//! The orchestrator hands every successfully loaded default export to an
//! injected [`CapabilityRegistry`]. [`InMemoryRegistry`] is the stock one.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use crate::error::{LoaderError, LoaderResult};

/// A registered capability: the default export of one script file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Capability {
    /// The export's `id` string, or the file stem when it has none.
    pub id: String,
    /// Absolute path of the source script.
    pub source: PathBuf,
    /// Own enumerable keys and methods, then inherited methods.
    pub members: Vec<String>,
    /// JSON snapshot of the export's data properties.
    pub descriptor: serde_json::Value,
}

/// Sink for loaded capabilities.
pub trait CapabilityRegistry {
    /// Register one capability.
    ///
    /// # Errors
    ///
    /// Implementations reject capabilities they cannot accept, for example
    /// a duplicate id.
    fn register(&mut self, capability: Capability) -> LoaderResult<()>;
}

/// Registry keeping capabilities in registration order.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    capabilities: Vec<Capability>,
    by_id: HashMap<String, usize>,
}

impl InMemoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a capability by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Capability> {
        self.by_id.get(id).and_then(|&i| self.capabilities.get(i))
    }

    /// All capabilities, in registration order.
    #[must_use]
    pub fn list(&self) -> &[Capability] {
        &self.capabilities
    }

    /// Number of registered capabilities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl CapabilityRegistry for InMemoryRegistry {
    fn register(&mut self, capability: Capability) -> LoaderResult<()> {
        if self.by_id.contains_key(&capability.id) {
            return Err(LoaderError::DuplicateCapability(capability.id));
        }
        info!(
            capability = %capability.id,
            source = %capability.source.display(),
            members = capability.members.len(),
            "Registered capability"
        );
        self.by_id
            .insert(capability.id.clone(), self.capabilities.len());
        self.capabilities.push(capability);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capability(id: &str) -> Capability {
        Capability {
            id: id.to_owned(),
            source: PathBuf::from(format!("/ws/.scriptor/{id}.ts")),
            members: vec!["run".to_owned()],
            descriptor: serde_json::json!({ "id": id }),
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = InMemoryRegistry::new();
        assert!(registry.is_empty());
        registry.register(capability("alpha")).unwrap();
        registry.register(capability("beta")).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("beta").unwrap().members, vec!["run"]);
        let ids: Vec<_> = registry.list().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["alpha", "beta"]);
        assert!(registry.get("gamma").is_none());
    }

    #[test]
    fn duplicate_id_rejected() {
        let mut registry = InMemoryRegistry::new();
        registry.register(capability("alpha")).unwrap();
        let err = registry.register(capability("alpha")).unwrap_err();
        assert!(matches!(err, LoaderError::DuplicateCapability(ref id) if id == "alpha"));
        assert_eq!(registry.len(), 1);
    }
}
