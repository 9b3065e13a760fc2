//! Adapter registry: resolves an adapter name to a live [`Adapter`]
//! instance, either from a compile-time built-in table or from a
//! caller-registered factory.
//!
//! Resolved through a name-keyed map behind a lock, the same shape used
//! elsewhere in this codebase for runtime-pluggable named implementations.
//! Built-ins are feature-gated at compile time rather than probed at
//! runtime -- the set of available adapters is known statically, and a
//! missing optional dependency is a build-time decision, not a runtime
//! surprise.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use super::Adapter;
use crate::error::AdapterError;

/// Constructs an [`Adapter`] from a JSON configuration object.
pub trait AdapterFactory: Send + Sync {
    fn construct(&self, config: serde_json::Map<String, serde_json::Value>) -> Result<Arc<dyn Adapter>, AdapterError>;
}

impl<F> AdapterFactory for F
where
    F: Fn(serde_json::Map<String, serde_json::Value>) -> Result<Arc<dyn Adapter>, AdapterError>
        + Send
        + Sync,
{
    fn construct(&self, config: serde_json::Map<String, serde_json::Value>) -> Result<Arc<dyn Adapter>, AdapterError> {
        self(config)
    }
}

/// Name-keyed resolver for adapters. Built-ins are compiled in behind
/// Cargo features; custom adapters can be registered at runtime.
pub struct AdapterRegistry {
    custom: RwLock<HashMap<String, Arc<dyn AdapterFactory>>>,
    loaded: RwLock<HashSet<String>>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("custom", &self.custom.read().keys().collect::<Vec<_>>())
            .field("loaded", &self.loaded.read().iter().collect::<Vec<_>>())
            .finish()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            custom: RwLock::new(HashMap::new()),
            loaded: RwLock::new(HashSet::new()),
        }
    }

    /// Register a custom adapter factory under `name`, shadowing any
    /// built-in of the same name.
    pub fn register(&self, name: impl Into<String>, factory: Arc<dyn AdapterFactory>) {
        self.custom.write().insert(name.into(), factory);
    }

    /// Remove a previously registered custom factory.
    pub fn unregister(&self, name: &str) -> bool {
        self.custom.write().remove(name).is_some()
    }

    /// Drop all custom registrations, restoring built-ins-only behavior.
    pub fn clear_custom(&self) {
        self.custom.write().clear();
    }

    /// Construct the adapter named `name` with the given configuration.
    pub fn get(
        &self,
        name: &str,
        config: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Arc<dyn Adapter>, AdapterError> {
        let result = if let Some(factory) = self.custom.read().get(name) {
            factory.construct(config)
        } else {
            super::builtin::construct(name, config).ok_or_else(|| AdapterError::NotFound {
                name: name.to_string(),
                available: self.list(),
            })
        };

        if result.is_ok() {
            self.loaded.write().insert(name.to_string());
        }
        result
    }

    /// Every adapter name currently resolvable, built-in plus custom.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = super::builtin::names().iter().map(|s| s.to_string()).collect();
        names.extend(self.custom.read().keys().cloned());
        names.sort();
        names.dedup();
        names
    }

    /// Drop a built-in from future resolution by shadowing it with an
    /// always-failing factory -- built-ins themselves are compiled in and
    /// can't be un-registered, but this lets callers simulate "not loaded".
    pub fn unload_builtin(&self, name: &str) {
        let owned_name = name.to_string();
        self.custom.write().insert(
            owned_name.clone(),
            Arc::new(move |_config: serde_json::Map<String, serde_json::Value>| {
                Err(AdapterError::NotFound {
                    name: owned_name.clone(),
                    available: Vec::new(),
                })
            }) as Arc<dyn AdapterFactory>,
        );
        self.loaded.write().remove(name);
    }

    /// Per-name status: whether `name` resolves at all (`available`),
    /// whether it's been constructed at least once via `get` (`loaded`),
    /// which kind backs it, and a human-readable description.
    pub fn describe(&self, name: &str) -> AdapterDescription {
        let is_custom = self.custom.read().contains_key(name);
        let is_builtin = super::builtin::names().contains(&name);
        let kind = if is_custom {
            AdapterKind::Custom
        } else if is_builtin {
            AdapterKind::Builtin
        } else {
            AdapterKind::Unknown
        };

        AdapterDescription {
            name: name.to_string(),
            kind,
            loaded: self.loaded.read().contains(name),
            available: is_custom || is_builtin,
            description: describe_text(kind, name),
        }
    }
}

/// Which table backs an adapter name, as reported by [`AdapterRegistry::describe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    Builtin,
    Custom,
    Unknown,
}

/// Per-name registry status returned by [`AdapterRegistry::describe`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterDescription {
    pub name: String,
    pub kind: AdapterKind,
    pub loaded: bool,
    pub available: bool,
    pub description: String,
}

fn describe_text(kind: AdapterKind, name: &str) -> String {
    match kind {
        AdapterKind::Builtin => format!("built-in adapter '{name}', backed by genai::Client"),
        AdapterKind::Custom => format!("custom adapter '{name}', registered at runtime"),
        AdapterKind::Unknown => format!("no adapter registered under '{name}'"),
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static REGISTRY: OnceLock<AdapterRegistry> = OnceLock::new();

/// The process-wide adapter registry. Tests that need isolation should
/// construct their own [`AdapterRegistry`] instead of using this.
pub fn global() -> &'static AdapterRegistry {
    REGISTRY.get_or_init(AdapterRegistry::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::test_support::StaticAdapter;
    use serial_test::serial;

    #[test]
    fn unknown_name_lists_available() {
        let registry = AdapterRegistry::new();
        let err = registry.get("nonexistent", Default::default()).unwrap_err();
        match err {
            AdapterError::NotFound { available, .. } => {
                assert_eq!(available, registry.list());
            }
            _ => panic!("expected NotFound"),
        }
    }

    #[test]
    fn custom_registration_shadows_and_unregisters() {
        let registry = AdapterRegistry::new();
        registry.register(
            "custom",
            Arc::new(|_config: serde_json::Map<String, serde_json::Value>| {
                Ok(Arc::new(StaticAdapter) as Arc<dyn Adapter>)
            }),
        );
        assert!(registry.list().contains(&"custom".to_string()));
        assert!(registry.get("custom", Default::default()).is_ok());

        assert!(registry.unregister("custom"));
        assert!(registry.get("custom", Default::default()).is_err());
    }

    #[test]
    fn describe_reports_loaded_only_after_a_successful_get() {
        let registry = AdapterRegistry::new();
        registry.register(
            "custom",
            Arc::new(|_config: serde_json::Map<String, serde_json::Value>| {
                Ok(Arc::new(StaticAdapter) as Arc<dyn Adapter>)
            }),
        );

        let before = registry.describe("custom");
        assert!(!before.loaded);
        assert!(before.available);
        assert!(matches!(before.kind, AdapterKind::Custom));

        registry.get("custom", Default::default()).unwrap();

        let after = registry.describe("custom");
        assert!(after.loaded);
    }

    #[test]
    fn describe_unknown_name_is_unavailable_and_unloaded() {
        let registry = AdapterRegistry::new();
        let description = registry.describe("does-not-exist");
        assert!(!description.available);
        assert!(!description.loaded);
        assert!(matches!(description.kind, AdapterKind::Unknown));
    }

    #[test]
    #[serial]
    fn global_registry_is_shared_and_independent_of_local_instances() {
        let local = AdapterRegistry::new();
        local.register(
            "only-local",
            Arc::new(|_config: serde_json::Map<String, serde_json::Value>| {
                Ok(Arc::new(StaticAdapter) as Arc<dyn Adapter>)
            }),
        );
        assert!(global().get("only-local", Default::default()).is_err());
        global().clear_custom();
    }
}
