//! Filter plugin interface
//!
//! Filter plugins are opaque modules supplied by a loader. The dispatcher
//! drives them through the same four entry points the data-path services
//! use: init, ingest, shutdown and reconfigure. The loader itself sits
//! behind a trait so deployments can wire in their own plugin mechanism;
//! the built-in [`PluginRegistry`] resolves plugins from factories
//! registered at startup.

use courier_core::domain::Reading;
use courier_core::dto::registry::Category;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// A loaded filter plugin instance
pub trait FilterPlugin: Send {
    /// Default configuration items this plugin contributes to its category
    fn default_config(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Wire the plugin with its merged configuration category.
    ///
    /// The filter API requires `shutdown` before a live plugin is
    /// re-initialised.
    fn init(&mut self, config: &Category) -> anyhow::Result<()>;

    /// Run a reading set through the filter, returning the onward set.
    /// Returning an empty set consumes the readings.
    fn ingest(&mut self, readings: Vec<Reading>) -> Vec<Reading>;

    /// Apply a configuration change delivered while the plugin is live
    fn reconfigure(&mut self, config: &serde_json::Value);

    /// Release plugin resources; called before rewiring and at teardown
    fn shutdown(&mut self);
}

/// Produces filter plugin instances by name
pub trait PluginLoader: Send + Sync {
    fn load(&self, plugin: &str) -> anyhow::Result<Box<dyn FilterPlugin>>;
}

pub type PluginFactory = Arc<dyn Fn() -> Box<dyn FilterPlugin> + Send + Sync>;

/// Registry-backed loader: plugin factories are registered by name
#[derive(Default)]
pub struct PluginRegistry {
    factories: RwLock<HashMap<String, PluginFactory>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: impl Into<String>, factory: PluginFactory) {
        self.factories
            .write()
            .expect("plugin registry lock poisoned")
            .insert(name.into(), factory);
    }
}

impl PluginLoader for PluginRegistry {
    fn load(&self, plugin: &str) -> anyhow::Result<Box<dyn FilterPlugin>> {
        let factories = self
            .factories
            .read()
            .expect("plugin registry lock poisoned");
        match factories.get(plugin) {
            Some(factory) => Ok(factory()),
            None => anyhow::bail!("Cannot load filter plugin '{}'", plugin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::domain::Reading;

    struct NopFilter;

    impl FilterPlugin for NopFilter {
        fn init(&mut self, _config: &Category) -> anyhow::Result<()> {
            Ok(())
        }

        fn ingest(&mut self, readings: Vec<Reading>) -> Vec<Reading> {
            readings
        }

        fn reconfigure(&mut self, _config: &serde_json::Value) {}

        fn shutdown(&mut self) {}
    }

    #[test]
    fn test_registry_resolves_registered_plugins() {
        let registry = PluginRegistry::new();
        registry.register("nop", Arc::new(|| Box::new(NopFilter)));
        assert!(registry.load("nop").is_ok());
        assert!(registry.load("missing").is_err());
    }
}
