//! Explicit adapter registry.
//!
//! Adapters register a descriptor and a factory at process start; instance
//! loading resolves module names against this table instead of loading code
//! by path at runtime.

use std::collections::HashMap;

use serde::Serialize;

use crate::plugin::ServicePlugin;

/// Discovery metadata for one installable adapter.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterDescriptor {
    pub module_name: String,
    pub display_name: String,
    /// JSON schema-shaped description of the adapter's config, consumed by
    /// the control surface when prompting for instance configuration.
    pub config_schema: serde_json::Value,
}

type Factory = Box<dyn Fn() -> Box<dyn ServicePlugin> + Send + Sync>;

struct AdapterEntry {
    descriptor: AdapterDescriptor,
    factory: Factory,
}

/// Registry of all compiled-in adapter implementations.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, AdapterEntry>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, descriptor: AdapterDescriptor, factory: F)
    where
        F: Fn() -> Box<dyn ServicePlugin> + Send + Sync + 'static,
    {
        self.adapters.insert(
            descriptor.module_name.clone(),
            AdapterEntry {
                descriptor,
                factory: Box::new(factory),
            },
        );
    }

    /// Pure discovery: descriptors of every registered adapter.
    pub fn descriptors(&self) -> Vec<&AdapterDescriptor> {
        let mut list: Vec<_> = self.adapters.values().map(|e| &e.descriptor).collect();
        list.sort_by(|a, b| a.module_name.cmp(&b.module_name));
        list
    }

    pub fn contains(&self, module_name: &str) -> bool {
        self.adapters.contains_key(module_name)
    }

    /// Instantiate a fresh adapter for the given module, or `None` when no
    /// such module is registered.
    pub fn build(&self, module_name: &str) -> Option<Box<dyn ServicePlugin>> {
        self.adapters.get(module_name).map(|e| (e.factory)())
    }
}
