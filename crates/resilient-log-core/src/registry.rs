//! Component registry.
//!
//! Maps the kind names used in [`LoggerOptions`](crate::LoggerOptions) to
//! factory closures. Populated once at startup, then only read.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::memory::MemorySource;
use crate::options::ComponentDescriptor;
use crate::source::{LogSource, SourceConfig};
use crate::target::LogTarget;

/// Builds a source from the deployment identity and its descriptor options.
pub type SourceFactory =
    Box<dyn Fn(&SourceConfig, &Map<String, Value>) -> ConfigResult<Arc<dyn LogSource>> + Send + Sync>;

/// Builds a target from its descriptor options.
pub type TargetFactory =
    Box<dyn Fn(&Map<String, Value>) -> ConfigResult<Arc<dyn LogTarget>> + Send + Sync>;

/// Kind name of the built-in [`MemorySource`].
pub const MEMORY_SOURCE: &str = "memory";

/// Registry of source and target factories.
#[derive(Default)]
pub struct ComponentRegistry {
    sources: HashMap<String, SourceFactory>,
    targets: HashMap<String, TargetFactory>,
}

impl ComponentRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `memory` source.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_source(MEMORY_SOURCE, memory_source_factory);
        registry
    }

    /// Registers a source factory, replacing any previous one for `kind`.
    pub fn register_source<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&SourceConfig, &Map<String, Value>) -> ConfigResult<Arc<dyn LogSource>>
            + Send
            + Sync
            + 'static,
    {
        let kind = kind.into();
        debug!(kind = %kind, "Registered source factory");
        self.sources.insert(kind, Box::new(factory));
    }

    /// Registers a target factory, replacing any previous one for `kind`.
    pub fn register_target<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&Map<String, Value>) -> ConfigResult<Arc<dyn LogTarget>> + Send + Sync + 'static,
    {
        let kind = kind.into();
        debug!(kind = %kind, "Registered target factory");
        self.targets.insert(kind, Box::new(factory));
    }

    /// Check if a source kind is registered
    pub fn has_source(&self, kind: &str) -> bool {
        self.sources.contains_key(kind)
    }

    /// Check if a target kind is registered
    pub fn has_target(&self, kind: &str) -> bool {
        self.targets.contains_key(kind)
    }

    /// Builds the source a descriptor names.
    pub fn build_source(
        &self,
        descriptor: &ComponentDescriptor,
        config: &SourceConfig,
    ) -> ConfigResult<Arc<dyn LogSource>> {
        let factory = self
            .sources
            .get(&descriptor.kind)
            .ok_or_else(|| ConfigError::UnknownSource(descriptor.kind.clone()))?;
        factory(config, &descriptor.options)
    }

    /// Builds the target a descriptor names.
    pub fn build_target(&self, descriptor: &ComponentDescriptor) -> ConfigResult<Arc<dyn LogTarget>> {
        let factory = self
            .targets
            .get(&descriptor.kind)
            .ok_or_else(|| ConfigError::UnknownTarget(descriptor.kind.clone()))?;
        factory(&descriptor.options)
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sources: Vec<_> = self.sources.keys().collect();
        let mut targets: Vec<_> = self.targets.keys().collect();
        sources.sort();
        targets.sort();
        f.debug_struct("ComponentRegistry")
            .field("sources", &sources)
            .field("targets", &targets)
            .finish()
    }
}

/// Options: `name` (string, default `memory`), `capacity` (integer).
fn memory_source_factory(
    config: &SourceConfig,
    options: &Map<String, Value>,
) -> ConfigResult<Arc<dyn LogSource>> {
    let name = match options.get("name") {
        None => MEMORY_SOURCE,
        Some(Value::String(name)) => name.as_str(),
        Some(_) => return Err(ConfigError::invalid("name", "string")),
    };

    let mut source = MemorySource::new(name, config.clone());
    match options.get("capacity") {
        None | Some(Value::Null) => {}
        Some(value) => {
            let capacity = value
                .as_u64()
                .and_then(|c| usize::try_from(c).ok())
                .ok_or_else(|| ConfigError::invalid("capacity", "non-negative integer"))?;
            source = source.with_capacity_limit(capacity);
        }
    }

    Ok(Arc::new(source))
}
