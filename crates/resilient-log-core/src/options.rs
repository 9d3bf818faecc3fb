//! Logger configuration.
//!
//! Options are a JSON mapping: unknown keys are ignored, missing keys fall
//! back to defaults, and `sources` / `targets` are mandatory.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::source::SourceConfig;
use crate::submitter::{DEFAULT_BATCH_LIMIT, DEFAULT_CHUNK_SIZE, DEFAULT_STORE_OLD_ENTRIES_DAYS};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable overriding `log_level`.
pub const LOG_LEVEL_ENV: &str = "RESILIENT_LOG_LEVEL";

/// A configured source or target: its kind plus kind-specific options.
///
/// Accepts either a bare kind string (`"memory"`) or a mapping
/// `{ "type": "elasticsearch", "es_index": "audit", ... }`; `class` is read
/// as an alias of `type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawDescriptor")]
pub struct ComponentDescriptor {
    pub kind: String,
    pub options: Map<String, Value>,
}

impl ComponentDescriptor {
    /// Descriptor with no options.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            options: Map::new(),
        }
    }

    /// Adds one option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDescriptor {
    Kind(String),
    Full {
        #[serde(rename = "type", alias = "class")]
        kind: String,
        #[serde(flatten)]
        options: Map<String, Value>,
    },
}

impl From<RawDescriptor> for ComponentDescriptor {
    fn from(raw: RawDescriptor) -> Self {
        match raw {
            RawDescriptor::Kind(kind) => Self::new(kind),
            RawDescriptor::Full { kind, options } => Self { kind, options },
        }
    }
}

/// Logger options.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggerOptions {
    /// Sources swept in order.
    pub sources: Vec<ComponentDescriptor>,
    /// Targets every entry is fanned out to, in order.
    pub targets: Vec<ComponentDescriptor>,
    /// Deployment environment stamped on new documents.
    #[serde(default)]
    pub environment: String,
    /// Producing application stamped on new documents.
    #[serde(default)]
    pub origin: String,
    /// Maximum entries attempted per sweep, across all sources.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    /// Entries fetched per source query.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Retention window for sent entries, in days.
    #[serde(default = "default_store_old_entries_days")]
    pub store_old_entries_days: u32,
    /// Whether maintenance runs the sweep.
    #[serde(default)]
    pub submit_unsent_entries: bool,
    /// Whether maintenance runs the purge.
    #[serde(default)]
    pub clear_sent_entries: bool,
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_batch_limit() -> usize {
    DEFAULT_BATCH_LIMIT
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_store_old_entries_days() -> u32 {
    DEFAULT_STORE_OLD_ENTRIES_DAYS
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl LoggerOptions {
    /// Options with the given components and every default.
    pub fn new(sources: Vec<ComponentDescriptor>, targets: Vec<ComponentDescriptor>) -> Self {
        Self {
            sources,
            targets,
            environment: String::new(),
            origin: String::new(),
            batch_limit: DEFAULT_BATCH_LIMIT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            store_old_entries_days: DEFAULT_STORE_OLD_ENTRIES_DAYS,
            submit_unsent_entries: false,
            clear_sent_entries: false,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }

    /// Parses and validates an options mapping.
    pub fn from_value(value: Value) -> ConfigResult<Self> {
        let map = value
            .as_object()
            .ok_or_else(|| ConfigError::invalid("options", "mapping"))?;
        for key in ["sources", "targets"] {
            if !map.contains_key(key) {
                return Err(ConfigError::MissingOption(key.to_string()));
            }
        }

        let options: LoggerOptions = serde_json::from_value(value)?;
        options.validate()?;
        Ok(options)
    }

    /// Loads options from a JSON file, then applies environment overrides.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&content)?;
        let mut options = Self::from_value(value)?;
        options.load_from_env();
        Ok(options)
    }

    /// Overrides options from environment variables. Only `log_level` can
    /// be overridden.
    pub fn load_from_env(&mut self) {
        if let Ok(level) = std::env::var(LOG_LEVEL_ENV) {
            self.log_level = level;
        }
    }

    /// Checks the constraints serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.sources.is_empty() {
            return Err(ConfigError::invalid("sources", "non-empty array"));
        }
        if self.targets.is_empty() {
            return Err(ConfigError::invalid("targets", "non-empty array"));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::invalid("chunk_size", "positive integer"));
        }
        Ok(())
    }

    /// Identity handed to every source factory.
    pub fn source_config(&self) -> SourceConfig {
        SourceConfig {
            environment: self.environment.clone(),
            origin: self.origin.clone(),
        }
    }
}
