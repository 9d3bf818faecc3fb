//! Error types for log delivery.
//!
//! Ordinary delivery failure is not an error here: a target that could not
//! confirm delivery reports [`Delivery::Rejected`](crate::Delivery::Rejected).
//! The enums below cover configuration, storage and programmer errors.

use thiserror::Error;

/// Configuration error, fatal at startup and never retried.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required option was not provided
    #[error("Configuration error: '{0}' is missing")]
    MissingOption(String),

    /// An option was provided but has the wrong shape or value
    #[error("Configuration error: '{key}' must be a {expected}")]
    InvalidOption {
        /// Option key as it appears in the configuration mapping.
        key: String,
        /// Human readable description of the accepted values.
        expected: String,
    },

    /// No factory is registered for a source kind
    #[error("Configuration error: unknown source type '{0}'")]
    UnknownSource(String),

    /// No factory is registered for a target kind
    #[error("Configuration error: unknown target type '{0}'")]
    UnknownTarget(String),

    /// A registered factory refused its options
    #[error("Configuration error: {0}")]
    Component(String),

    /// IO error while reading an options file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while parsing options
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidOption`].
    pub fn invalid(key: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::InvalidOption {
            key: key.into(),
            expected: expected.into(),
        }
    }
}

/// Result type alias using ConfigError.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Persisted-entry store error.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Backing store failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Entry id is unknown to the store
    #[error("Entry not found: {0}")]
    NotFound(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using SourceError.
pub type SourceResult<T> = Result<T, SourceError>;

/// Unexpected failure inside a delivery target.
///
/// Targets return this only for programmer or configuration mistakes; the
/// fan-out logs it and treats the delivery as failed.
#[derive(Error, Debug)]
pub enum TargetError {
    /// Target configuration is unusable
    #[error("Target configuration error: {0}")]
    Config(String),

    /// Entry document could not be serialized
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Any other unexpected failure
    #[error("Target failure: {0}")]
    Other(String),
}

/// Result type alias using TargetError.
pub type TargetResult<T> = Result<T, TargetError>;

/// A log call lacks context fields declared mandatory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Log entry is missing required context entries: [{}]", .fields.join(","))]
pub struct MissingContextError {
    /// Every required key absent from the context, in declaration order.
    pub fields: Vec<String>,
}

/// Top-level error returned by submitter and logger operations.
#[derive(Error, Debug)]
pub enum LogError {
    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Missing required context
    #[error(transparent)]
    MissingContext(#[from] MissingContextError),

    /// Source error
    #[error("Source error: {0}")]
    Source(#[from] SourceError),
}

/// Result type alias using LogError.
pub type LogResult<T> = Result<T, LogError>;
