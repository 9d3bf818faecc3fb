//! Delivery target contract.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::entry::LogEntry;
use crate::error::{ConfigError, ConfigResult, TargetResult};

/// Outcome of one delivery attempt at one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The target stored the entry. `receipt` is the target-side id.
    Created { receipt: String },
    /// The target already held a document with this idempotency key: an
    /// earlier attempt got through. Counts as success.
    AlreadyPresent,
    /// The target could not confirm delivery. The entry will be retried.
    Rejected { reason: String },
}

impl Delivery {
    /// Whether the entry is now known to be at the target.
    pub fn is_success(&self) -> bool {
        !matches!(self, Delivery::Rejected { .. })
    }

    /// Shorthand for a rejection.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Delivery::Rejected {
            reason: reason.into(),
        }
    }
}

/// Options shared by every target kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetOptions {
    /// A required target's failure fails the whole entry.
    pub required: bool,
}

impl Default for TargetOptions {
    fn default() -> Self {
        Self { required: true }
    }
}

impl TargetOptions {
    /// Reads the shared options out of a target descriptor.
    pub fn from_map(options: &Map<String, Value>) -> ConfigResult<Self> {
        let required = match options.get("required") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(required)) => *required,
            Some(_) => return Err(ConfigError::invalid("required", "boolean")),
        };

        Ok(Self { required })
    }
}

/// External system log entries are forwarded to.
///
/// Configuration is fixed at construction. Ordinary delivery failure
/// (network error, unexpected response) is reported as
/// [`Delivery::Rejected`], never as `Err`; `Err` is reserved for
/// programmer or configuration mistakes.
#[async_trait]
pub trait LogTarget: Send + Sync {
    /// Target name for logging and reports.
    fn name(&self) -> &str;

    /// Whether this target's failure fails the entry.
    fn is_required(&self) -> bool;

    /// Attempts to deliver one entry.
    ///
    /// Implementations key the write by [`LogEntry::idempotency_key`] and
    /// map "already exists" to [`Delivery::AlreadyPresent`].
    async fn submit(&self, entry: &LogEntry) -> TargetResult<Delivery>;
}
