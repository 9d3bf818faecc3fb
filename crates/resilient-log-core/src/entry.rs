//! Persisted log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::hasher::content_hash;

/// Structured payload handed to delivery targets.
pub type Document = Map<String, Value>;

/// Free-form fields supplied with a log call.
pub type Context = Map<String, Value>;

/// Identifier assigned by a source when an entry is created.
///
/// Ordered so that sources can page through unsent entries by key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryId {
    /// Integer key (e.g. an autoincrement row id).
    Int(i64),
    /// String key (e.g. a ULID or UUID).
    Str(String),
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryId::Int(id) => write!(f, "{}", id),
            EntryId::Str(id) => f.write_str(id),
        }
    }
}

impl From<i64> for EntryId {
    fn from(id: i64) -> Self {
        EntryId::Int(id)
    }
}

impl From<&str> for EntryId {
    fn from(id: &str) -> Self {
        EntryId::Str(id.to_string())
    }
}

impl From<String> for EntryId {
    fn from(id: String) -> Self {
        EntryId::Str(id)
    }
}

/// A log entry as read from a source.
///
/// The document is fixed at creation; only `sent` ever changes, and only
/// from false to true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Unique identifier within the owning source.
    pub id: EntryId,
    /// Fully formed payload to deliver.
    pub document: Document,
    /// Whether every required target has confirmed delivery.
    pub sent: bool,
    /// Creation time, used by age-based purge.
    pub created_at: DateTime<Utc>,
}

impl LogEntry {
    /// Creates an unsent entry.
    pub fn new(id: impl Into<EntryId>, document: Document, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            document,
            sent: false,
            created_at,
        }
    }

    /// Whether the entry has been delivered.
    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Marks the entry delivered. Calling it again is a no-op.
    pub fn mark_sent(&mut self) {
        self.sent = true;
    }

    /// Content hash of the document, used as the write key at targets.
    pub fn idempotency_key(&self) -> Result<String, serde_json::Error> {
        content_hash(&self.document)
    }
}
