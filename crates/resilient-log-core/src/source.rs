//! Persisted-entry source contract.
//!
//! A source is the durable record of every log entry and its sent/unsent
//! state. Delivery code depends only on [`LogSource`]; concrete stores
//! (SQL tables, files, [`MemorySource`](crate::MemorySource)) implement it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::document::LogLevel;
use crate::entry::{Context, EntryId, LogEntry};
use crate::error::SourceResult;

/// Deployment identity stamped onto every document a source creates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Deployment environment, e.g. "production".
    pub environment: String,
    /// Name of the system producing the entries.
    pub origin: String,
}

/// Durable store of log entries with sent/unsent state.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Source name for logging and sweep reports.
    fn name(&self) -> &str;

    /// Persists a new unsent entry.
    ///
    /// Returns `Ok(None)` when the store declines to record the entry
    /// (rate limit, capacity). That is a valid outcome, not a failure.
    async fn create(
        &self,
        level: LogLevel,
        message: &str,
        context: Context,
    ) -> SourceResult<Option<LogEntry>>;

    /// Fetches up to `limit` unsent entries that come strictly after
    /// `after` in the store's paging order.
    ///
    /// The order is store-defined. It must not change while entries are
    /// only being marked sent, so keyset paging keeps a sweep moving
    /// forward between chunks. It must also let entries whose delivery keeps
    /// failing fall behind fresher ones (see [`mark_attempted`]), otherwise
    /// a full batch of failing entries at the front starves the rest.
    ///
    /// [`mark_attempted`]: LogSource::mark_attempted
    async fn fetch_unsent(&self, after: Option<&EntryId>, limit: usize)
        -> SourceResult<Vec<LogEntry>>;

    /// Records successful delivery. Marking an already-sent entry is a no-op.
    ///
    /// The change must be visible to the next `fetch_unsent`.
    async fn mark_sent(&self, id: &EntryId) -> SourceResult<()>;

    /// Records a delivery attempt that did not succeed.
    ///
    /// A sweep calls this for each failed entry once it has finished paging
    /// the source, never under an open cursor. Stores that page in id order
    /// only can keep the default no-op, at the cost of fairness.
    async fn mark_attempted(&self, _id: &EntryId) -> SourceResult<()> {
        Ok(())
    }

    /// Deletes sent entries at least `days_to_keep` days old.
    ///
    /// Unsent entries are never deleted. Returns the number removed.
    async fn clear_sent_entries(&self, days_to_keep: u32) -> SourceResult<u64>;
}

/// One page of unsent entries.
#[derive(Debug, Clone, Default)]
pub struct UnsentChunk {
    pub entries: Vec<LogEntry>,
    /// False once the source has no further unsent entries past this page.
    pub has_more: bool,
}

/// Pages through a source's unsent entries in fixed-size chunks.
///
/// Each cursor is a fresh query of current state; it is not restartable
/// and carries nothing across sweeps.
pub struct UnsentCursor<'a> {
    source: &'a dyn LogSource,
    chunk_size: usize,
    last_id: Option<EntryId>,
    exhausted: bool,
}

impl<'a> UnsentCursor<'a> {
    /// Starts a cursor at the beginning of the source's unsent entries.
    pub fn new(source: &'a dyn LogSource, chunk_size: usize) -> Self {
        Self {
            source,
            chunk_size,
            last_id: None,
            exhausted: chunk_size == 0,
        }
    }

    /// Whether the cursor has returned its final chunk.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetches the next chunk of at most `chunk_size` entries.
    pub async fn next_chunk(&mut self) -> SourceResult<UnsentChunk> {
        self.next_chunk_limited(self.chunk_size).await
    }

    /// Fetches the next chunk, capped at `limit` entries (never more than
    /// the cursor's chunk size).
    pub async fn next_chunk_limited(&mut self, limit: usize) -> SourceResult<UnsentChunk> {
        let limit = limit.min(self.chunk_size);
        if self.exhausted || limit == 0 {
            return Ok(UnsentChunk {
                entries: Vec::new(),
                has_more: !self.exhausted,
            });
        }

        let entries = self
            .source
            .fetch_unsent(self.last_id.as_ref(), limit)
            .await?;

        if let Some(last) = entries.last() {
            self.last_id = Some(last.id.clone());
        }

        let has_more = entries.len() == limit;
        self.exhausted = !has_more;

        Ok(UnsentChunk { entries, has_more })
    }
}
