//! In-memory source.
//!
//! Keeps entries in an ordered map keyed by an increasing integer id. Unsent
//! entries are indexed by `(failed attempts, id)` and page by that key, the
//! way a table with an index on those two columns would.
//! Useful for tests, embedders without a database, and as the reference
//! behaviour for other [`LogSource`] implementations.

use async_trait::async_trait;
use chrono::Duration;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::{Clock, SystemClock};
use crate::document::{build_audit_document, LogLevel};
use crate::entry::{Context, EntryId, LogEntry};
use crate::error::{SourceError, SourceResult};
use crate::source::{LogSource, SourceConfig};

struct State {
    entries: BTreeMap<i64, LogEntry>,
    /// Failed delivery attempts per id; absent means zero.
    attempts: HashMap<i64, u32>,
    /// Paging index over unsent entries.
    unsent: BTreeSet<(u32, i64)>,
    next_id: i64,
}

impl State {
    fn attempts(&self, key: i64) -> u32 {
        self.attempts.get(&key).copied().unwrap_or(0)
    }
}

/// Source that keeps its entries in process memory.
pub struct MemorySource {
    name: String,
    config: SourceConfig,
    state: Mutex<State>,
    capacity: Option<usize>,
    clock: Arc<dyn Clock>,
}

impl MemorySource {
    /// Creates an empty source.
    pub fn new(name: impl Into<String>, config: SourceConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(State {
                entries: BTreeMap::new(),
                attempts: HashMap::new(),
                unsent: BTreeSet::new(),
                next_id: 1,
            }),
            capacity: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Refuses new entries once `capacity` are stored; `create` then
    /// returns `None`.
    pub fn with_capacity_limit(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Uses `clock` for creation times and purge cutoffs.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Deployment identity stamped on new documents.
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Number of stored entries, sent or not.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stored entries not yet sent.
    pub fn unsent_count(&self) -> usize {
        self.state
            .lock()
            .entries
            .values()
            .filter(|e| !e.sent)
            .count()
    }

    /// Snapshot of every stored entry in id order.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.state.lock().entries.values().cloned().collect()
    }

    /// Failed delivery attempts recorded for `id`.
    pub fn attempts(&self, id: &EntryId) -> u32 {
        int_key(id).map_or(0, |key| self.state.lock().attempts(key))
    }

    /// Snapshot of one entry.
    pub fn get(&self, id: &EntryId) -> Option<LogEntry> {
        let key = int_key(id)?;
        self.state.lock().entries.get(&key).cloned()
    }

    /// Inserts a pre-built entry, e.g. one restored from elsewhere. The id
    /// must be an integer; later `create` calls continue after it.
    pub fn insert(&self, entry: LogEntry) -> SourceResult<()> {
        let key = int_key(&entry.id).ok_or_else(|| {
            SourceError::Storage(format!("memory source needs integer ids, got {}", entry.id))
        })?;

        let mut state = self.state.lock();
        let attempts = state.attempts(key);
        state.unsent.remove(&(attempts, key));
        if !entry.sent {
            state.unsent.insert((attempts, key));
        }
        state.next_id = state.next_id.max(key.saturating_add(1));
        state.entries.insert(key, entry);
        Ok(())
    }
}

fn int_key(id: &EntryId) -> Option<i64> {
    match id {
        EntryId::Int(key) => Some(*key),
        EntryId::Str(_) => None,
    }
}

#[async_trait]
impl LogSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create(
        &self,
        level: LogLevel,
        message: &str,
        context: Context,
    ) -> SourceResult<Option<LogEntry>> {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if let Some(capacity) = self.capacity {
            if state.entries.len() >= capacity {
                debug!(source = %self.name, capacity, "Source at capacity, entry not recorded");
                return Ok(None);
            }
        }

        let key = state.next_id;
        state.next_id += 1;

        let id = EntryId::Int(key);
        let document =
            build_audit_document(id.clone(), level, message, context, &self.config, now)
                .into_document()?;
        let entry = LogEntry::new(id, document, now);
        state.entries.insert(key, entry.clone());
        state.unsent.insert((0, key));

        debug!(source = %self.name, entry_id = key, "Created entry");
        Ok(Some(entry))
    }

    async fn fetch_unsent(
        &self,
        after: Option<&EntryId>,
        limit: usize,
    ) -> SourceResult<Vec<LogEntry>> {
        let state = self.state.lock();

        // The position is rebuilt from the attempt count stored now, which
        // is why attempts are only recorded once a cursor is done.
        let start = match after {
            None => Bound::Unbounded,
            Some(EntryId::Int(key)) => Bound::Excluded((state.attempts(*key), *key)),
            Some(other) => {
                return Err(SourceError::Storage(format!(
                    "memory source needs integer ids, got {}",
                    other
                )))
            }
        };

        Ok(state
            .unsent
            .range((start, Bound::Unbounded))
            .filter_map(|(_, key)| state.entries.get(key))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_sent(&self, id: &EntryId) -> SourceResult<()> {
        let key = int_key(id).ok_or_else(|| SourceError::NotFound(id.to_string()))?;
        let mut state = self.state.lock();
        let attempts = state.attempts(key);
        let entry = state
            .entries
            .get_mut(&key)
            .ok_or_else(|| SourceError::NotFound(id.to_string()))?;
        entry.mark_sent();
        state.unsent.remove(&(attempts, key));
        Ok(())
    }

    async fn mark_attempted(&self, id: &EntryId) -> SourceResult<()> {
        let key = int_key(id).ok_or_else(|| SourceError::NotFound(id.to_string()))?;
        let mut state = self.state.lock();
        let sent = match state.entries.get(&key) {
            Some(entry) => entry.sent,
            None => return Err(SourceError::NotFound(id.to_string())),
        };
        if sent {
            return Ok(());
        }

        let attempts = state.attempts(key);
        let next = attempts.saturating_add(1);
        state.unsent.remove(&(attempts, key));
        state.unsent.insert((next, key));
        state.attempts.insert(key, next);
        Ok(())
    }

    async fn clear_sent_entries(&self, days_to_keep: u32) -> SourceResult<u64> {
        // A window reaching past the earliest representable time keeps everything.
        let cutoff = match Duration::try_days(i64::from(days_to_keep))
            .and_then(|window| self.clock.now().checked_sub_signed(window))
        {
            Some(cutoff) => cutoff,
            None => {
                debug!(source = %self.name, days_to_keep, "Retention window out of range, nothing to clear");
                return Ok(0);
            }
        };

        let mut state = self.state.lock();
        let mut purged = Vec::new();
        state.entries.retain(|key, entry| {
            let purge = entry.sent && entry.created_at <= cutoff;
            if purge {
                purged.push(*key);
            }
            !purge
        });
        for key in &purged {
            state.attempts.remove(key);
        }
        let removed = purged.len() as u64;

        info!(source = %self.name, removed, days_to_keep, "Cleared sent entries");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn source() -> MemorySource {
        MemorySource::new(
            "memory",
            SourceConfig {
                environment: "test".to_string(),
                origin: "unit".to_string(),
            },
        )
    }

    async fn add(source: &MemorySource, n: usize) {
        for i in 0..n {
            let mut context = Context::new();
            context.insert("idx".to_string(), json!(i));
            source.create(LogLevel::Info, "Hello", context).await.unwrap();
        }
    }

    #[tokio::test]
    async fn create_assigns_increasing_ids() {
        let source = source();
        let a = source
            .create(LogLevel::Info, "a", Context::new())
            .await
            .unwrap()
            .unwrap();
        let b = source
            .create(LogLevel::Info, "b", Context::new())
            .await
            .unwrap()
            .unwrap();

        assert!(a.id < b.id);
        assert!(!a.sent);
        assert_eq!(a.document["audit_event"]["message"], json!("a"));
        assert_eq!(a.document["audit_event"]["origin"], json!("unit"));
        assert_eq!(source.len(), 2);
    }

    #[tokio::test]
    async fn capacity_limit_returns_none() {
        let source = source().with_capacity_limit(1);
        assert!(source
            .create(LogLevel::Info, "a", Context::new())
            .await
            .unwrap()
            .is_some());
        assert!(source
            .create(LogLevel::Info, "b", Context::new())
            .await
            .unwrap()
            .is_none());
        assert_eq!(source.len(), 1);
    }

    #[tokio::test]
    async fn fetch_unsent_skips_sent() {
        let source = source();
        add(&source, 4).await;
        source.mark_sent(&EntryId::Int(2)).await.unwrap();

        let unsent = source.fetch_unsent(None, 10).await.unwrap();
        let ids: Vec<_> = unsent.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec![EntryId::Int(1), EntryId::Int(3), EntryId::Int(4)]);

        let after = source.fetch_unsent(Some(&EntryId::Int(3)), 10).await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].id, EntryId::Int(4));
    }

    #[tokio::test]
    async fn failed_entries_page_behind_fresh_ones() {
        let source = source();
        add(&source, 4).await;
        source.mark_attempted(&EntryId::Int(1)).await.unwrap();
        source.mark_attempted(&EntryId::Int(2)).await.unwrap();
        source.mark_attempted(&EntryId::Int(1)).await.unwrap();

        let ids: Vec<_> = source
            .fetch_unsent(None, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(
            ids,
            vec![EntryId::Int(3), EntryId::Int(4), EntryId::Int(2), EntryId::Int(1)]
        );
        assert_eq!(source.attempts(&EntryId::Int(1)), 2);

        // Paging resumes after the given entry in the same order.
        let after = source.fetch_unsent(Some(&EntryId::Int(4)), 10).await.unwrap();
        assert_eq!(after.len(), 2);
        assert_eq!(after[0].id, EntryId::Int(2));
    }

    #[tokio::test]
    async fn mark_attempted_ignores_sent_and_rejects_unknown() {
        let source = source();
        add(&source, 1).await;
        source.mark_sent(&EntryId::Int(1)).await.unwrap();
        source.mark_attempted(&EntryId::Int(1)).await.unwrap();
        assert_eq!(source.attempts(&EntryId::Int(1)), 0);
        assert!(source.fetch_unsent(None, 10).await.unwrap().is_empty());

        let err = source.mark_attempted(&EntryId::Int(7)).await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
    }

    #[tokio::test]
    async fn mark_sent_is_idempotent() {
        let source = source();
        add(&source, 1).await;
        source.mark_sent(&EntryId::Int(1)).await.unwrap();
        source.mark_sent(&EntryId::Int(1)).await.unwrap();
        assert!(source.get(&EntryId::Int(1)).unwrap().sent);
        assert_eq!(source.unsent_count(), 0);
    }

    #[tokio::test]
    async fn mark_sent_unknown_id() {
        let source = source();
        let err = source.mark_sent(&EntryId::Int(99)).await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
        let err = source.mark_sent(&EntryId::from("x")).await.unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
    }

    #[tokio::test]
    async fn purge_boundary_is_inclusive() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        let source = source().with_clock(Arc::new(clock.clone()));

        // id 1: exactly 30 days old at purge time, sent
        add(&source, 1).await;
        // id 2: 30 days minus one second old, sent
        clock.advance(Duration::seconds(1));
        add(&source, 1).await;
        // id 3: old but unsent
        add(&source, 1).await;

        source.mark_sent(&EntryId::Int(1)).await.unwrap();
        source.mark_sent(&EntryId::Int(2)).await.unwrap();

        clock.set(start + Duration::days(30));
        let removed = source.clear_sent_entries(30).await.unwrap();

        assert_eq!(removed, 1);
        assert!(source.get(&EntryId::Int(1)).is_none());
        assert!(source.get(&EntryId::Int(2)).is_some());
        assert!(source.get(&EntryId::Int(3)).is_some());
    }

    #[tokio::test]
    async fn unsent_entries_survive_any_age() {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        let source = source().with_clock(Arc::new(clock.clone()));
        add(&source, 3).await;

        clock.advance(Duration::days(3650));
        assert_eq!(source.clear_sent_entries(0).await.unwrap(), 0);
        assert_eq!(source.len(), 3);
    }

    #[tokio::test]
    async fn huge_retention_keeps_everything() {
        let source = source();
        add(&source, 2).await;
        source.mark_sent(&EntryId::Int(1)).await.unwrap();

        assert_eq!(source.clear_sent_entries(u32::MAX).await.unwrap(), 0);
        assert_eq!(source.len(), 2);
    }

    #[tokio::test]
    async fn insert_continues_id_sequence() {
        let source = source();
        source
            .insert(LogEntry::new(EntryId::Int(10), Default::default(), Utc::now()))
            .unwrap();
        let next = source
            .create(LogLevel::Info, "after", Context::new())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next.id, EntryId::Int(11));

        let err = source
            .insert(LogEntry::new("abc", Default::default(), Utc::now()))
            .unwrap_err();
        assert!(matches!(err, SourceError::Storage(_)));
    }
}
