//! Single-source submitter.
//!
//! Binds one [`LogSource`] to a set of targets: creates and immediately
//! delivers new entries, re-delivers unsent ones in bounded sweeps, purges
//! old sent ones, and reports when the next sweep or purge is due.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::document::{assert_required_context, LogLevel};
use crate::entry::Context;
use crate::error::{ConfigError, ConfigResult, LogResult};
use crate::fanout::TargetSet;
use crate::observer::{DeliveryObserver, NoopObserver};
use crate::schedule::Schedule;
use crate::source::LogSource;
use crate::sweep::{
    deliver_and_mark, record_attempts, run_sweep, Submission, SweepLimits, SweepReport,
};
use crate::target::LogTarget;

/// Default maximum entries attempted per sweep.
pub const DEFAULT_BATCH_LIMIT: usize = 5000;

/// Default entries fetched per source query.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default retention for sent entries, in days.
pub const DEFAULT_STORE_OLD_ENTRIES_DAYS: u32 = 30;

/// Default delay before the next sweep.
pub const DEFAULT_NEXT_SUBMIT: &str = "+15min";

/// Default time of the next purge.
pub const DEFAULT_NEXT_CLEAR: &str = "first day of next month midnight";

/// Submitter limits, retention and scheduling hints.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitterOptions {
    /// Maximum entries attempted per sweep (attempts, not successes).
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,
    /// Entries fetched per source query.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Sent entries at least this many days old are purged.
    #[serde(default = "default_store_old_entries_days")]
    pub store_old_entries_days: u32,
    /// When the next sweep is due; `None` disables the hint.
    #[serde(default = "default_next_submit")]
    pub next_submit: Option<Schedule>,
    /// When the next purge is due; `None` disables the hint.
    #[serde(default = "default_next_clear")]
    pub next_clear: Option<Schedule>,
    /// Context keys every log call must carry.
    #[serde(default)]
    pub required_context: Vec<String>,
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

fn default_next_submit() -> Option<Schedule> {
    DEFAULT_NEXT_SUBMIT.parse().ok()
}

fn default_next_clear() -> Option<Schedule> {
    DEFAULT_NEXT_CLEAR.parse().ok()
}

impl Default for SubmitterOptions {
    fn default() -> Self {
        Self {
            batch_limit: DEFAULT_BATCH_LIMIT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            store_old_entries_days: DEFAULT_STORE_OLD_ENTRIES_DAYS,
            next_submit: default_next_submit(),
            next_clear: default_next_clear(),
            required_context: Vec::new(),
        }
    }
}

/// Delivers the entries of one source to a set of targets.
pub struct Submitter {
    source: Arc<dyn LogSource>,
    targets: TargetSet,
    options: SubmitterOptions,
    observer: Arc<dyn DeliveryObserver>,
}

impl Submitter {
    /// Creates a submitter.
    ///
    /// Fails when `targets` is empty or `chunk_size` is zero.
    pub fn new(
        source: Arc<dyn LogSource>,
        targets: Vec<Arc<dyn LogTarget>>,
        options: SubmitterOptions,
    ) -> ConfigResult<Self> {
        if targets.is_empty() {
            return Err(ConfigError::invalid("targets", "non-empty array"));
        }
        if options.chunk_size == 0 {
            return Err(ConfigError::invalid("chunk_size", "positive integer"));
        }

        Ok(Self {
            source,
            targets: TargetSet::new(targets),
            options,
            observer: Arc::new(NoopObserver),
        })
    }

    /// Replaces the default no-op observer.
    pub fn with_observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// The bound source.
    pub fn source(&self) -> &Arc<dyn LogSource> {
        &self.source
    }

    /// Effective options.
    pub fn options(&self) -> &SubmitterOptions {
        &self.options
    }

    /// Creates an entry and delivers it right away.
    ///
    /// Returns `Ok(None)` when the source declined to create the entry.
    /// A failed delivery is not an error: the entry stays unsent and the
    /// next sweep retries it.
    pub async fn submit(
        &self,
        level: LogLevel,
        message: &str,
        context: Context,
    ) -> LogResult<Option<Submission>> {
        assert_required_context(&context, &self.options.required_context)?;

        let entry = match self.source.create(level, message, context).await? {
            Some(entry) => entry,
            None => {
                debug!(source = self.source.name(), "Entry creation declined by source");
                return Ok(None);
            }
        };

        let submission =
            deliver_and_mark(self.source.as_ref(), &self.targets, &entry, self.observer.as_ref())
                .await;
        if !submission.delivered {
            record_attempts(self.source.as_ref(), std::slice::from_ref(&submission.id)).await;
        }
        Ok(Some(submission))
    }

    /// Re-delivers unsent entries, attempting at most `batch_limit`.
    pub async fn submit_unsent_entries(&self) -> SweepReport {
        let sources = [self.source.clone()];
        run_sweep(
            &sources,
            &self.targets,
            SweepLimits {
                batch_limit: self.options.batch_limit,
                chunk_size: self.options.chunk_size,
            },
            self.observer.as_ref(),
        )
        .await
    }

    /// Purges sent entries older than the retention window.
    pub async fn clear_sent_entries(&self) -> LogResult<u64> {
        let removed = self
            .source
            .clear_sent_entries(self.options.store_old_entries_days)
            .await?;

        info!(
            source = self.source.name(),
            removed,
            days_to_keep = self.options.store_old_entries_days,
            "Purged sent entries"
        );
        self.observer.purge_completed(self.source.name(), removed);
        Ok(removed)
    }

    /// When the next sweep is due, relative to `now`.
    pub fn next_submit_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.options.next_submit.and_then(|s| s.next_after(now))
    }

    /// When the next purge is due, relative to `now`.
    pub fn next_clear_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.options.next_clear.and_then(|s| s.next_after(now))
    }
}
