//! Bounded re-delivery pass over unsent entries.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::entry::{EntryId, LogEntry};
use crate::fanout::{FanoutReport, TargetSet};
use crate::observer::DeliveryObserver;
use crate::source::{LogSource, UnsentCursor};

/// Outcome for one attempted entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryOutcome {
    /// Name of the source the entry came from.
    pub source: String,
    pub id: EntryId,
    /// True iff delivered to every required target and marked sent.
    pub delivered: bool,
}

/// A source whose fetch failed mid-sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

/// Summary of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Every attempted entry, in attempt order.
    pub outcomes: Vec<EntryOutcome>,
    /// Sources that could not be read.
    pub source_failures: Vec<SourceFailure>,
    /// True when the batch limit stopped the sweep with entries left
    /// unattempted: the current source had more unsent entries, or later
    /// sources were never visited.
    pub limit_reached: bool,
}

impl SweepReport {
    /// Number of entries attempted.
    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    /// Number of entries delivered and marked sent.
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| o.delivered).count()
    }

    /// Number of entries left unsent.
    pub fn failed(&self) -> usize {
        self.attempted() - self.delivered()
    }

    /// Outcome of the first attempted entry with `id`.
    pub fn outcome(&self, id: &EntryId) -> Option<bool> {
        self.outcomes
            .iter()
            .find(|o| &o.id == id)
            .map(|o| o.delivered)
    }

    /// Entry id to delivery outcome.
    ///
    /// Ids are only unique per source; if two sources share an id the later
    /// attempt wins.
    pub fn to_map(&self) -> HashMap<EntryId, bool> {
        self.outcomes
            .iter()
            .map(|o| (o.id.clone(), o.delivered))
            .collect()
    }
}

/// Sweep limits.
#[derive(Debug, Clone, Copy)]
pub struct SweepLimits {
    /// Maximum entries attempted per sweep, across all sources.
    pub batch_limit: usize,
    /// Entries fetched per source query.
    pub chunk_size: usize,
}

/// Result of delivering a single entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub id: EntryId,
    /// True iff delivered to every required target and marked sent.
    pub delivered: bool,
    /// Per-target detail.
    pub fanout: FanoutReport,
}

/// Delivers one entry and marks it sent on success.
///
/// A failed `mark_sent` leaves the entry unsent and the submission is
/// reported as not delivered; the next sweep re-delivers it, which the
/// idempotency key makes harmless.
pub(crate) async fn deliver_and_mark(
    source: &dyn LogSource,
    targets: &TargetSet,
    entry: &LogEntry,
    observer: &dyn DeliveryObserver,
) -> Submission {
    let fanout = targets.deliver(entry, observer).await;
    let mut delivered = fanout.delivered;

    if delivered {
        if let Err(e) = source.mark_sent(&entry.id).await {
            warn!(
                source = source.name(),
                entry_id = %entry.id,
                error = %e,
                "Delivered entry could not be marked sent"
            );
            delivered = false;
        }
    }

    Submission {
        id: entry.id.clone(),
        delivered,
        fanout,
    }
}

/// Records failed attempts so the source can page those entries last.
pub(crate) async fn record_attempts(source: &dyn LogSource, failed: &[EntryId]) {
    for id in failed {
        if let Err(e) = source.mark_attempted(id).await {
            warn!(source = source.name(), entry_id = %id, error = %e, "Failed to record delivery attempt");
        }
    }
}

/// How a source's pass ended.
enum SourcePass {
    /// Cursor exhausted, or the source could not be read.
    Done,
    /// Batch limit reached; `entries_left` when the source still had
    /// unsent entries past the cursor.
    LimitReached { entries_left: bool },
}

/// Runs one sweep over `sources` in order.
///
/// The batch limit counts attempts, not successes, and is checked before
/// each entry; once reached the sweep stops without visiting the remaining
/// sources.
pub(crate) async fn run_sweep(
    sources: &[Arc<dyn LogSource>],
    targets: &TargetSet,
    limits: SweepLimits,
    observer: &dyn DeliveryObserver,
) -> SweepReport {
    let mut report = SweepReport::default();

    for (index, source) in sources.iter().enumerate() {
        let pass = sweep_source(source.as_ref(), targets, limits, observer, &mut report).await;
        if let SourcePass::LimitReached { entries_left } = pass {
            report.limit_reached = entries_left || index + 1 < sources.len();
            break;
        }
    }

    info!(
        attempted = report.attempted(),
        delivered = report.delivered(),
        failed = report.failed(),
        limit_reached = report.limit_reached,
        "Sweep completed"
    );
    observer.sweep_completed(&report);

    report
}

async fn sweep_source(
    source: &dyn LogSource,
    targets: &TargetSet,
    limits: SweepLimits,
    observer: &dyn DeliveryObserver,
    report: &mut SweepReport,
) -> SourcePass {
    let mut cursor = UnsentCursor::new(source, limits.chunk_size);
    let mut failed = Vec::new();

    let pass = loop {
        if cursor.is_exhausted() {
            break SourcePass::Done;
        }

        let remaining = limits.batch_limit.saturating_sub(report.attempted());
        if remaining == 0 {
            // A full last chunk only guesses at more; look once to be sure.
            let entries_left = cursor
                .next_chunk_limited(1)
                .await
                .map_or(true, |chunk| !chunk.entries.is_empty());
            break SourcePass::LimitReached { entries_left };
        }

        // Chunks are capped at `remaining`, which keeps the limit exact.
        let chunk = match cursor.next_chunk_limited(remaining).await {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(source = source.name(), error = %e, "Failed to fetch unsent entries");
                report.source_failures.push(SourceFailure {
                    source: source.name().to_string(),
                    error: e.to_string(),
                });
                break SourcePass::Done;
            }
        };

        debug!(
            source = source.name(),
            count = chunk.entries.len(),
            has_more = chunk.has_more,
            "Fetched unsent chunk"
        );

        for entry in &chunk.entries {
            let submission = deliver_and_mark(source, targets, entry, observer).await;
            if !submission.delivered {
                failed.push(submission.id.clone());
            }
            report.outcomes.push(EntryOutcome {
                source: source.name().to_string(),
                id: submission.id,
                delivered: submission.delivered,
            });
        }
    };

    // Recorded after paging so the source's order holds still under the cursor.
    record_attempts(source, &failed).await;
    pass
}
