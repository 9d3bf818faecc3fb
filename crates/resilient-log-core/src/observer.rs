//! Injected observability handle.
//!
//! Components always emit `tracing` events; an observer additionally
//! receives the delivery side channel (failures, sweep and purge summaries)
//! so embedders can count or forward them without a global logger.

use crate::entry::EntryId;
use crate::sweep::SweepReport;

/// Receives delivery notifications. Every method defaults to a no-op.
pub trait DeliveryObserver: Send + Sync {
    /// A target did not confirm delivery of an entry.
    fn delivery_failed(&self, _target: &str, _entry: &EntryId, _reason: &str) {}

    /// A sweep finished.
    fn sweep_completed(&self, _report: &SweepReport) {}

    /// A purge removed `_removed` entries from `_source`.
    fn purge_completed(&self, _source: &str, _removed: u64) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl DeliveryObserver for NoopObserver {}
