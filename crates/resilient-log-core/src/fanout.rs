//! Multi-target fan-out.
//!
//! Every target is tried in configuration order, even after a required
//! target has failed. The entry counts as delivered iff no required target
//! failed; optional failures never flip the result.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::entry::LogEntry;
use crate::observer::DeliveryObserver;
use crate::target::{Delivery, LogTarget};

/// Result of one target's attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetAttempt {
    pub target: String,
    pub required: bool,
    pub delivery: Delivery,
}

/// Result of delivering one entry to every target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutReport {
    /// Per-target results, in configuration order.
    pub attempts: Vec<TargetAttempt>,
    /// True iff no required target failed.
    pub delivered: bool,
}

impl FanoutReport {
    /// Targets that did not confirm delivery.
    pub fn failed_targets(&self) -> impl Iterator<Item = &TargetAttempt> {
        self.attempts.iter().filter(|a| !a.delivery.is_success())
    }
}

/// Ordered, immutable set of targets.
#[derive(Clone)]
pub struct TargetSet {
    targets: Vec<Arc<dyn LogTarget>>,
}

impl TargetSet {
    /// Wraps targets in delivery order.
    pub fn new(targets: Vec<Arc<dyn LogTarget>>) -> Self {
        Self { targets }
    }

    /// Number of targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// True when there are no targets.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Target names in delivery order.
    pub fn names(&self) -> Vec<String> {
        self.targets.iter().map(|t| t.name().to_string()).collect()
    }

    /// Delivers `entry` to every target.
    ///
    /// Target errors are logged and counted as failed deliveries; they never
    /// propagate.
    pub async fn deliver(&self, entry: &LogEntry, observer: &dyn DeliveryObserver) -> FanoutReport {
        let mut attempts = Vec::with_capacity(self.targets.len());
        let mut delivered = true;

        for target in &self.targets {
            let required = target.is_required();
            let delivery = match target.submit(entry).await {
                Ok(delivery) => delivery,
                Err(e) => {
                    warn!(
                        target = target.name(),
                        entry_id = %entry.id,
                        error = %e,
                        "Target raised an error during delivery"
                    );
                    Delivery::rejected(e.to_string())
                }
            };

            if let Delivery::Rejected { reason } = &delivery {
                debug!(
                    target = target.name(),
                    entry_id = %entry.id,
                    required,
                    reason = %reason,
                    "Delivery not confirmed"
                );
                observer.delivery_failed(target.name(), &entry.id, reason);
                if required {
                    delivered = false;
                }
            }

            attempts.push(TargetAttempt {
                target: target.name().to_string(),
                required,
                delivery,
            });
        }

        FanoutReport {
            attempts,
            delivered,
        }
    }
}
