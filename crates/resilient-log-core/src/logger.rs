//! Multi-source, multi-target orchestrator.

use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::entry::LogEntry;
use crate::error::{ConfigError, ConfigResult, LogResult};
use crate::fanout::{FanoutReport, TargetSet};
use crate::observer::{DeliveryObserver, NoopObserver};
use crate::options::LoggerOptions;
use crate::registry::ComponentRegistry;
use crate::source::LogSource;
use crate::submitter::{DEFAULT_BATCH_LIMIT, DEFAULT_CHUNK_SIZE, DEFAULT_STORE_OLD_ENTRIES_DAYS};
use crate::sweep::{run_sweep, SweepLimits, SweepReport};
use crate::target::LogTarget;

/// What a maintenance pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Present when the sweep ran.
    pub sweep: Option<SweepReport>,
    /// Entries purged, present when the purge ran.
    pub purged: Option<u64>,
}

/// Delivers entries from every configured source to every configured target.
pub struct ResilientLogger {
    sources: Vec<Arc<dyn LogSource>>,
    targets: TargetSet,
    limits: SweepLimits,
    store_old_entries_days: u32,
    submit_unsent_entries: bool,
    clear_sent_entries: bool,
    observer: Arc<dyn DeliveryObserver>,
}

impl ResilientLogger {
    /// Start building a logger from constructed components.
    pub fn builder() -> ResilientLoggerBuilder {
        ResilientLoggerBuilder::default()
    }

    /// Builds a logger from options, resolving every descriptor through
    /// `registry`. Fails on the first unknown kind or rejected descriptor.
    pub fn from_options(options: &LoggerOptions, registry: &ComponentRegistry) -> ConfigResult<Self> {
        options.validate()?;

        let config = options.source_config();
        let mut builder = Self::builder()
            .batch_limit(options.batch_limit)
            .chunk_size(options.chunk_size)
            .store_old_entries_days(options.store_old_entries_days)
            .submit_unsent_entries(options.submit_unsent_entries)
            .clear_sent_entries(options.clear_sent_entries);

        for descriptor in &options.sources {
            builder = builder.source(registry.build_source(descriptor, &config)?);
        }
        for descriptor in &options.targets {
            builder = builder.target(registry.build_target(descriptor)?);
        }

        builder.build()
    }

    /// Source names in sweep order.
    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    /// Target names in delivery order.
    pub fn target_names(&self) -> Vec<String> {
        self.targets.names()
    }

    /// Sweep limits in effect.
    pub fn limits(&self) -> SweepLimits {
        self.limits
    }

    /// Fans an already-created entry out to every target.
    ///
    /// The entry is not marked sent here; its owning source does that, or
    /// the next sweep re-delivers it.
    pub async fn submit(&self, entry: &LogEntry) -> FanoutReport {
        self.targets.deliver(entry, self.observer.as_ref()).await
    }

    /// Sweeps every source in order under one global batch limit.
    pub async fn submit_unsent_entries(&self) -> SweepReport {
        run_sweep(&self.sources, &self.targets, self.limits, self.observer.as_ref()).await
    }

    /// Purges sent entries from every source with the shared retention
    /// window. Stops at the first source that fails.
    pub async fn clear_sent_entries(&self) -> LogResult<u64> {
        let mut total = 0;
        for source in &self.sources {
            let removed = source.clear_sent_entries(self.store_old_entries_days).await?;
            self.observer.purge_completed(source.name(), removed);
            total += removed;
        }

        info!(
            removed = total,
            sources = self.sources.len(),
            days_to_keep = self.store_old_entries_days,
            "Purged sent entries"
        );
        Ok(total)
    }

    /// Runs whichever of the sweep and the purge are enabled, sweep first.
    pub async fn run_maintenance(&self) -> LogResult<MaintenanceReport> {
        let mut report = MaintenanceReport::default();
        if self.submit_unsent_entries {
            report.sweep = Some(self.submit_unsent_entries().await);
        }
        if self.clear_sent_entries {
            report.purged = Some(self.clear_sent_entries().await?);
        }
        Ok(report)
    }
}

impl fmt::Debug for ResilientLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientLogger")
            .field("sources", &self.source_names())
            .field("targets", &self.target_names())
            .field("limits", &self.limits)
            .field("store_old_entries_days", &self.store_old_entries_days)
            .finish()
    }
}

/// Builder for [`ResilientLogger`].
pub struct ResilientLoggerBuilder {
    sources: Vec<Arc<dyn LogSource>>,
    targets: Vec<Arc<dyn LogTarget>>,
    batch_limit: usize,
    chunk_size: usize,
    store_old_entries_days: u32,
    submit_unsent_entries: bool,
    clear_sent_entries: bool,
    observer: Arc<dyn DeliveryObserver>,
}

impl Default for ResilientLoggerBuilder {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            targets: Vec::new(),
            batch_limit: DEFAULT_BATCH_LIMIT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            store_old_entries_days: DEFAULT_STORE_OLD_ENTRIES_DAYS,
            submit_unsent_entries: false,
            clear_sent_entries: false,
            observer: Arc::new(NoopObserver),
        }
    }
}

impl ResilientLoggerBuilder {
    pub fn source(mut self, source: Arc<dyn LogSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn target(mut self, target: Arc<dyn LogTarget>) -> Self {
        self.targets.push(target);
        self
    }

    pub fn batch_limit(mut self, batch_limit: usize) -> Self {
        self.batch_limit = batch_limit;
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn store_old_entries_days(mut self, days: u32) -> Self {
        self.store_old_entries_days = days;
        self
    }

    /// Enables the sweep in [`ResilientLogger::run_maintenance`].
    pub fn submit_unsent_entries(mut self, enabled: bool) -> Self {
        self.submit_unsent_entries = enabled;
        self
    }

    /// Enables the purge in [`ResilientLogger::run_maintenance`].
    pub fn clear_sent_entries(mut self, enabled: bool) -> Self {
        self.clear_sent_entries = enabled;
        self
    }

    pub fn observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Fails when no source or no target was added, or `chunk_size` is zero.
    pub fn build(self) -> ConfigResult<ResilientLogger> {
        if self.sources.is_empty() {
            return Err(ConfigError::invalid("sources", "non-empty array"));
        }
        if self.targets.is_empty() {
            return Err(ConfigError::invalid("targets", "non-empty array"));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::invalid("chunk_size", "positive integer"));
        }

        Ok(ResilientLogger {
            sources: self.sources,
            targets: TargetSet::new(self.targets),
            limits: SweepLimits {
                batch_limit: self.batch_limit,
                chunk_size: self.chunk_size,
            },
            store_old_entries_days: self.store_old_entries_days,
            submit_unsent_entries: self.submit_unsent_entries,
            clear_sent_entries: self.clear_sent_entries,
            observer: self.observer,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::LogLevel;
    use crate::entry::Context;
    use crate::error::TargetResult;
    use crate::memory::MemorySource;
    use crate::options::ComponentDescriptor;
    use crate::source::SourceConfig;
    use crate::target::Delivery;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct AcceptAll;

    #[async_trait]
    impl LogTarget for AcceptAll {
        fn name(&self) -> &str {
            "accept-all"
        }

        fn is_required(&self) -> bool {
            true
        }

        async fn submit(&self, _entry: &LogEntry) -> TargetResult<Delivery> {
            Ok(Delivery::Created {
                receipt: "ok".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct Recorder {
        sweeps: Mutex<usize>,
        purges: Mutex<Vec<(String, u64)>>,
    }

    impl DeliveryObserver for Recorder {
        fn sweep_completed(&self, _report: &SweepReport) {
            *self.sweeps.lock() += 1;
        }

        fn purge_completed(&self, source: &str, removed: u64) {
            self.purges.lock().push((source.to_string(), removed));
        }
    }

    async fn seeded(name: &str, count: usize) -> Arc<MemorySource> {
        let source = Arc::new(MemorySource::new(name, SourceConfig::default()));
        for _ in 0..count {
            source.create(LogLevel::Info, "x", Context::new()).await.unwrap();
        }
        source
    }

    #[test]
    fn build_requires_sources_and_targets() {
        let err = ResilientLogger::builder()
            .target(Arc::new(AcceptAll))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { ref key, .. } if key == "sources"));

        let err = ResilientLogger::builder()
            .source(Arc::new(MemorySource::new("m", SourceConfig::default())))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidOption { ref key, .. } if key == "targets"));
    }

    #[tokio::test]
    async fn maintenance_runs_enabled_steps() {
        let source = seeded("memory", 3).await;
        let observer = Arc::new(Recorder::default());
        let logger = ResilientLogger::builder()
            .source(source.clone())
            .target(Arc::new(AcceptAll))
            .store_old_entries_days(0)
            .submit_unsent_entries(true)
            .clear_sent_entries(true)
            .observer(observer.clone())
            .build()
            .unwrap();

        let report = logger.run_maintenance().await.unwrap();
        assert_eq!(report.sweep.unwrap().delivered(), 3);
        assert_eq!(report.purged, Some(3));
        assert!(source.is_empty());
        assert_eq!(*observer.sweeps.lock(), 1);
        assert_eq!(*observer.purges.lock(), vec![("memory".to_string(), 3)]);
    }

    #[tokio::test]
    async fn maintenance_disabled_does_nothing() {
        let source = seeded("memory", 2).await;
        let logger = ResilientLogger::builder()
            .source(source.clone())
            .target(Arc::new(AcceptAll))
            .build()
            .unwrap();

        let report = logger.run_maintenance().await.unwrap();
        assert_eq!(report, MaintenanceReport::default());
        assert_eq!(source.unsent_count(), 2);
    }

    #[tokio::test]
    async fn submit_does_not_mark_sent() {
        let source = seeded("memory", 1).await;
        let logger = ResilientLogger::builder()
            .source(source.clone())
            .target(Arc::new(AcceptAll))
            .build()
            .unwrap();

        let entry = source.entries().remove(0);
        let report = logger.submit(&entry).await;
        assert!(report.delivered);
        assert_eq!(source.unsent_count(), 1);
    }

    #[tokio::test]
    async fn from_options_resolves_registry() {
        let mut registry = ComponentRegistry::with_defaults();
        registry.register_target("accept-all", |_| Ok(Arc::new(AcceptAll) as Arc<dyn LogTarget>));

        let mut options = LoggerOptions::new(
            vec![
                ComponentDescriptor::new("memory").with_option("name", "first"),
                ComponentDescriptor::new("memory").with_option("name", "second"),
            ],
            vec![ComponentDescriptor::new("accept-all")],
        );
        options.batch_limit = 7;
        options.chunk_size = 3;

        let logger = ResilientLogger::from_options(&options, &registry).unwrap();
        assert_eq!(logger.source_names(), vec!["first", "second"]);
        assert_eq!(logger.target_names(), vec!["accept-all"]);
        assert_eq!(logger.limits().batch_limit, 7);
        assert_eq!(logger.limits().chunk_size, 3);

        options.targets.push(ComponentDescriptor::new("kafka"));
        let err = ResilientLogger::from_options(&options, &registry).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTarget(_)));
    }
}
