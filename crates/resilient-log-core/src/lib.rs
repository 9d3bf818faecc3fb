//! At-least-once log delivery.
//!
//! Log entries are first recorded in a durable source, then forwarded to
//! one or more targets. Entries that fail delivery stay unsent and are
//! retried by later sweeps; delivered entries are marked sent and purged
//! after a retention window. Targets write under a content hash of the
//! document, so re-delivering an entry is a no-op at the target.
//!
//! This crate provides:
//! - LogSource / LogTarget: the source and target contracts
//! - Submitter: one source bound to a set of targets
//! - ResilientLogger: many sources, many targets, one global batch limit
//! - MemorySource: in-process source
//! - ResilientLogLayer: records `tracing` events into a source

mod clock;
mod document;
mod entry;
mod error;
mod fanout;
mod hasher;
mod layer;
mod logger;
mod memory;
mod observer;
mod options;
mod registry;
mod schedule;
mod source;
mod submitter;
mod sweep;
mod target;

pub mod logging;

pub use clock::{Clock, ManualClock, SystemClock};
pub use document::{
    assert_required_context, build_audit_document, value_as_object, AuditDocument, AuditEvent,
    LogLevel,
};
pub use entry::{Context, Document, EntryId, LogEntry};
pub use error::{
    ConfigError, ConfigResult, LogError, LogResult, MissingContextError, SourceError,
    SourceResult, TargetError, TargetResult,
};
pub use fanout::{FanoutReport, TargetAttempt, TargetSet};
pub use hasher::{canonical_json, content_hash, deep_sorted};
pub use layer::{ResilientLogGuard, ResilientLogLayer};
pub use logger::{MaintenanceReport, ResilientLogger, ResilientLoggerBuilder};
pub use memory::MemorySource;
pub use observer::{DeliveryObserver, NoopObserver};
pub use options::{ComponentDescriptor, LoggerOptions, DEFAULT_LOG_LEVEL, LOG_LEVEL_ENV};
pub use registry::{ComponentRegistry, SourceFactory, TargetFactory, MEMORY_SOURCE};
pub use schedule::{Schedule, ScheduleParseError};
pub use source::{LogSource, SourceConfig, UnsentChunk, UnsentCursor};
pub use submitter::{
    Submitter, SubmitterOptions, DEFAULT_BATCH_LIMIT, DEFAULT_CHUNK_SIZE, DEFAULT_NEXT_CLEAR,
    DEFAULT_NEXT_SUBMIT, DEFAULT_STORE_OLD_ENTRIES_DAYS,
};
pub use sweep::{EntryOutcome, SourceFailure, Submission, SweepLimits, SweepReport};
pub use target::{Delivery, LogTarget, TargetOptions};
