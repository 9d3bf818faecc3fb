//! `tracing` bridge.
//!
//! [`ResilientLogLayer`] persists every `tracing` event into a source so
//! regular `info!`/`warn!` calls become audit entries that the sweep later
//! delivers. The event message becomes the entry message; its fields, plus
//! `name` (the event target) and `record_time` (unix seconds), become the
//! context.
//!
//! Writes happen on a dedicated writer thread with its own runtime, so
//! records survive the shutdown of the application's runtime. Keep the
//! returned [`ResilientLogGuard`] alive; dropping it drains every queued
//! record into the source before returning.

use chrono::Utc;
use serde_json::{Number, Value};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, oneshot};
use tracing::field::{Field, Visit};
use tracing::{warn, Event, Subscriber};
use tracing_subscriber::layer::Context as LayerContext;
use tracing_subscriber::Layer;

use crate::document::LogLevel;
use crate::entry::Context;
use crate::source::LogSource;

/// Events whose target starts with this prefix come from this workspace and
/// are never persisted.
const OWN_TARGET_PREFIX: &str = "resilient_log";

const WRITER_THREAD_NAME: &str = "resilient-log-writer";

enum Command {
    Record {
        level: LogLevel,
        message: String,
        context: Context,
    },
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Visitor that splits an event into message and context.
struct FieldVisitor {
    context: Context,
    message: Option<String>,
}

impl FieldVisitor {
    fn new() -> Self {
        Self {
            context: Context::new(),
            message: None,
        }
    }

    fn insert(&mut self, field: &Field, value: Value) {
        self.context.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let value = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.insert(field, Value::String(value));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert(field, Value::String(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::Number(value.into()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.insert(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.insert(field, Value::String(value.to_string()));
    }
}

/// Layer that records events into a [`LogSource`].
///
/// `on_event` only queues the record; it never blocks on the source.
pub struct ResilientLogLayer {
    commands: mpsc::UnboundedSender<Command>,
}

impl ResilientLogLayer {
    /// Starts the writer thread for `source`.
    ///
    /// Events emitted after the guard is dropped are discarded.
    pub fn new(source: Arc<dyn LogSource>) -> io::Result<(Self, ResilientLogGuard)> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let (commands, receiver) = mpsc::unbounded_channel();

        let writer = thread::Builder::new()
            .name(WRITER_THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(write_records(source, receiver)))?;

        let guard = ResilientLogGuard {
            commands: commands.clone(),
            writer: Some(writer),
        };
        Ok((Self { commands }, guard))
    }
}

async fn write_records(source: Arc<dyn LogSource>, mut commands: mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Record {
                level,
                message,
                context,
            } => {
                if let Err(e) = source.create(level, &message, context).await {
                    warn!(source = source.name(), error = %e, "Failed to persist log event");
                }
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
            Command::Shutdown => break,
        }
    }
}

/// Owns the writer thread of a [`ResilientLogLayer`].
///
/// Dropping the guard persists every record queued so far, then stops the
/// writer.
#[must_use = "dropping the guard stops the log writer"]
pub struct ResilientLogGuard {
    commands: mpsc::UnboundedSender<Command>,
    writer: Option<JoinHandle<()>>,
}

impl ResilientLogGuard {
    /// Waits until every record queued before this call is in the source.
    pub async fn flush(&self) {
        let (done, finished) = oneshot::channel();
        if self.commands.send(Command::Flush(done)).is_ok() {
            let _ = finished.await;
        }
    }
}

impl Drop for ResilientLogGuard {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(writer) = self.writer.take() {
            if writer.join().is_err() {
                warn!("Log writer thread panicked");
            }
        }
    }
}

impl<S> Layer<S> for ResilientLogLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        let metadata = event.metadata();
        if metadata.target().starts_with(OWN_TARGET_PREFIX) {
            return;
        }

        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);

        let mut context = visitor.context;
        context.insert("name".to_string(), Value::String(metadata.target().to_string()));
        context.insert(
            "record_time".to_string(),
            Value::Number(Utc::now().timestamp().into()),
        );

        // Fails only once the guard is gone.
        let _ = self.commands.send(Command::Record {
            level: LogLevel::from(*metadata.level()),
            message: visitor.message.unwrap_or_default(),
            context,
        });
    }
}
