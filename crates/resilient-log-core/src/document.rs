//! Audit document model.
//!
//! Sources turn a `(level, message, context)` log call into the document
//! that targets index:
//!
//! ```text
//! {
//!   "@timestamp": "...",
//!   "entry_id": 17,
//!   "audit_event": {
//!     "actor": {...}, "date_time": "...", "operation": "...",
//!     "origin": "...", "target": {...}, "environment": "...",
//!     "message": "...", "level": 6, "extra": {...}
//!   }
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::entry::{Context, Document, EntryId};
use crate::error::MissingContextError;
use crate::source::SourceConfig;

/// Context keys lifted into dedicated audit event fields.
const ACTOR_KEY: &str = "actor";
const OPERATION_KEY: &str = "operation";
const TARGET_KEY: &str = "target";

/// RFC 5424 severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Info = 6,
    Debug = 7,
}

impl LogLevel {
    /// Numeric severity code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Looks up a level by its numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => LogLevel::Emergency,
            1 => LogLevel::Alert,
            2 => LogLevel::Critical,
            3 => LogLevel::Error,
            4 => LogLevel::Warning,
            5 => LogLevel::Notice,
            6 => LogLevel::Info,
            7 => LogLevel::Debug,
            _ => return None,
        })
    }

    /// Lowercase level name.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Emergency => "emergency",
            LogLevel::Alert => "alert",
            LogLevel::Critical => "critical",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Notice => "notice",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "emergency" | "emerg" => Ok(LogLevel::Emergency),
            "alert" => Ok(LogLevel::Alert),
            "critical" | "crit" => Ok(LogLevel::Critical),
            "error" | "err" => Ok(LogLevel::Error),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "notice" => Ok(LogLevel::Notice),
            "info" => Ok(LogLevel::Info),
            "debug" | "trace" => Ok(LogLevel::Debug),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => LogLevel::Error,
            tracing::Level::WARN => LogLevel::Warning,
            tracing::Level::INFO => LogLevel::Info,
            _ => LogLevel::Debug,
        }
    }
}

impl Serialize for LogLevel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for LogLevel {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        LogLevel::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid log level code {}", code)))
    }
}

/// The event part of an audit document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub actor: Value,
    pub date_time: DateTime<Utc>,
    pub operation: String,
    pub origin: String,
    pub target: Value,
    pub environment: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// Full document delivered to targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditDocument {
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    pub entry_id: EntryId,
    pub audit_event: AuditEvent,
}

impl AuditDocument {
    /// Converts into the generic document shape stored on entries.
    pub fn into_document(self) -> Result<Document, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Document::new()),
        }
    }
}

/// Wraps a scalar as `{"value": v}`; objects pass through unchanged.
pub fn value_as_object(value: Value) -> Value {
    match value {
        Value::Object(_) => value,
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            Value::Object(map)
        }
    }
}

/// Builds the audit document for a new entry.
///
/// `actor`, `operation` and `target` are taken out of the context; every
/// remaining key ends up in `extra`.
pub fn build_audit_document(
    id: EntryId,
    level: LogLevel,
    message: &str,
    mut context: Context,
    config: &SourceConfig,
    now: DateTime<Utc>,
) -> AuditDocument {
    let actor = context
        .remove(ACTOR_KEY)
        .map(value_as_object)
        .unwrap_or_else(|| value_as_object(Value::String("unknown".to_string())));
    let target = context
        .remove(TARGET_KEY)
        .map(value_as_object)
        .unwrap_or_else(|| value_as_object(Value::String(String::new())));
    let operation = match context.remove(OPERATION_KEY) {
        Some(Value::String(op)) => op,
        Some(other) => other.to_string(),
        None => String::new(),
    };

    AuditDocument {
        timestamp: now,
        entry_id: id,
        audit_event: AuditEvent {
            actor,
            date_time: now,
            operation,
            origin: config.origin.clone(),
            target,
            environment: config.environment.clone(),
            message: message.to_string(),
            level: Some(level),
            extra: context,
        },
    }
}

/// Checks that every `required` key is present in `context`.
pub fn assert_required_context(
    context: &Context,
    required: &[String],
) -> Result<(), MissingContextError> {
    let fields: Vec<String> = required
        .iter()
        .filter(|field| !context.contains_key(field.as_str()))
        .cloned()
        .collect();

    if fields.is_empty() {
        Ok(())
    } else {
        Err(MissingContextError { fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(value: Value) -> Context {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn config() -> SourceConfig {
        SourceConfig {
            environment: "test_environment".to_string(),
            origin: "test_origin".to_string(),
        }
    }

    #[test]
    fn value_as_object_wraps_scalars() {
        assert_eq!(value_as_object(json!("hello")), json!({"value": "hello"}));
        assert_eq!(value_as_object(json!({"value": "hello"})), json!({"value": "hello"}));
        assert_eq!(value_as_object(json!(3)), json!({"value": 3}));
    }

    #[test]
    fn level_codes_round_trip() {
        for code in 0..=7u8 {
            let level = LogLevel::from_code(code).unwrap();
            assert_eq!(level.code(), code);
        }
        assert!(LogLevel::from_code(8).is_none());
    }

    #[test]
    fn level_from_tracing() {
        assert_eq!(LogLevel::from(tracing::Level::ERROR), LogLevel::Error);
        assert_eq!(LogLevel::from(tracing::Level::WARN), LogLevel::Warning);
        assert_eq!(LogLevel::from(tracing::Level::INFO), LogLevel::Info);
        assert_eq!(LogLevel::from(tracing::Level::TRACE), LogLevel::Debug);
    }

    #[test]
    fn level_parse() {
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("crit".parse::<LogLevel>().unwrap(), LogLevel::Critical);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn audit_document_lifts_known_keys() {
        let now = Utc::now();
        let doc = build_audit_document(
            EntryId::Int(3),
            LogLevel::Info,
            "Hello World",
            context(json!({
                "actor": "alice",
                "operation": "READ",
                "target": {"path": "/users/1"},
                "a": "b",
            })),
            &config(),
            now,
        );

        assert_eq!(doc.timestamp, now);
        assert_eq!(doc.audit_event.actor, json!({"value": "alice"}));
        assert_eq!(doc.audit_event.operation, "READ");
        assert_eq!(doc.audit_event.target, json!({"path": "/users/1"}));
        assert_eq!(doc.audit_event.origin, "test_origin");
        assert_eq!(doc.audit_event.environment, "test_environment");
        assert_eq!(doc.audit_event.message, "Hello World");
        assert_eq!(doc.audit_event.extra.get("a"), Some(&json!("b")));
        assert!(!doc.audit_event.extra.contains_key("actor"));
    }

    #[test]
    fn audit_document_serializes_timestamp_key() {
        let doc = build_audit_document(
            EntryId::Int(1),
            LogLevel::Error,
            "boom",
            Context::new(),
            &config(),
            Utc::now(),
        )
        .into_document()
        .unwrap();

        assert!(doc.contains_key("@timestamp"));
        assert_eq!(doc.get("entry_id"), Some(&json!(1)));
        assert_eq!(doc["audit_event"]["level"], json!(3));
        assert!(doc["audit_event"].get("extra").is_none());
    }

    #[test]
    fn required_context_reports_all_missing() {
        let ctx = context(json!({"actor": "bob"}));
        let required = vec![
            "actor".to_string(),
            "operation".to_string(),
            "target".to_string(),
        ];

        let err = assert_required_context(&ctx, &required).unwrap_err();
        assert_eq!(err.fields, vec!["operation", "target"]);
        assert!(assert_required_context(&ctx, &["actor".to_string()]).is_ok());
        assert!(assert_required_context(&ctx, &[]).is_ok());
    }
}
