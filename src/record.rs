use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Severity of a producer-side record, ordered from most to least severe.
///
/// There is no producer level for syslog `EMERGENCY` or `NOTICE`, so this
/// enum has seven variants against the eight wire severities. Panic maps to
/// alert and both debug and trace map to debug, see
/// [`Severity`](crate::message::Severity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Panic,
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => Level::Error,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::INFO => Level::Info,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::TRACE => Level::Trace,
        }
    }
}

/// A value attached to a [`LogRecord`] field.
///
/// Most fields are plain JSON values. Errors are kept as errors so the
/// encoder can render their message and, when one was captured, their
/// backtrace.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Json(Value),
    Error(Arc<anyhow::Error>),
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Json(value)
    }
}

impl From<anyhow::Error> for FieldValue {
    fn from(err: anyhow::Error) -> Self {
        FieldValue::Error(Arc::new(err))
    }
}

macro_rules! json_field_from {
    ($($ty:ty),*) => {
        $(impl From<$ty> for FieldValue {
            fn from(value: $ty) -> Self {
                FieldValue::Json(Value::from(value))
            }
        })*
    };
}

json_field_from!(&str, String, bool, i32, i64, u32, u64, f64);

/// Source location of the logging call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub file: String,
    pub line: u32,
    pub function: String,
}

/// One log call, as handed over by the instrumentation side.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub fields: BTreeMap<String, FieldValue>,
    pub caller: Option<Caller>,
}

impl LogRecord {
    /// Create a record stamped with the current time and no fields.
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        LogRecord {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            fields: BTreeMap::new(),
            caller: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Attach an error under the conventional `error` key.
    pub fn with_error(self, err: anyhow::Error) -> Self {
        self.with_field(crate::message::ERROR_KEY, err)
    }

    pub fn with_caller(
        mut self,
        file: impl Into<String>,
        line: u32,
        function: impl Into<String>,
    ) -> Self {
        self.caller = Some(Caller {
            file: file.into(),
            line,
            function: function.into(),
        });
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
