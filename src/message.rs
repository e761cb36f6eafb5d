//! GELF wire message and the codec that produces it from a [`LogRecord`].
//!
//! A GELF message is a single flat JSON object: the structured fields
//! (`version`, `host`, `short_message`, ...) sit next to the additional
//! fields, whose keys start with an underscore. See
//! <https://go2docs.graylog.org/5-0/getting_in_log_data/gelf.html#GELFPayloadSpecification>.

use crate::record::{FieldValue, Level, LogRecord};
use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::backtrace::BacktraceStatus;
use std::collections::BTreeMap;

/// Protocol version written into every message.
pub const GELF_VERSION: &str = "1.1";

/// Record field that receives special treatment when it holds an error.
pub const ERROR_KEY: &str = "error";

/// Extension key carrying the rendered backtrace of the `error` field.
pub const STACK_TRACE_KEY: &str = "_stacktrace";

const RESERVED_FIELDS: [&str; 9] = [
    "version",
    "host",
    "short_message",
    "full_message",
    "timestamp",
    "level",
    "facility",
    "line",
    "file",
];

/// Error type returned when encoding or decoding wire messages.
#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GELF message must be a JSON object")]
    NotAnObject,

    #[error("field `{field}` must be {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },

    #[error("gzip stream error: {0}")]
    Compression(#[from] std::io::Error),
}

/// Syslog severity scale used on the wire (0 = emergency, 7 = debug).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Severity {
    Emergency = 0,
    Alert = 1,
    Critical = 2,
    Error = 3,
    Warning = 4,
    Notice = 5,
    Informational = 6,
    Debug = 7,
}

impl Severity {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Severity::Emergency,
            1 => Severity::Alert,
            2 => Severity::Critical,
            3 => Severity::Error,
            4 => Severity::Warning,
            5 => Severity::Notice,
            6 => Severity::Informational,
            7 => Severity::Debug,
            _ => return None,
        })
    }
}

impl From<Level> for Severity {
    // Producer levels have no equivalent of syslog NOTICE or EMERGENCY.
    fn from(level: Level) -> Self {
        match level {
            Level::Panic => Severity::Alert,
            Level::Fatal => Severity::Critical,
            Level::Error => Severity::Error,
            Level::Warn => Severity::Warning,
            Level::Info => Severity::Informational,
            Level::Debug | Level::Trace => Severity::Debug,
        }
    }
}

/// A GELF message ready to be handed to a transport.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WireMessage {
    pub version: String,
    pub host: String,
    pub short_message: String,
    pub full_message: String,
    /// Seconds since the unix epoch, millisecond precision.
    pub timestamp: f64,
    pub level: i32,
    /// Deprecated by GELF 1.1, send an additional field instead.
    pub facility: String,
    /// Deprecated by GELF 1.1, send an additional field instead.
    pub line: i64,
    /// Deprecated by GELF 1.1, send an additional field instead.
    pub file: String,
    /// Additional fields; keys carry their leading underscore.
    pub extra: BTreeMap<String, Value>,
}

impl WireMessage {
    pub fn severity(&self) -> Option<Severity> {
        Severity::from_code(self.level)
    }

    /// Look up an additional field by its producer-side name (without the
    /// underscore prefix).
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.extra.get(&extension_key(name))
    }

    fn from_object(object: Map<String, Value>) -> Result<Self, CodecError> {
        let mut message = WireMessage::default();
        for (key, value) in object {
            if key.starts_with('_') {
                message.extra.insert(key, value);
                continue;
            }
            match key.as_str() {
                "version" => message.version = expect_string(&key, value)?,
                "host" => message.host = expect_string(&key, value)?,
                "short_message" => message.short_message = expect_string(&key, value)?,
                "full_message" => message.full_message = expect_string(&key, value)?,
                "facility" => message.facility = expect_string(&key, value)?,
                "file" => message.file = expect_string(&key, value)?,
                "timestamp" => {
                    message.timestamp = value
                        .as_f64()
                        .ok_or_else(|| wrong_type(&key, "a number"))?
                }
                "level" => {
                    message.level = i32::try_from(expect_integer(&key, &value)?)
                        .map_err(|_| wrong_type(&key, "a 32-bit integer"))?
                }
                "line" => message.line = expect_integer(&key, &value)?,
                // Unknown fields without the underscore prefix are not part of
                // the protocol and are dropped.
                _ => {}
            }
        }
        Ok(message)
    }
}

impl Serialize for WireMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("version", &self.version)?;
        map.serialize_entry("host", &self.host)?;
        map.serialize_entry("short_message", &self.short_message)?;
        map.serialize_entry("full_message", &self.full_message)?;
        map.serialize_entry("timestamp", &self.timestamp)?;
        map.serialize_entry("level", &self.level)?;
        map.serialize_entry("facility", &self.facility)?;
        map.serialize_entry("line", &self.line)?;
        map.serialize_entry("file", &self.file)?;
        for (key, value) in &self.extra {
            if RESERVED_FIELDS.contains(&key.as_str()) {
                continue;
            }
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for WireMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let object = Map::<String, Value>::deserialize(deserializer)?;
        WireMessage::from_object(object).map_err(de::Error::custom)
    }
}

impl TryFrom<Value> for WireMessage {
    type Error = CodecError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(object) => WireMessage::from_object(object),
            _ => Err(CodecError::NotAnObject),
        }
    }
}

fn wrong_type(field: &str, expected: &'static str) -> CodecError {
    CodecError::WrongType {
        field: field.to_string(),
        expected,
    }
}

fn expect_string(field: &str, value: Value) -> Result<String, CodecError> {
    match value {
        Value::String(s) => Ok(s),
        _ => Err(wrong_type(field, "a string")),
    }
}

fn expect_integer(field: &str, value: &Value) -> Result<i64, CodecError> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .ok_or_else(|| wrong_type(field, "a number"))
}

/// Key under which a producer field is stored in the extension mapping.
pub fn extension_key(name: &str) -> String {
    format!("_{}", name)
}

/// Serialize a message into its flat JSON form.
pub fn to_bytes(message: &WireMessage) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(message)?)
}

/// Parse a flat JSON object back into a [`WireMessage`].
pub fn from_bytes(bytes: &[u8]) -> Result<WireMessage, CodecError> {
    let value: Value = serde_json::from_slice(bytes)?;
    WireMessage::try_from(value)
}

/// Turns [`LogRecord`]s into [`WireMessage`]s for one host.
///
/// Static `extra` fields are added to every message before the record's
/// own fields, so a record field with the same name wins.
#[derive(Debug, Clone)]
pub struct Encoder {
    host: String,
    extra: BTreeMap<String, Value>,
}

impl Encoder {
    pub fn new(host: impl Into<String>) -> Self {
        Encoder {
            host: host.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_extra(mut self, extra: BTreeMap<String, Value>) -> Self {
        self.extra = extra;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Build the wire message for `record`.
    ///
    /// Multi-line text is split on the first newline: the first line goes
    /// into `short_message` and the whole text into `full_message`.
    pub fn encode(&self, record: &LogRecord) -> WireMessage {
        let text = record.message.trim();
        let (short, full) = match text.find('\n') {
            Some(i) => (&text[..i], text),
            None => (text, ""),
        };

        let mut extra = BTreeMap::new();
        for (key, value) in &self.extra {
            extra.insert(extension_key(key), value.clone());
        }

        if let Some(caller) = &record.caller {
            extra.insert("_caller_file".to_string(), Value::from(caller.file.clone()));
            extra.insert("_caller_line".to_string(), Value::from(caller.line));
            extra.insert(
                "_caller_function".to_string(),
                Value::from(caller.function.clone()),
            );
        }

        for (key, value) in &record.fields {
            match value {
                FieldValue::Json(value) => {
                    extra.insert(extension_key(key), value.clone());
                }
                FieldValue::Error(err) => {
                    extra.insert(extension_key(key), Value::String(format!("{:#}", err)));
                    if key == ERROR_KEY {
                        if let Some(trace) = render_backtrace(err) {
                            extra.insert(STACK_TRACE_KEY.to_string(), Value::String(trace));
                        }
                    }
                }
            }
        }

        WireMessage {
            version: GELF_VERSION.to_string(),
            host: self.host.clone(),
            short_message: short.to_string(),
            full_message: full.to_string(),
            timestamp: record.timestamp.timestamp_millis() as f64 / 1000.0,
            level: Severity::from(record.level).code(),
            facility: String::new(),
            line: 0,
            file: String::new(),
            extra,
        }
    }
}

fn render_backtrace(err: &anyhow::Error) -> Option<String> {
    let backtrace = err.backtrace();
    (backtrace.status() == BacktraceStatus::Captured).then(|| backtrace.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn encoder() -> Encoder {
        Encoder::new("test-host")
    }

    // Half a second is exactly representable, so the float survives JSON.
    fn exact_timestamp() -> chrono::DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_500).single().unwrap()
    }

    #[test]
    fn multiline_text_splits_on_first_newline() {
        let msg = encoder().encode(&LogRecord::new(Level::Info, "hello\nworld"));
        assert_eq!(msg.short_message, "hello");
        assert_eq!(msg.full_message, "hello\nworld");
    }

    #[test]
    fn single_line_text_leaves_full_message_empty() {
        let msg = encoder().encode(&LogRecord::new(Level::Info, "just one line"));
        assert_eq!(msg.short_message, "just one line");
        assert_eq!(msg.full_message, "");
    }

    #[test]
    fn levels_map_onto_syslog_scale() {
        let cases = [
            (Level::Panic, Severity::Alert),
            (Level::Fatal, Severity::Critical),
            (Level::Error, Severity::Error),
            (Level::Warn, Severity::Warning),
            (Level::Info, Severity::Informational),
            (Level::Debug, Severity::Debug),
            (Level::Trace, Severity::Debug),
        ];
        for (level, expected) in cases {
            let msg = encoder().encode(&LogRecord::new(level, "x"));
            assert_eq!(msg.level, expected.code(), "{:?}", level);
            assert_eq!(msg.severity(), Some(expected));
        }
    }

    #[test]
    fn fields_and_caller_get_underscore_prefix() {
        let record = LogRecord::new(Level::Warn, "disk almost full")
            .with_field("user_id", 42_i64)
            .with_field("mount", "/var")
            .with_caller("src/main.rs", 17, "app::run");
        let msg = encoder().encode(&record);

        assert_eq!(msg.extra.get("_user_id"), Some(&json!(42)));
        assert_eq!(msg.field("mount"), Some(&json!("/var")));
        assert_eq!(msg.extra.get("_caller_file"), Some(&json!("src/main.rs")));
        assert_eq!(msg.extra.get("_caller_line"), Some(&json!(17)));
        assert_eq!(msg.extra.get("_caller_function"), Some(&json!("app::run")));
        assert!(msg.extra.keys().all(|k| k.starts_with('_')));
    }

    #[test]
    fn record_fields_override_static_extra() {
        let mut extra = BTreeMap::new();
        extra.insert("service".to_string(), json!("billing"));
        extra.insert("region".to_string(), json!("eu-1"));
        let enc = encoder().with_extra(extra);

        let msg = enc.encode(&LogRecord::new(Level::Info, "x").with_field("service", "auth"));
        assert_eq!(msg.field("service"), Some(&json!("auth")));
        assert_eq!(msg.field("region"), Some(&json!("eu-1")));
    }

    #[test]
    fn timestamp_has_millisecond_precision() {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_123).single().unwrap();
        let msg = encoder().encode(&LogRecord::new(Level::Info, "x").with_timestamp(ts));
        assert!((msg.timestamp - 1_700_000_000.123).abs() < 1e-6);
    }

    #[test]
    fn error_field_is_rendered_as_text() {
        let err = anyhow::anyhow!("connection refused").context("loading profile");
        let captured = err.backtrace().status() == BacktraceStatus::Captured;
        let msg = encoder().encode(&LogRecord::new(Level::Error, "failed").with_error(err));

        assert_eq!(
            msg.field("error"),
            Some(&json!("loading profile: connection refused"))
        );
        assert_eq!(msg.extra.contains_key(STACK_TRACE_KEY), captured);
    }

    #[test]
    fn serialized_form_is_one_flat_object() {
        let msg = encoder().encode(&LogRecord::new(Level::Info, "x").with_field("k", "v"));
        let value: Value = serde_json::from_slice(&to_bytes(&msg).unwrap()).unwrap();
        let object = value.as_object().unwrap();

        assert_eq!(object.get("_k"), Some(&json!("v")));
        assert_eq!(object.get("version"), Some(&json!("1.1")));
        assert_eq!(object.get("host"), Some(&json!("test-host")));
        assert!(object.values().all(|v| !v.is_object()));
    }

    #[test]
    fn reserved_names_in_extra_are_not_duplicated() {
        let mut msg = encoder().encode(&LogRecord::new(Level::Info, "x"));
        msg.extra.insert("host".to_string(), json!("spoofed"));
        let text = String::from_utf8(to_bytes(&msg).unwrap()).unwrap();
        assert_eq!(text.matches("\"host\"").count(), 1);
        assert!(!text.contains("spoofed"));
    }

    #[test]
    fn decode_restores_encoded_record() {
        let record = LogRecord::new(Level::Error, "boom\nstack follows")
            .with_field("attempt", 3_i64)
            .with_field("retryable", false)
            .with_field("payload", json!({"id": 7, "tags": ["a", "b"]}))
            .with_timestamp(exact_timestamp());
        let msg = encoder().encode(&record);
        let decoded = from_bytes(&to_bytes(&msg).unwrap()).unwrap();

        assert_eq!(decoded, msg);
        assert_eq!(decoded.severity(), Some(Severity::Error));
        assert_eq!(decoded.short_message, "boom");
        assert_eq!(decoded.full_message, "boom\nstack follows");
        assert_eq!(decoded.field("attempt"), Some(&json!(3)));
        assert_eq!(decoded.field("retryable"), Some(&json!(false)));
        assert_eq!(decoded.field("payload"), Some(&json!({"id": 7, "tags": ["a", "b"]})));
    }

    #[test]
    fn decode_rejects_wrong_field_types() {
        let err = from_bytes(br#"{"version":"1.1","level":"high"}"#).unwrap_err();
        assert!(matches!(err, CodecError::WrongType { ref field, .. } if field == "level"));

        let err = from_bytes(br#"{"host":12}"#).unwrap_err();
        assert!(matches!(err, CodecError::WrongType { ref field, .. } if field == "host"));
    }

    #[test]
    fn decode_rejects_non_objects() {
        assert!(matches!(from_bytes(b"[1,2]"), Err(CodecError::NotAnObject)));
        assert!(matches!(from_bytes(b"not json"), Err(CodecError::Json(_))));
    }

    #[test]
    fn decode_ignores_unknown_plain_keys() {
        let msg = from_bytes(br#"{"short_message":"hi","level":6.0,"bogus":1,"_app":"x"}"#)
            .unwrap();
        assert_eq!(msg.short_message, "hi");
        assert_eq!(msg.level, 6);
        assert_eq!(msg.extra.len(), 1);
        assert_eq!(msg.field("app"), Some(&json!("x")));
    }

    #[test]
    fn serde_deserialize_matches_from_bytes() {
        let record = LogRecord::new(Level::Debug, "x")
            .with_field("n", 1_i64)
            .with_timestamp(exact_timestamp());
        let msg = encoder().encode(&record);
        let via_serde: WireMessage = serde_json::from_slice(&to_bytes(&msg).unwrap()).unwrap();
        assert_eq!(via_serde, msg);
    }
}
