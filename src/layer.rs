use crate::hook::GelfHook;
use crate::record::{Caller, FieldValue, LogRecord};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Events emitted by this crate are never shipped, so a failing transport
/// cannot feed its own diagnostics back into itself.
const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");

/// `tracing_subscriber` layer that turns events into [`LogRecord`]s and
/// queues them on a [`GelfHook`].
///
/// The hook must be asynchronous: the layer never waits for the network.
/// Events below `min_level` (default `DEBUG`) are ignored.
pub struct GelfLayer {
    hook: Arc<GelfHook>,
    min_level: Level,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Successfully queued on the hook.
    pub enqueued_events: Arc<AtomicU64>,
    /// Rejected by the hook.
    pub dropped_events: Arc<AtomicU64>,
}

impl GelfLayer {
    pub fn new(hook: Arc<GelfHook>) -> Self {
        Self {
            hook,
            min_level: Level::DEBUG,
            total_events: Arc::new(AtomicU64::new(0)),
            enqueued_events: Arc::new(AtomicU64::new(0)),
            dropped_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Least severe level that is still shipped.
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }
}

impl<S> Layer<S> for GelfLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        let meta = event.metadata();
        if *meta.level() > self.min_level || meta.target().starts_with(OWN_TARGET) {
            return;
        }

        let mut fields = BTreeMap::new();
        let mut message: Option<String> = None;

        let mut visitor = FieldVisitor { fields: &mut fields, message: &mut message };
        event.record(&mut visitor);

        let caller = match (meta.file(), meta.line()) {
            (Some(file), Some(line)) => Some(Caller {
                file: file.to_string(),
                line,
                function: meta.module_path().unwrap_or_default().to_string(),
            }),
            _ => None,
        };

        let record = LogRecord {
            timestamp: Utc::now(),
            level: (*meta.level()).into(),
            message: message.unwrap_or_default(),
            fields,
            caller,
        };

        match self.hook.enqueue(record) {
            Ok(()) => {
                self.enqueued_events.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

use tracing::field::{Field, Visit};

pub struct FieldVisitor<'a> {
    pub fields: &'a mut BTreeMap<String, FieldValue>,
    pub message: &'a mut Option<String>,
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), FieldValue::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), FieldValue::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), FieldValue::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.fields.insert(field.name().to_string(), FieldValue::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), FieldValue::from(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        let err = anyhow::Error::msg(value.to_string());
        self.fields.insert(field.name().to_string(), FieldValue::from(err));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.fields.insert(field.name().to_string(), FieldValue::from(format!("{:?}", value)));
        }
    }
}
