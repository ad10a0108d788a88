//! In-memory span capture.
//!
//! [`InMemoryTraceLayer`] is a `tracing-subscriber` layer that keeps every
//! closed span belonging to a pipeline run in a [`SharedTraceStorage`]. A span
//! belongs to a run when it, or one of its ancestors, carries a `run.id`
//! field; the pipeline opens its `rag.*` spans that way, so the whole span
//! tree of one question can be fetched afterwards with
//! [`SharedTraceStorage::get_trace`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use serde::Serialize;
use serde_json::Value;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Record};
use tracing::{Id, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

/// Span field that ties a span to a pipeline run.
pub const RUN_ID_FIELD: &str = "run.id";

/// A closed span.
#[derive(Debug, Clone, Serialize)]
pub struct SpanData {
    #[serde(rename = "span_id")]
    pub id: String,
    /// The run the span belongs to.
    pub run_id: String,
    pub name: String,
    #[serde(rename = "parent_span_id", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Nanoseconds since the Unix epoch.
    pub start_time: u128,
    pub end_time: u128,
    pub attributes: HashMap<String, Value>,
    pub status: SpanStatus,
}

impl SpanData {
    pub fn duration_nanos(&self) -> u128 {
        self.end_time.saturating_sub(self.start_time)
    }
}

/// Outcome of a span, derived from its `error` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", content = "message", rename_all = "snake_case")]
pub enum SpanStatus {
    Ok,
    Error(String),
}

/// Captured spans grouped by run id, in close order.
#[derive(Debug, Clone, Default)]
pub struct SharedTraceStorage {
    runs: Arc<RwLock<HashMap<String, Vec<SpanData>>>>,
}

impl SharedTraceStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_trace(&self, run_id: &str) -> Option<Vec<SpanData>> {
        self.runs.read().ok()?.get(run_id).cloned()
    }

    fn push(&self, span: SpanData) {
        if let Ok(mut runs) = self.runs.write() {
            runs.entry(span.run_id.clone()).or_default().push(span);
        }
    }

    /// Number of runs with at least one captured span.
    pub fn len(&self) -> usize {
        self.runs.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut runs) = self.runs.write() {
            runs.clear();
        }
    }
}

/// A `tracing` layer that records run spans into a [`SharedTraceStorage`].
pub struct InMemoryTraceLayer {
    storage: Arc<SharedTraceStorage>,
}

impl InMemoryTraceLayer {
    pub fn new(storage: Arc<SharedTraceStorage>) -> Self {
        Self { storage }
    }
}

/// Per-span state kept in the registry's extensions.
struct Captured {
    started: u128,
    run_id: Option<String>,
    fields: FieldMap,
}

fn now_nanos() -> u128 {
    SystemTime::now().duration_since(SystemTime::UNIX_EPOCH).unwrap_or_default().as_nanos()
}

impl<S> Layer<S> for InMemoryTraceLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };

        let mut fields = FieldMap::default();
        attrs.record(&mut fields);

        let inherited = || {
            let parent = span.parent()?;
            let extensions = parent.extensions();
            extensions.get::<Captured>().and_then(|c| c.run_id.clone())
        };
        let run_id = fields.str(RUN_ID_FIELD).map(str::to_string).or_else(inherited);

        span.extensions_mut().insert(Captured { started: now_nanos(), run_id, fields });
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut extensions = span.extensions_mut();
        if let Some(captured) = extensions.get_mut::<Captured>() {
            values.record(&mut captured.fields);
            if captured.run_id.is_none() {
                captured.run_id = captured.fields.str(RUN_ID_FIELD).map(str::to_string);
            }
        }
    }

    fn on_close(&self, id: Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(&id) else { return };
        let Some(captured) = span.extensions_mut().remove::<Captured>() else { return };
        let Some(run_id) = captured.run_id else { return };

        let attributes = captured.fields.0;
        let status = match attributes.get("error") {
            Some(Value::String(message)) => SpanStatus::Error(message.clone()),
            Some(other) => SpanStatus::Error(other.to_string()),
            None => SpanStatus::Ok,
        };

        self.storage.push(SpanData {
            id: format!("{:016x}", id.into_u64()),
            run_id,
            name: span.metadata().name().to_string(),
            parent_id: span.parent().map(|p| format!("{:016x}", p.id().into_u64())),
            start_time: captured.started,
            end_time: now_nanos(),
            attributes,
            status,
        });
    }
}

/// Span fields as JSON values.
#[derive(Default)]
struct FieldMap(HashMap<String, Value>);

impl FieldMap {
    fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    fn set(&mut self, field: &Field, value: Value) {
        self.0.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldMap {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.set(field, Value::String(format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.set(field, Value::String(value.to_string()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.set(field, Value::Bool(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.set(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.set(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.set(field, value.into());
    }
}
