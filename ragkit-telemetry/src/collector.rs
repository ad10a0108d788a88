//! Structured trace records for pipeline runs.
//!
//! A [`TraceCollector`] receives one [`TraceRecord`] per pipeline invocation.
//! Recording is fire-and-forget: `record` is synchronous, returns nothing, and
//! implementations must not block on I/O.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Latency of one named pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageTiming {
    pub stage: String,
    pub latency_ms: u64,
}

/// A structured record of a single pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraceRecord {
    pub run_id: Uuid,
    /// Operation name, e.g. `rag.answer` or `rag.generate`.
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub inputs: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the caller dropped a streaming run before it finished.
    #[serde(default)]
    pub cancelled: bool,
    pub stages: Vec<StageTiming>,
    pub latency_ms: u64,
}

impl TraceRecord {
    /// Start a record for `name` with the given inputs.
    pub fn new(name: impl Into<String>, inputs: serde_json::Value) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            name: name.into(),
            started_at: Utc::now(),
            inputs,
            outputs: None,
            error: None,
            cancelled: false,
            stages: Vec::new(),
            latency_ms: 0,
        }
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn push_stage(&mut self, stage: impl Into<String>, latency: Duration) {
        self.stages.push(StageTiming { stage: stage.into(), latency_ms: millis(latency) });
    }

    /// Set the total latency of the run.
    pub fn set_latency(&mut self, latency: Duration) {
        self.latency_ms = millis(latency);
    }

    pub fn stage(&self, stage: &str) -> Option<&StageTiming> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// A sink for pipeline trace records.
///
/// Implementations must never block or fail the caller. Anything that needs
/// I/O should hand the record off (a channel, the `tracing` pipeline) and
/// return immediately.
pub trait TraceCollector: Send + Sync {
    fn record(&self, record: TraceRecord);
}

impl<T: TraceCollector + ?Sized> TraceCollector for Arc<T> {
    fn record(&self, record: TraceRecord) {
        (**self).record(record);
    }
}

/// Discards every record.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTraceCollector;

impl TraceCollector for NoopTraceCollector {
    fn record(&self, _record: TraceRecord) {}
}

/// Keeps records in memory; handy in tests and for local inspection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTraceCollector {
    records: Arc<RwLock<Vec<TraceRecord>>>,
}

impl InMemoryTraceCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records collected so far, oldest first.
    pub fn records(&self) -> Vec<TraceRecord> {
        self.records.read().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<TraceRecord> {
        self.records.read().ok().and_then(|r| r.last().cloned())
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.write() {
            records.clear();
        }
    }
}

impl TraceCollector for InMemoryTraceCollector {
    fn record(&self, record: TraceRecord) {
        // A poisoned lock drops the record rather than failing the caller.
        if let Ok(mut records) = self.records.write() {
            records.push(record);
        }
    }
}

/// Emits each record as a JSON `tracing` event on the `ragkit::trace` target,
/// leaving export to whatever subscriber is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTraceCollector;

impl TraceCollector for LogTraceCollector {
    fn record(&self, record: TraceRecord) {
        match serde_json::to_string(&record) {
            Ok(json) => tracing::info!(
                target: "ragkit::trace",
                run_id = %record.run_id,
                name = %record.name,
                latency_ms = record.latency_ms,
                failed = record.is_error(),
                record = %json,
                "pipeline run"
            ),
            Err(e) => tracing::warn!(
                target: "ragkit::trace",
                error = %e,
                "failed to serialize trace record"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn in_memory_collector_keeps_order() {
        let collector = InMemoryTraceCollector::new();
        collector.record(TraceRecord::new("first", json!({})));
        collector.record(TraceRecord::new("second", json!({})));

        let names: Vec<_> = collector.records().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(collector.last().unwrap().name, "second");

        collector.clear();
        assert!(collector.is_empty());
    }

    #[test]
    fn shared_collector_through_arc() {
        let collector = Arc::new(InMemoryTraceCollector::new());
        let as_dyn: Arc<dyn TraceCollector> = collector.clone();
        as_dyn.record(TraceRecord::new("rag.answer", json!({"question": "q"})));
        assert_eq!(collector.len(), 1);
    }

    #[test]
    fn stage_timings_are_recorded_in_millis() {
        let mut record = TraceRecord::new("rag.answer", json!({}));
        record.push_stage("retrieve", Duration::from_micros(2_500));
        record.push_stage("generate", Duration::from_millis(40));
        assert_eq!(record.stage("retrieve").unwrap().latency_ms, 2);
        assert_eq!(record.stage("generate").unwrap().latency_ms, 40);
        assert!(record.stage("assemble").is_none());
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut record = TraceRecord::new("rag.answer", json!({"question": "What?"}));
        record.outputs = Some(json!({"answer": "That."}));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["name"], "rag.answer");
        assert!(json.get("error").is_none());

        let back: TraceRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn noop_and_log_collectors_accept_records() {
        NoopTraceCollector.record(TraceRecord::new("noop", json!(null)));
        LogTraceCollector.record(TraceRecord::new("log", json!(null)));
    }
}
