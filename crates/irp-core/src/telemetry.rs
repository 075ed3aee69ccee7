//! Telemetry contract
//!
//! The core reports through the [`Telemetry`] trait and never assumes a
//! storage or transport. [`TelemetryRecorder`] is the default implementation:
//! it forwards log lines to `tracing` and keeps bounded in-memory buffers of
//! the events and metrics it was asked to record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use uuid::Uuid;

/// Free-form key/value tags attached to log lines and metrics
pub type Tags = BTreeMap<String, String>;

/// Default capacity of the recorder buffers
pub const DEFAULT_BUFFER_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warning => write!(f, "warning"),
            LogLevel::Error => write!(f, "error"),
            LogLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Kinds of telemetry events emitted by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    AgentStart,
    AgentComplete,
    AgentError,
    PolicyEvaluation,
    Escalation,
    WorkflowStart,
    WorkflowComplete,
    DebateRound,
    DebateComplete,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            EventType::AgentStart => "AGENT_START",
            EventType::AgentComplete => "AGENT_COMPLETE",
            EventType::AgentError => "AGENT_ERROR",
            EventType::PolicyEvaluation => "POLICY_EVALUATION",
            EventType::Escalation => "ESCALATION",
            EventType::WorkflowStart => "WORKFLOW_START",
            EventType::WorkflowComplete => "WORKFLOW_COMPLETE",
            EventType::DebateRound => "DEBATE_ROUND",
            EventType::DebateComplete => "DEBATE_COMPLETE",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub trace_id: String,
    pub span_id: String,
    pub agent_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
}

impl TelemetryEvent {
    pub fn new(
        event_type: EventType,
        trace_id: impl Into<String>,
        span_id: impl Into<String>,
        agent_id: Option<&str>,
        data: Value,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type,
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            agent_id: agent_id.map(str::to_string),
            timestamp: Utc::now(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub tags: Tags,
    pub timestamp: DateTime<Utc>,
}

/// Telemetry collaborator consumed by the core
pub trait Telemetry: Send + Sync {
    fn log(&self, level: LogLevel, message: &str, tags: &Tags);

    fn record_event(
        &self,
        event_type: EventType,
        trace_id: &str,
        span_id: &str,
        agent_id: Option<&str>,
        data: Value,
    ) -> TelemetryEvent;

    fn record_metric(&self, name: &str, value: f64, tags: &Tags) -> MetricRecord;
}

/// Build a [`Tags`] map from string pairs
pub fn tags<const N: usize>(pairs: [(&str, &str); N]) -> Tags {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Default telemetry: `tracing` output plus bounded in-memory buffers
pub struct TelemetryRecorder {
    events: Mutex<VecDeque<TelemetryEvent>>,
    metrics: Mutex<VecDeque<MetricRecord>>,
    capacity: usize,
}

impl TelemetryRecorder {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    /// Keep at most `capacity` events and `capacity` metrics; oldest are dropped first
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            metrics: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Recorded events, oldest first
    pub fn events(&self) -> Vec<TelemetryEvent> {
        lock(&self.events).iter().cloned().collect()
    }

    pub fn events_of(&self, event_type: EventType) -> Vec<TelemetryEvent> {
        lock(&self.events)
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn metrics(&self) -> Vec<MetricRecord> {
        lock(&self.metrics).iter().cloned().collect()
    }

    pub fn clear(&self) {
        lock(&self.events).clear();
        lock(&self.metrics).clear();
    }
}

impl Default for TelemetryRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry for TelemetryRecorder {
    fn log(&self, level: LogLevel, message: &str, tags: &Tags) {
        match level {
            LogLevel::Debug => tracing::debug!(?tags, "{}", message),
            LogLevel::Info => tracing::info!(?tags, "{}", message),
            LogLevel::Warning => tracing::warn!(?tags, "{}", message),
            LogLevel::Error => tracing::error!(?tags, "{}", message),
            LogLevel::Critical => tracing::error!(?tags, critical = true, "{}", message),
        }
    }

    fn record_event(
        &self,
        event_type: EventType,
        trace_id: &str,
        span_id: &str,
        agent_id: Option<&str>,
        data: Value,
    ) -> TelemetryEvent {
        let event = TelemetryEvent::new(event_type, trace_id, span_id, agent_id, data);
        tracing::debug!(
            event_type = %event.event_type,
            trace_id = %event.trace_id,
            span_id = %event.span_id,
            agent_id = ?event.agent_id,
            "telemetry event"
        );

        let mut events = lock(&self.events);
        events.push_back(event.clone());
        while events.len() > self.capacity {
            events.pop_front();
        }
        event
    }

    fn record_metric(&self, name: &str, value: f64, tags: &Tags) -> MetricRecord {
        let metric = MetricRecord {
            name: name.to_string(),
            value,
            tags: tags.clone(),
            timestamp: Utc::now(),
        };

        let mut metrics = lock(&self.metrics);
        metrics.push_back(metric.clone());
        while metrics.len() > self.capacity {
            metrics.pop_front();
        }
        metric
    }
}

// A poisoned buffer still holds valid records; keep serving them.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_event_buffers() {
        let recorder = TelemetryRecorder::new();
        let event = recorder.record_event(
            EventType::AgentStart,
            "trace",
            "span",
            Some("detector"),
            json!({"k": 1}),
        );

        assert_eq!(event.agent_id.as_deref(), Some("detector"));
        assert_eq!(recorder.events().len(), 1);
        assert_eq!(recorder.events_of(EventType::AgentStart).len(), 1);
        assert!(recorder.events_of(EventType::AgentError).is_empty());
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let recorder = TelemetryRecorder::with_capacity(2);
        for i in 0..3 {
            recorder.record_metric("latency_ms", i as f64, &Tags::new());
        }
        let values: Vec<f64> = recorder.metrics().iter().map(|m| m.value).collect();
        assert_eq!(values, vec![1.0, 2.0]);
    }

    #[test]
    fn test_event_type_serializes_screaming() {
        let v = serde_json::to_value(EventType::PolicyEvaluation).unwrap();
        assert_eq!(v, json!("POLICY_EVALUATION"));
        assert_eq!(EventType::AgentComplete.to_string(), "AGENT_COMPLETE");
    }

    #[test]
    fn test_tags_helper() {
        let t = tags([("agent_id", "a1"), ("state", "ok")]);
        assert_eq!(t.len(), 2);
        assert_eq!(t["agent_id"], "a1");
    }

    #[test]
    fn test_clear() {
        let recorder = TelemetryRecorder::new();
        recorder.record_metric("m", 1.0, &Tags::new());
        recorder.record_event(EventType::WorkflowStart, "t", "s", None, Value::Null);
        recorder.clear();
        assert!(recorder.events().is_empty());
        assert!(recorder.metrics().is_empty());
    }
}
