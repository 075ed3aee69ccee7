//! Execution Context: shared record threaded through a pipeline run
//!
//! A [`Context`] is owned by exactly one in-flight run (or one debate round)
//! and is passed by reference through every step. It is composed of named
//! sub-records that evolve independently; see the field docs for who writes
//! what.
//!
//! Invariants:
//! - `telemetry.trace_id` never changes within one workflow invocation.
//! - `telemetry.span_id` only changes through [`Context::clone_for_child`].
//! - `state.history` is append-only.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use uuid::Uuid;

use crate::telemetry::{MetricRecord, TelemetryEvent};

/// Default session time-to-live, in seconds
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

/// Who is acting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Overwritten by each running agent
    pub agent_id: String,
    pub user_id: Option<String>,
    pub org_id: Option<String>,
    pub role: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// One entry of the append-only state log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: String,
    pub to_state: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub current_state: String,
    pub previous_state: Option<String>,
    #[serde(default)]
    pub history: Vec<StateTransition>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            current_state: "initialized".to_string(),
            previous_state: None,
            history: Vec::new(),
            metadata: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// Time-to-live in seconds; 0 disables expiry
    pub ttl_seconds: u64,
}

impl Default for Session {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            created_at: now,
            last_updated: now,
            ttl_seconds: DEFAULT_SESSION_TTL_SECS,
        }
    }
}

/// Trace coordinates plus the per-run event and metric buffers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryState {
    pub trace_id: String,
    pub span_id: String,
    pub parent_span_id: Option<String>,
    #[serde(default)]
    pub metrics: Vec<MetricRecord>,
    #[serde(default)]
    pub events: Vec<TelemetryEvent>,
}

impl Default for TelemetryState {
    fn default() -> Self {
        Self {
            trace_id: Uuid::new_v4().simple().to_string(),
            span_id: new_span_id(),
            parent_span_id: None,
            metrics: Vec::new(),
            events: Vec::new(),
        }
    }
}

/// Facts and their confidence scores, keyed identically
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Knowledge {
    #[serde(default)]
    pub facts: HashMap<String, Value>,
    #[serde(default)]
    pub confidence: HashMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Ordered, duplicates allowed
    #[serde(default)]
    pub tags: Vec<String>,
    /// Last write wins
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyState {
    #[serde(default)]
    pub applicable_policies: Vec<String>,
    #[serde(default)]
    pub approved: bool,
    pub approver: Option<String>,
}

/// Data flowing between agents.
///
/// `input_data` is read-only by convention. `output_data` is a single
/// additive map shared by every agent of the run; agents write under their
/// documented key (`detections`, `prioritized_issues`, ...), never under a
/// per-agent namespace.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default)]
    pub input_data: HashMap<String, Value>,
    #[serde(default)]
    pub output_data: HashMap<String, Value>,
    #[serde(default)]
    pub intermediate_results: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Security {
    pub classification: String,
    pub access_level: String,
    pub encryption_required: bool,
    pub audit_required: bool,
}

impl Default for Security {
    fn default() -> Self {
        Self {
            classification: "internal".to_string(),
            access_level: "standard".to_string(),
            encryption_required: false,
            audit_required: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub cpu_quota: Option<f64>,
    pub memory_quota_mb: Option<u64>,
    pub token_budget: Option<u64>,
    pub tokens_used: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Temporal {
    pub deadline: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub business_hours_only: bool,
}

/// Service graph around the incident
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dependencies {
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub upstream: Vec<String>,
    #[serde(default)]
    pub downstream: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub parent_context_id: Option<String>,
    #[serde(default)]
    pub child_context_ids: Vec<String>,
    #[serde(default)]
    pub related_incidents: Vec<String>,
}

/// Deployment coordinates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    pub environment: Option<String>,
    pub region: Option<String>,
    pub zone: Option<String>,
    pub cluster: Option<String>,
}

/// The record threaded through every operation of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context {
    pub identity: Identity,
    pub state: State,
    pub session: Session,
    pub telemetry: TelemetryState,
    pub knowledge: Knowledge,
    pub annotation: Annotation,
    pub policy: PolicyState,
    pub payload: Payload,
    pub security: Security,
    pub resource: Resource,
    pub temporal: Temporal,
    pub dependencies: Dependencies,
    pub relationship: Relationship,
    pub topology: Topology,
}

impl Context {
    /// Fresh context with a new session, trace and span
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: impl Into<String>, org_id: impl Into<String>) -> Self {
        self.identity.user_id = Some(user_id.into());
        self.identity.org_id = Some(org_id.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.identity.role = Some(role.into());
        self
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.identity.permissions.push(permission.into());
        self
    }

    pub fn with_input(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.input_data.insert(key.into(), value);
        self
    }

    pub fn with_output(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.output_data.insert(key.into(), value);
        self
    }

    pub fn with_access_level(mut self, level: impl Into<String>) -> Self {
        self.security.access_level = level.into();
        self
    }

    pub fn with_classification(mut self, classification: impl Into<String>) -> Self {
        self.security.classification = classification.into();
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.topology.environment = Some(environment.into());
        self
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.session.ttl_seconds = ttl_seconds;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.temporal.deadline = Some(deadline);
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.dependencies.services.push(service.into());
        self
    }

    /// Record a state transition.
    ///
    /// The transition is pushed onto the history before current/previous
    /// are updated, and the session's `last_updated` is bumped.
    pub fn update_state(&mut self, new_state: impl Into<String>, metadata: Value) {
        let new_state = new_state.into();
        let now = Utc::now();

        self.state.history.push(StateTransition {
            from_state: self.state.current_state.clone(),
            to_state: new_state.clone(),
            timestamp: now,
            metadata,
        });

        let previous = std::mem::replace(&mut self.state.current_state, new_state);
        self.state.previous_state = Some(previous);
        self.session.last_updated = now;
    }

    /// Current state label
    pub fn current_state(&self) -> &str {
        &self.state.current_state
    }

    /// Derive an isolated child context.
    ///
    /// Deep copy of the whole record, except that the child gets a new
    /// session id and span id, points back at this context through
    /// `parent_span_id` / `parent_context_id`, and starts with empty
    /// `output_data` and `intermediate_results`. Input, identity and security
    /// carry over unchanged; the trace id is shared. `created_at` is kept so
    /// the child lives inside the parent's TTL window.
    pub fn clone_for_child(&self) -> Context {
        let mut child = self.clone();
        let now = Utc::now();

        child.session.session_id = Uuid::new_v4().to_string();
        child.session.last_updated = now;

        child.telemetry.parent_span_id = Some(self.telemetry.span_id.clone());
        child.telemetry.span_id = new_span_id();

        child.relationship.parent_context_id = Some(self.session.session_id.clone());
        child.relationship.child_context_ids.clear();

        child.payload.output_data.clear();
        child.payload.intermediate_results.clear();

        child
    }

    /// Fold a child's results back into this context.
    ///
    /// - output keys absent here are copied in; keys holding lists on both
    ///   sides are concatenated (ours first, no dedup); any other collision
    ///   keeps the existing value
    /// - telemetry events and annotation tags are concatenated
    /// - annotation labels are overwritten by the child
    pub fn merge_child(&mut self, child: &Context) {
        for (key, value) in &child.payload.output_data {
            match self.payload.output_data.get_mut(key) {
                None => {
                    self.payload.output_data.insert(key.clone(), value.clone());
                }
                Some(Value::Array(existing)) => {
                    if let Value::Array(incoming) = value {
                        existing.extend(incoming.iter().cloned());
                    }
                }
                Some(_) => {}
            }
        }

        self.telemetry
            .events
            .extend(child.telemetry.events.iter().cloned());
        self.annotation
            .tags
            .extend(child.annotation.tags.iter().cloned());
        for (key, value) in &child.annotation.labels {
            self.annotation.labels.insert(key.clone(), value.clone());
        }

        if !self
            .relationship
            .child_context_ids
            .contains(&child.session.session_id)
        {
            self.relationship
                .child_context_ids
                .push(child.session.session_id.clone());
        }
    }

    pub fn set_output(&mut self, key: impl Into<String>, value: Value) {
        self.payload.output_data.insert(key.into(), value);
    }

    pub fn output(&self, key: &str) -> Option<&Value> {
        self.payload.output_data.get(key)
    }

    pub fn input(&self, key: &str) -> Option<&Value> {
        self.payload.input_data.get(key)
    }

    pub fn set_intermediate(&mut self, key: impl Into<String>, value: Value) {
        self.payload.intermediate_results.insert(key.into(), value);
    }

    /// Store a fact together with its confidence score
    pub fn add_fact(&mut self, key: impl Into<String>, value: Value, confidence: f64) {
        let key = key.into();
        self.knowledge.confidence.insert(key.clone(), confidence.clamp(0.0, 1.0));
        self.knowledge.facts.insert(key, value);
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.annotation.tags.push(tag.into());
    }

    pub fn set_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.annotation.labels.insert(key.into(), value.into());
    }

    pub fn add_note(&mut self, note: impl Into<String>) {
        self.annotation.notes.push(note.into());
    }

    /// Record a human approval
    pub fn approve(&mut self, approver: impl Into<String>) {
        self.policy.approved = true;
        self.policy.approver = Some(approver.into());
    }

    pub fn has_approver(&self) -> bool {
        self.policy.approver.as_deref().is_some_and(|a| !a.is_empty())
    }

    pub fn add_event(&mut self, event: TelemetryEvent) {
        self.telemetry.events.push(event);
    }

    pub fn add_metric(&mut self, metric: MetricRecord) {
        self.telemetry.metrics.push(metric);
    }

    /// Whether the session outlived its TTL at `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        if self.session.ttl_seconds == 0 {
            return false;
        }
        let Some(ttl) = i64::try_from(self.session.ttl_seconds)
            .ok()
            .and_then(Duration::try_seconds)
        else {
            return false;
        };
        match self.session.created_at.checked_add_signed(ttl) {
            Some(deadline) => now > deadline,
            None => false,
        }
    }

    /// The intent the run is pursuing: `input_data.intent`, else the current state
    pub fn intent(&self) -> String {
        self.payload
            .input_data
            .get("intent")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.state.current_state.clone())
    }

    /// Input payload as a JSON object
    pub fn input_snapshot(&self) -> Value {
        json!(self.payload.input_data)
    }

    /// Whole-context JSON view
    pub fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

fn new_span_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(16);
    id
}
