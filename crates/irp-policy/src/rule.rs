//! Individual policy rules
//!
//! A rule pairs a predicate over a [`Context`] with the action to take when
//! it matches. Rules are evaluated by the [`crate::PolicyEngine`] in
//! descending priority order.

use irp_core::{panic_message, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Predicate deciding whether a rule matches a context snapshot
pub type Predicate = Arc<dyn Fn(&Context) -> anyhow::Result<bool> + Send + Sync>;

/// What to do when a rule matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyAction {
    Allow,
    Deny,
    Escalate,
    Log,
    RequireApproval,
}

impl fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PolicyAction::Allow => write!(f, "ALLOW"),
            PolicyAction::Deny => write!(f, "DENY"),
            PolicyAction::Escalate => write!(f, "ESCALATE"),
            PolicyAction::Log => write!(f, "LOG"),
            PolicyAction::RequireApproval => write!(f, "REQUIRE_APPROVAL"),
        }
    }
}

/// Escalation severity, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationLevel {
    Info,
    Warning,
    Critical,
    Emergency,
}

impl fmt::Display for EscalationLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EscalationLevel::Info => write!(f, "INFO"),
            EscalationLevel::Warning => write!(f, "WARNING"),
            EscalationLevel::Critical => write!(f, "CRITICAL"),
            EscalationLevel::Emergency => write!(f, "EMERGENCY"),
        }
    }
}

/// A single policy rule
#[derive(Clone)]
pub struct PolicyRule {
    /// Unique identifier for the rule
    pub id: String,

    /// Human-readable name
    pub name: String,

    /// Description of what the rule checks
    pub description: String,

    /// Action taken when the predicate matches
    pub action: PolicyAction,

    /// Routing level for ESCALATE rules
    pub escalation_level: Option<EscalationLevel>,

    /// Higher runs first
    pub priority: i32,

    /// Free-form metadata
    pub metadata: HashMap<String, Value>,

    predicate: Predicate,
}

impl PolicyRule {
    /// Create a new rule. Until a predicate is set it never matches.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            action: PolicyAction::Log,
            escalation_level: None,
            priority: 0,
            metadata: HashMap::new(),
            predicate: Arc::new(|_| Ok(false)),
        }
    }

    /// Set description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Set the predicate
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Context) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.predicate = Arc::new(predicate);
        self
    }

    /// Set an infallible predicate
    pub fn when_simple<F>(self, predicate: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.when(move |ctx| Ok(predicate(ctx)))
    }

    pub fn with_action(mut self, action: PolicyAction) -> Self {
        self.action = action;
        self
    }

    pub fn with_escalation(mut self, level: EscalationLevel) -> Self {
        self.escalation_level = Some(level);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Run the predicate, turning a panic into an error
    pub fn matches(&self, context: &Context) -> anyhow::Result<bool> {
        catch_unwind(AssertUnwindSafe(|| (self.predicate)(context)))
            .unwrap_or_else(|payload| Err(anyhow::anyhow!(panic_message(payload.as_ref()))))
    }
}

impl fmt::Debug for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PolicyRule")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("action", &self.action)
            .field("escalation_level", &self.escalation_level)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}
