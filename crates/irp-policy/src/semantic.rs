//! Semantic safety gate
//!
//! Built-in DENY rule that asks an external natural-language risk
//! classifier whether the run's intent and input are safe. It sits above
//! every other rule and fails closed: if the classifier cannot be reached,
//! errors, or panics, the verdict is BLOCK.

use irp_core::{panic_message, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::rule::{EscalationLevel, PolicyAction, PolicyRule};

pub const SEMANTIC_GUARD_RULE_ID: &str = "semantic_safety_guard";

/// Fixed priority of the guard. The engine also orders the guard ahead of
/// any rule sharing this priority, regardless of registration order.
pub const SEMANTIC_GUARD_PRIORITY: i32 = i32::MAX;

/// Binary verdict of the risk classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskVerdict {
    Safe,
    Block,
}

impl fmt::Display for RiskVerdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RiskVerdict::Safe => write!(f, "SAFE"),
            RiskVerdict::Block => write!(f, "BLOCK"),
        }
    }
}

/// External natural-language risk classification service
pub trait RiskClassifier: Send + Sync {
    fn classify(&self, intent: &str, payload: &Value) -> anyhow::Result<RiskVerdict>;
}

impl<F> RiskClassifier for F
where
    F: Fn(&str, &Value) -> anyhow::Result<RiskVerdict> + Send + Sync,
{
    fn classify(&self, intent: &str, payload: &Value) -> anyhow::Result<RiskVerdict> {
        self(intent, payload)
    }
}

/// Ask `classifier` about `context`, defaulting to BLOCK on any fault
pub fn classify_fail_closed(classifier: &dyn RiskClassifier, context: &Context) -> RiskVerdict {
    let intent = context.intent();
    let payload = context.input_snapshot();

    let outcome = catch_unwind(AssertUnwindSafe(|| classifier.classify(&intent, &payload)))
        .unwrap_or_else(|panic| Err(anyhow::anyhow!(panic_message(panic.as_ref()))));

    match outcome {
        Ok(verdict) => {
            tracing::debug!(%intent, %verdict, "semantic classification");
            verdict
        }
        Err(err) => {
            tracing::warn!(%intent, error = %err, "risk classifier unavailable, blocking");
            RiskVerdict::Block
        }
    }
}

/// The built-in guard rule: DENY with CRITICAL escalation, matches on BLOCK
pub fn semantic_guard_rule(classifier: Arc<dyn RiskClassifier>) -> PolicyRule {
    PolicyRule::new(SEMANTIC_GUARD_RULE_ID, "Semantic Safety Guard")
        .with_description("Natural-language risk classification of intent and input")
        .with_action(PolicyAction::Deny)
        .with_escalation(EscalationLevel::Critical)
        .with_priority(SEMANTIC_GUARD_PRIORITY)
        .with_metadata("fail_closed", Value::Bool(true))
        .when_simple(move |ctx| classify_fail_closed(classifier.as_ref(), ctx) == RiskVerdict::Block)
}
