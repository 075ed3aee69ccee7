//! Evaluation records
//!
//! Per-rule outcomes of an evaluation pass, escalation events, and summary
//! statistics over the evaluation history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rule::{EscalationLevel, PolicyAction, PolicyRule};

/// Outcome of one rule in one evaluation pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyEvaluation {
    pub rule_id: String,
    pub rule_name: String,
    pub matched: bool,
    pub action: PolicyAction,
    pub escalation_level: Option<EscalationLevel>,
    pub priority: i32,
    pub reason: String,
    /// Set when the predicate faulted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub trace_id: String,
    pub timestamp: DateTime<Utc>,
}

impl PolicyEvaluation {
    pub(crate) fn from_outcome(rule: &PolicyRule, matched: bool, trace_id: &str) -> Self {
        let reason = if matched {
            format!("rule '{}' matched: {}", rule.name, rule.description)
        } else {
            format!("rule '{}' did not match", rule.name)
        };
        Self {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            matched,
            action: rule.action,
            escalation_level: rule.escalation_level,
            priority: rule.priority,
            reason,
            error: None,
            trace_id: trace_id.to_string(),
            timestamp: Utc::now(),
        }
    }

    /// A predicate fault, downgraded to a non-matching LOG evaluation
    pub(crate) fn from_fault(rule: &PolicyRule, fault: &anyhow::Error, trace_id: &str) -> Self {
        Self {
            rule_id: rule.id.clone(),
            rule_name: rule.name.clone(),
            matched: false,
            action: PolicyAction::Log,
            escalation_level: None,
            priority: rule.priority,
            reason: format!("evaluation error: {}", fault),
            error: Some(fault.to_string()),
            trace_id: trace_id.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_violation(&self) -> bool {
        self.matched && self.action == PolicyAction::Deny
    }

    pub fn requires_approval(&self) -> bool {
        self.matched && self.action == PolicyAction::RequireApproval
    }

    pub fn is_escalation(&self) -> bool {
        self.matched && self.action == PolicyAction::Escalate
    }

    pub fn is_fault(&self) -> bool {
        self.error.is_some()
    }
}

/// Matched DENY evaluations
pub fn violations(evaluations: &[PolicyEvaluation]) -> Vec<&PolicyEvaluation> {
    evaluations.iter().filter(|e| e.is_violation()).collect()
}

/// Whether any matched evaluation demands approval
pub fn approval_required(evaluations: &[PolicyEvaluation]) -> bool {
    evaluations.iter().any(PolicyEvaluation::requires_approval)
}

/// Notification fired for a matched ESCALATE rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationEvent {
    pub event_id: String,
    pub rule_id: String,
    pub rule_name: String,
    pub level: EscalationLevel,
    pub message: String,
    pub trace_id: String,
    pub context_state: String,
    pub timestamp: DateTime<Utc>,
    /// True once at least one handler succeeded
    pub handled: bool,
    /// First handler that succeeded
    pub handler: Option<String>,
    #[serde(default)]
    pub failed_handlers: Vec<String>,
}

impl EscalationEvent {
    pub(crate) fn new(
        evaluation: &PolicyEvaluation,
        level: EscalationLevel,
        context_state: &str,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            rule_id: evaluation.rule_id.clone(),
            rule_name: evaluation.rule_name.clone(),
            level,
            message: evaluation.reason.clone(),
            trace_id: evaluation.trace_id.clone(),
            context_state: context_state.to_string(),
            timestamp: Utc::now(),
            handled: false,
            handler: None,
            failed_handlers: Vec::new(),
        }
    }
}

/// Summary of the evaluation history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyStats {
    pub total: usize,
    pub matched: usize,
    pub denied: usize,
    pub escalated: usize,
    pub approvals_required: usize,
    pub faulted: usize,
}

impl PolicyStats {
    pub fn from_history(history: &[PolicyEvaluation]) -> Self {
        Self {
            total: history.len(),
            matched: history.iter().filter(|e| e.matched).count(),
            denied: history.iter().filter(|e| e.is_violation()).count(),
            escalated: history.iter().filter(|e| e.is_escalation()).count(),
            approvals_required: history.iter().filter(|e| e.requires_approval()).count(),
            faulted: history.iter().filter(|e| e.is_fault()).count(),
        }
    }

    pub fn match_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.matched as f64 / self.total as f64
        }
    }
}
