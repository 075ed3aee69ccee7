//! Declarative rules
//!
//! Rules described as data (YAML or JSON) instead of closures. A
//! [`RuleSpec`] lists [`RuleCondition`]s that must all hold; it compiles
//! into an ordinary [`PolicyRule`].
//!
//! ```yaml
//! id: prod_restricted
//! name: Restricted data in production
//! action: ESCALATE
//! escalation_level: CRITICAL
//! priority: 90
//! conditions:
//!   - type: classification
//!     value: restricted
//!   - type: environment
//!     value: production
//! ```

use irp_core::Context;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::PolicyError;
use crate::rule::{EscalationLevel, PolicyAction, PolicyRule};

/// A single test against a context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCondition {
    AccessLevel { value: String },
    Classification { value: String },
    Environment { value: String },
    StateIs { value: String },
    HasTag { value: String },
    LabelEquals { key: String, value: String },
    MissingApprover,
    OutputKeyPresent { key: String },
    InputFieldEquals { field: String, value: Value },
    Always,
}

impl RuleCondition {
    pub fn holds(&self, ctx: &Context) -> bool {
        match self {
            RuleCondition::AccessLevel { value } => ctx.security.access_level == *value,
            RuleCondition::Classification { value } => ctx.security.classification == *value,
            RuleCondition::Environment { value } => {
                ctx.topology.environment.as_deref() == Some(value.as_str())
            }
            RuleCondition::StateIs { value } => ctx.current_state() == value.as_str(),
            RuleCondition::HasTag { value } => ctx.annotation.tags.iter().any(|t| t == value),
            RuleCondition::LabelEquals { key, value } => {
                ctx.annotation.labels.get(key) == Some(value)
            }
            RuleCondition::MissingApprover => !ctx.has_approver(),
            RuleCondition::OutputKeyPresent { key } => ctx.output(key).is_some(),
            RuleCondition::InputFieldEquals { field, value } => ctx.input(field) == Some(value),
            RuleCondition::Always => true,
        }
    }
}

fn default_action() -> PolicyAction {
    PolicyAction::Log
}

/// Data form of a [`PolicyRule`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_action")]
    pub action: PolicyAction,
    #[serde(default)]
    pub escalation_level: Option<EscalationLevel>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    /// All must hold
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
}

impl RuleSpec {
    pub fn from_yaml(yaml: &str) -> Result<Self, PolicyError> {
        let spec: RuleSpec = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        let invalid = |reason: &str| PolicyError::InvalidRule {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id must not be empty"));
        }
        if self.conditions.is_empty() {
            return Err(invalid("at least one condition is required"));
        }
        Ok(())
    }

    /// Compile into a rule whose predicate ANDs the conditions
    pub fn into_rule(self) -> Result<PolicyRule, PolicyError> {
        self.validate()?;

        let mut rule = PolicyRule::new(self.id, self.name)
            .with_description(self.description)
            .with_action(self.action)
            .with_priority(self.priority);
        if let Some(level) = self.escalation_level {
            rule = rule.with_escalation(level);
        }
        for (key, value) in self.metadata {
            rule = rule.with_metadata(key, value);
        }

        let conditions = self.conditions;
        Ok(rule.when_simple(move |ctx| conditions.iter().all(|c| c.holds(ctx))))
    }
}

/// Bundled rule set for incident response pipelines
pub fn incident_response_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule::new("elevated_access_approval", "Elevated access requires approval")
            .with_description("Runs with elevated access need a recorded approver")
            .with_action(PolicyAction::RequireApproval)
            .with_priority(100)
            .when_simple(|ctx| ctx.security.access_level == "elevated"),
        PolicyRule::new("restricted_production", "Restricted data in production")
            .with_description("Restricted classification touching production")
            .with_action(PolicyAction::Escalate)
            .with_escalation(EscalationLevel::Critical)
            .with_priority(90)
            .when_simple(|ctx| {
                ctx.security.classification == "restricted"
                    && ctx.topology.environment.as_deref() == Some("production")
            }),
        PolicyRule::new("critical_incident", "Critical incident")
            .with_description("Incident reported with critical severity")
            .with_action(PolicyAction::Escalate)
            .with_escalation(EscalationLevel::Warning)
            .with_priority(80)
            .when_simple(|ctx| {
                ctx.input("severity").and_then(Value::as_str) == Some("critical")
            }),
        PolicyRule::new("audit_log", "Audit log")
            .with_description("Every run is recorded")
            .with_action(PolicyAction::Log)
            .with_priority(0)
            .when_simple(|_| true),
    ]
}
