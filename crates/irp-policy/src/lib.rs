//! IRP Policy: Governance, Escalation, and Safety
//!
//! Rule-based gating for incident response pipelines: priority-ordered rule
//! evaluation with fault isolation, escalation dispatch, a fail-closed
//! semantic safety gate, and pattern screening of resolution actions.
//!
//! # Architecture
//!
//! ```text
//! Context snapshot → Semantic Guard → Rules (priority desc) → Evaluations
//!                         ↓                    ↓                   ↓
//!                   RiskClassifier      predicate faults      DENY / APPROVAL
//!                    (fail-closed)        → LOG entry          ESCALATE → handlers
//!                         └────────────────────┴───────────────────┘
//!                                              ↓
//!                                     Evaluation History
//!
//! resolution action/details → PolicyEnforcer → allowed | critical | warning
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use irp_core::{Context, TelemetryRecorder};
//! use irp_policy::{PolicyAction, PolicyEngine, PolicyRule};
//!
//! let engine = PolicyEngine::new(Arc::new(TelemetryRecorder::new()));
//! engine.add_rule(
//!     PolicyRule::new("prod_freeze", "Production freeze")
//!         .with_action(PolicyAction::Deny)
//!         .with_priority(10)
//!         .when_simple(|ctx| ctx.topology.environment.as_deref() == Some("production")),
//! );
//!
//! let ctx = Context::new().with_environment("production");
//! let evaluations = engine.evaluate(&ctx);
//! assert_eq!(engine.get_violations(&evaluations).len(), 1);
//! ```

pub mod condition;
pub mod enforcer;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod rule;
pub mod semantic;

pub use condition::{incident_response_rules, RuleCondition, RuleSpec};
pub use enforcer::{EnforcementResult, PolicyEnforcer, Severity};
pub use engine::{EscalationHandler, PolicyEngine, DEFAULT_ESCALATION_LEVEL};
pub use error::PolicyError;
pub use evaluation::{approval_required, violations, EscalationEvent, PolicyEvaluation, PolicyStats};
pub use rule::{EscalationLevel, PolicyAction, PolicyRule, Predicate};
pub use semantic::{
    classify_fail_closed, semantic_guard_rule, RiskClassifier, RiskVerdict,
    SEMANTIC_GUARD_PRIORITY, SEMANTIC_GUARD_RULE_ID,
};
