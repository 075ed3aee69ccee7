//! Policy engine
//!
//! Holds the rule registry, evaluates rules against a context snapshot in a
//! deterministic order, keeps the permanent evaluation history, and
//! dispatches escalation handlers for matched ESCALATE rules.
//!
//! Evaluation order: priority descending, ties broken by registration order
//! (first registered runs first). A predicate fault only affects its own
//! rule; the pass carries on.
//!
//! The engine is internally synchronised so it can be shared behind an
//! `Arc` between orchestrators and the composing application. One pass
//! appends its evaluations to the history as a contiguous block.

use irp_core::{tags, Context, EventType, LogLevel, Telemetry};
use serde_json::json;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::evaluation::{approval_required, violations, EscalationEvent, PolicyEvaluation, PolicyStats};
use crate::rule::{EscalationLevel, PolicyAction, PolicyRule};
use crate::semantic::{semantic_guard_rule, RiskClassifier, SEMANTIC_GUARD_RULE_ID};

/// Level used for ESCALATE rules registered without one
pub const DEFAULT_ESCALATION_LEVEL: EscalationLevel = EscalationLevel::Warning;

/// Callback invoked for escalation events of a given level
pub type EscalationHandler =
    Arc<dyn Fn(&EscalationEvent, &Context) -> anyhow::Result<()> + Send + Sync>;

struct RegisteredRule {
    seq: u64,
    rule: Arc<PolicyRule>,
}

#[derive(Default)]
struct RuleRegistry {
    rules: HashMap<String, RegisteredRule>,
    next_seq: u64,
}

struct NamedHandler {
    name: String,
    handler: EscalationHandler,
}

/// Rule-based policy engine
pub struct PolicyEngine {
    registry: RwLock<RuleRegistry>,
    handlers: RwLock<HashMap<EscalationLevel, Vec<NamedHandler>>>,
    history: Mutex<Vec<PolicyEvaluation>>,
    escalations: Mutex<Vec<EscalationEvent>>,
    telemetry: Arc<dyn Telemetry>,
}

impl PolicyEngine {
    /// Empty engine with no rules
    pub fn new(telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            registry: RwLock::new(RuleRegistry::default()),
            handlers: RwLock::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            escalations: Mutex::new(Vec::new()),
            telemetry,
        }
    }

    /// Register the built-in semantic safety rule backed by `classifier`
    pub fn with_semantic_guard(self, classifier: Arc<dyn RiskClassifier>) -> Self {
        self.add_rule(semantic_guard_rule(classifier));
        self
    }

    /// Register a rule. Re-using an id replaces the old rule and counts as
    /// a fresh registration for tie-breaking.
    pub fn add_rule(&self, rule: PolicyRule) {
        let mut registry = write(&self.registry);
        let seq = registry.next_seq;
        registry.next_seq += 1;
        tracing::debug!(rule_id = %rule.id, priority = rule.priority, action = %rule.action, "policy rule registered");
        registry.rules.insert(
            rule.id.clone(),
            RegisteredRule {
                seq,
                rule: Arc::new(rule),
            },
        );
    }

    /// Unregister a rule, returning it if it existed
    pub fn remove_rule(&self, rule_id: &str) -> Option<Arc<PolicyRule>> {
        let removed = write(&self.registry).rules.remove(rule_id);
        if removed.is_some() {
            tracing::debug!(rule_id, "policy rule removed");
        }
        removed.map(|r| r.rule)
    }

    pub fn get_rule(&self, rule_id: &str) -> Option<Arc<PolicyRule>> {
        read(&self.registry)
            .rules
            .get(rule_id)
            .map(|r| Arc::clone(&r.rule))
    }

    pub fn rule_count(&self) -> usize {
        read(&self.registry).rules.len()
    }

    /// All rules in evaluation order. The semantic guard always comes first,
    /// whatever its registration position.
    pub fn rules(&self) -> Vec<Arc<PolicyRule>> {
        let registry = read(&self.registry);
        let mut ordered: Vec<&RegisteredRule> = registry.rules.values().collect();
        ordered.sort_by(|a, b| {
            let guard = |r: &RegisteredRule| r.rule.id == SEMANTIC_GUARD_RULE_ID;
            guard(b)
                .cmp(&guard(a))
                .then(b.rule.priority.cmp(&a.rule.priority))
                .then(a.seq.cmp(&b.seq))
        });
        ordered.into_iter().map(|r| Arc::clone(&r.rule)).collect()
    }

    /// Register a named handler for escalations of `level`.
    ///
    /// Handlers for one level run in registration order.
    pub fn register_escalation_handler<F>(
        &self,
        level: EscalationLevel,
        name: impl Into<String>,
        handler: F,
    ) where
        F: Fn(&EscalationEvent, &Context) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        write(&self.handlers)
            .entry(level)
            .or_default()
            .push(NamedHandler {
                name: name.into(),
                handler: Arc::new(handler),
            });
    }

    /// Evaluate every registered rule against `context`
    pub fn evaluate(&self, context: &Context) -> Vec<PolicyEvaluation> {
        self.evaluate_where(context, |_| true)
    }

    /// Evaluate the rules selected by `filter`, in evaluation order.
    ///
    /// Every evaluation lands in the history; matched ESCALATE evaluations
    /// are dispatched to the handlers of their level.
    pub fn evaluate_where<F>(&self, context: &Context, filter: F) -> Vec<PolicyEvaluation>
    where
        F: Fn(&PolicyRule) -> bool,
    {
        let trace_id = context.telemetry.trace_id.as_str();
        let selected: Vec<Arc<PolicyRule>> =
            self.rules().into_iter().filter(|r| filter(r.as_ref())).collect();

        let evaluations: Vec<PolicyEvaluation> = selected
            .iter()
            .map(|rule| match rule.matches(context) {
                Ok(matched) => {
                    if matched {
                        self.telemetry.log(
                            LogLevel::Info,
                            &format!("policy rule '{}' matched ({})", rule.name, rule.action),
                            &tags([("rule_id", rule.id.as_str()), ("trace_id", trace_id)]),
                        );
                    }
                    PolicyEvaluation::from_outcome(rule, matched, trace_id)
                }
                Err(fault) => {
                    tracing::warn!(rule_id = %rule.id, error = %fault, "policy predicate failed");
                    PolicyEvaluation::from_fault(rule, &fault, trace_id)
                }
            })
            .collect();

        lock(&self.history).extend(evaluations.iter().cloned());

        for evaluation in evaluations.iter().filter(|e| e.is_escalation()) {
            self.escalate(evaluation, context);
        }

        evaluations
    }

    /// Evaluate only rules with the given action
    pub fn evaluate_action(&self, context: &Context, action: PolicyAction) -> Vec<PolicyEvaluation> {
        self.evaluate_where(context, |rule| rule.action == action)
    }

    /// Matched DENY evaluations
    pub fn get_violations<'a>(&self, evaluations: &'a [PolicyEvaluation]) -> Vec<&'a PolicyEvaluation> {
        violations(evaluations)
    }

    /// True iff a matched evaluation has action REQUIRE_APPROVAL
    pub fn check_approval_required(&self, evaluations: &[PolicyEvaluation]) -> bool {
        approval_required(evaluations)
    }

    /// Every evaluation recorded so far, oldest first
    pub fn evaluation_history(&self) -> Vec<PolicyEvaluation> {
        lock(&self.history).clone()
    }

    /// Every escalation dispatched so far, oldest first
    pub fn escalation_history(&self) -> Vec<EscalationEvent> {
        lock(&self.escalations).clone()
    }

    pub fn clear_history(&self) {
        lock(&self.history).clear();
        lock(&self.escalations).clear();
    }

    pub fn stats(&self) -> PolicyStats {
        PolicyStats::from_history(&lock(&self.history))
    }

    fn escalate(&self, evaluation: &PolicyEvaluation, context: &Context) -> EscalationEvent {
        let level = evaluation
            .escalation_level
            .unwrap_or(DEFAULT_ESCALATION_LEVEL);
        let mut event = EscalationEvent::new(evaluation, level, context.current_state());

        // Snapshot the handlers so a handler may register further handlers.
        let handlers: Vec<(String, EscalationHandler)> = read(&self.handlers)
            .get(&level)
            .map(|hs| {
                hs.iter()
                    .map(|h| (h.name.clone(), Arc::clone(&h.handler)))
                    .collect()
            })
            .unwrap_or_default();

        for (name, handler) in handlers {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(&event, context)))
                .unwrap_or_else(|payload| {
                    Err(anyhow::anyhow!(irp_core::panic_message(payload.as_ref())))
                });
            match outcome {
                Ok(()) => {
                    if !event.handled {
                        event.handled = true;
                        event.handler = Some(name);
                    }
                }
                Err(err) => {
                    tracing::warn!(handler = %name, rule_id = %event.rule_id, error = %err, "escalation handler failed");
                    event.failed_handlers.push(name);
                }
            }
        }

        let recorded = self.telemetry.record_event(
            EventType::Escalation,
            &context.telemetry.trace_id,
            &context.telemetry.span_id,
            Some(context.identity.agent_id.as_str()).filter(|id| !id.is_empty()),
            json!({
                "rule_id": event.rule_id,
                "level": event.level,
                "handled": event.handled,
                "handler": event.handler,
            }),
        );
        tracing::info!(
            event_id = %recorded.event_id,
            rule_id = %event.rule_id,
            level = %event.level,
            handled = event.handled,
            "escalation dispatched"
        );

        lock(&self.escalations).push(event.clone());
        event
    }
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("rules", &self.rule_count())
            .field("history", &lock(&self.history).len())
            .finish_non_exhaustive()
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
