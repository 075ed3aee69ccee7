//! Integration tests for irp-workflow.
//!
//! Full pipelines over real agents, policy engine and telemetry recorder.

use irp_core::{Agent, Context, EventType, Executable, TelemetryRecorder};
use irp_policy::{EscalationLevel, PolicyAction, PolicyEngine, PolicyRule};
use irp_workflow::{
    AgentGroup, StepOutcome, WorkflowOrchestrator, STATE_AWAITING_APPROVAL,
    STATE_PARALLEL_COMPLETE, STATE_POLICY_VIOLATION, STATE_WORKFLOW_COMPLETE,
    STATE_WORKFLOW_FAILED,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Harness {
    telemetry: Arc<TelemetryRecorder>,
    engine: Arc<PolicyEngine>,
    calls: Arc<AtomicUsize>,
}

impl Harness {
    fn new() -> Self {
        let telemetry = Arc::new(TelemetryRecorder::new());
        let engine = Arc::new(PolicyEngine::new(telemetry.clone()));
        Self {
            telemetry,
            engine,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn orchestrator(&self) -> WorkflowOrchestrator {
        WorkflowOrchestrator::new(self.engine.clone(), self.telemetry.clone())
    }

    /// Agent writing `value` under `key`, counting invocations
    fn writer(&self, id: &str, key: &'static str, value: Value) -> Arc<dyn Executable> {
        let calls = self.calls.clone();
        let behavior = move |mut ctx: Context| -> anyhow::Result<Context> {
            calls.fetch_add(1, Ordering::SeqCst);
            ctx.set_output(key, value.clone());
            Ok(ctx)
        };
        Arc::new(Agent::new(id, behavior, self.telemetry.clone()))
    }

    fn failing(&self, id: &str) -> Arc<dyn Executable> {
        let calls = self.calls.clone();
        let behavior = move |mut ctx: Context| -> anyhow::Result<Context> {
            calls.fetch_add(1, Ordering::SeqCst);
            ctx.set_output("partial", json!(true));
            anyhow::bail!("reasoning service unavailable")
        };
        Arc::new(Agent::new(id, behavior, self.telemetry.clone()))
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Policy Gate
// =============================================================================

#[test]
fn test_awaiting_approval_runs_no_agent() {
    let h = Harness::new();
    h.engine.add_rule(
        PolicyRule::new("elevated_access", "Elevated access requires approval")
            .with_action(PolicyAction::RequireApproval)
            .when_simple(|ctx| ctx.security.access_level == "elevated"),
    );
    let orchestrator = h
        .orchestrator()
        .with_agent(h.writer("detect", "detections", json!(["cpu"])));

    let ctx = orchestrator.execute(Context::new().with_access_level("elevated"), false);

    assert_eq!(ctx.current_state(), STATE_AWAITING_APPROVAL);
    assert_eq!(h.calls(), 0);
    assert!(h.telemetry.events_of(EventType::AgentStart).is_empty());
}

#[test]
fn test_deny_gate_fails_fast() {
    let h = Harness::new();
    h.engine.add_rule(
        PolicyRule::new("freeze", "Change freeze")
            .with_action(PolicyAction::Deny)
            .when_simple(|_| true),
    );
    let orchestrator = h
        .orchestrator()
        .with_agent(h.writer("detect", "detections", json!([])))
        .with_agent(h.writer("triage", "prioritized_issues", json!([])));

    let run = orchestrator.execute_with_report(Context::new(), false);

    assert_eq!(run.final_state(), STATE_POLICY_VIOLATION);
    assert_eq!(h.calls(), 0);
    assert!(run.steps.is_empty());
    let transition = run.context.state.history.last().unwrap();
    assert_eq!(transition.metadata["violations"], json!(["Change freeze"]));
}

#[test]
fn test_deny_checked_before_approval() {
    let h = Harness::new();
    h.engine.add_rule(
        PolicyRule::new("approval", "Approval")
            .with_action(PolicyAction::RequireApproval)
            .with_priority(100)
            .when_simple(|_| true),
    );
    h.engine.add_rule(
        PolicyRule::new("deny", "Deny")
            .with_action(PolicyAction::Deny)
            .when_simple(|_| true),
    );

    let ctx = h.orchestrator().execute(Context::new(), false);
    assert_eq!(ctx.current_state(), STATE_POLICY_VIOLATION);
}

#[test]
fn test_mid_pipeline_escalations_fire_handlers() {
    let h = Harness::new();
    h.engine.add_rule(
        PolicyRule::new("sev1", "Severity one detected")
            .with_action(PolicyAction::Escalate)
            .with_escalation(EscalationLevel::Critical)
            .when_simple(|ctx| ctx.output("detections").is_some()),
    );
    let paged = Arc::new(AtomicUsize::new(0));
    let counter = paged.clone();
    h.engine
        .register_escalation_handler(EscalationLevel::Critical, "pager", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

    let orchestrator = h
        .orchestrator()
        .with_agent(h.writer("detect", "detections", json!(["db_down"])))
        .with_agent(h.writer("audit", "audit_report", json!({})));
    let ctx = orchestrator.execute(Context::new(), false);

    assert_eq!(ctx.current_state(), STATE_WORKFLOW_COMPLETE);
    assert_eq!(paged.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Agent Faults
// =============================================================================

#[test]
fn test_stop_on_error_halts() {
    let h = Harness::new();
    let orchestrator = h
        .orchestrator()
        .with_agent(h.writer("detect", "detections", json!([])))
        .with_agent(h.failing("triage"))
        .with_agent(h.writer("resolve", "resolution_results", json!([])));

    let run = orchestrator.execute_with_report(Context::new(), true);

    assert_eq!(run.final_state(), STATE_WORKFLOW_FAILED);
    assert_eq!(h.calls(), 2);
    assert!(run.context.output("resolution_results").is_none());
    let transition = run.context.state.history.last().unwrap();
    assert_eq!(transition.metadata["agent_id"], "triage");
    assert!(transition.metadata["error"]
        .as_str()
        .unwrap()
        .contains("reasoning service unavailable"));
    assert_eq!(run.failed_steps().len(), 1);
}

#[test]
fn test_fault_skipped_without_stop_on_error() {
    let h = Harness::new();
    let orchestrator = h
        .orchestrator()
        .with_agent(h.writer("detect", "detections", json!([])))
        .with_agent(h.failing("triage"))
        .with_agent(h.writer("resolve", "resolution_results", json!([])));

    let run = orchestrator.execute_with_report(Context::new(), false);
    let ctx = &run.context;

    assert_eq!(ctx.current_state(), STATE_WORKFLOW_COMPLETE);
    assert_eq!(h.calls(), 3);
    assert!(ctx.output("detections").is_some());
    assert!(ctx.output("partial").is_none());
    assert!(ctx.output("resolution_results").is_some());

    let states: Vec<&str> = ctx
        .state
        .history
        .iter()
        .map(|t| t.to_state.as_str())
        .collect();
    assert_eq!(states, vec!["error", STATE_WORKFLOW_COMPLETE]);

    let failed = &run.steps[1];
    assert!(matches!(failed.outcome, StepOutcome::Failed { .. }));
    assert!(failed.is_noop());
}

#[test]
fn test_stopped_agent_fails_workflow() {
    let h = Harness::new();
    let agent = Arc::new(Agent::new(
        "detect",
        |ctx: Context| -> anyhow::Result<Context> { Ok(ctx) },
        h.telemetry.clone(),
    ));
    agent.stop();
    let orchestrator = h.orchestrator().with_agent(agent);

    let ctx = orchestrator.execute(Context::new(), true);
    assert_eq!(ctx.current_state(), STATE_WORKFLOW_FAILED);
}

// =============================================================================
// Parallel Groups
// =============================================================================

#[test]
fn test_parallel_merge_preserves_order() {
    let h = Harness::new();
    let groups: Vec<AgentGroup> = vec![vec![
        h.writer("a", "x", json!([2])),
        h.writer("b", "x", json!([3])),
    ]];
    let base = Context::new().with_output("x", json!([1]));

    let ctx = h.orchestrator().execute_parallel(base, &groups);

    assert_eq!(ctx.current_state(), STATE_PARALLEL_COMPLETE);
    assert_eq!(ctx.output("x"), Some(&json!([1, 2, 3])));
    assert_eq!(ctx.relationship.child_context_ids.len(), 2);
}

#[test]
fn test_parallel_groups_see_previous_merge() {
    let h = Harness::new();
    let seen = Arc::new(std::sync::Mutex::new(None));
    let probe = seen.clone();
    let reader: Arc<dyn Executable> = Arc::new(Agent::new(
        "reader",
        move |ctx: Context| -> anyhow::Result<Context> {
            *probe.lock().unwrap() = Some(ctx.output("detections").is_some());
            Ok(ctx)
        },
        h.telemetry.clone(),
    ));

    let groups: Vec<AgentGroup> = vec![
        vec![h.writer("detect", "detections", json!(["disk_full"]))],
        vec![reader],
    ];
    let ctx = h.orchestrator().execute_parallel(Context::new(), &groups);

    // children start with an empty output map
    assert_eq!(*seen.lock().unwrap(), Some(false));
    assert_eq!(ctx.output("detections"), Some(&json!(["disk_full"])));
}

#[test]
fn test_parallel_fault_drops_only_that_agent() {
    let h = Harness::new();
    let groups: Vec<AgentGroup> = vec![vec![
        h.writer("a", "x", json!([1])),
        h.failing("b"),
        h.writer("c", "y", json!("ok")),
    ]];

    let run = h
        .orchestrator()
        .execute_parallel_with_report(Context::new(), &groups);

    assert_eq!(run.final_state(), STATE_PARALLEL_COMPLETE);
    assert_eq!(run.context.output("x"), Some(&json!([1])));
    assert_eq!(run.context.output("y"), Some(&json!("ok")));
    assert!(run.context.output("partial").is_none());
    assert_eq!(run.failed_steps().len(), 1);
    assert!(run.steps.iter().all(|s| s.group == Some(0)));
}

#[test]
fn test_parallel_labels_last_child_wins() {
    let h = Harness::new();
    let labeler = |id: &str, value: &'static str| -> Arc<dyn Executable> {
        Arc::new(Agent::new(
            id,
            move |mut ctx: Context| -> anyhow::Result<Context> {
                ctx.set_label("owner", value);
                ctx.add_tag("touched");
                Ok(ctx)
            },
            h.telemetry.clone(),
        ))
    };
    let groups: Vec<AgentGroup> = vec![vec![labeler("a", "dba"), labeler("b", "sre")]];

    let ctx = h.orchestrator().execute_parallel(Context::new(), &groups);

    assert_eq!(ctx.annotation.labels.get("owner").map(String::as_str), Some("sre"));
    assert_eq!(ctx.annotation.tags, vec!["touched", "touched"]);
}
