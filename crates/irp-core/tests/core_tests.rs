//! Integration tests for irp-core.
//!
//! Context lineage across clone/merge and the agent lifecycle as seen from
//! a supervising thread.

use irp_core::{Agent, AgentError, AgentStatus, Context, EventType, TelemetryRecorder};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn echo(ctx: Context) -> anyhow::Result<Context> {
    Ok(ctx)
}

// =============================================================================
// Context Lineage
// =============================================================================

#[test]
fn test_clone_for_child_lineage() {
    let mut parent = Context::new()
        .with_user("u-1", "org-1")
        .with_classification("confidential")
        .with_input("alert", json!("disk_full"))
        .with_output("detections", json!(["disk_full"]));
    parent.set_intermediate("scratch", json!(1));

    let child = parent.clone_for_child();

    assert_ne!(child.session.session_id, parent.session.session_id);
    assert_ne!(child.telemetry.span_id, parent.telemetry.span_id);
    assert_eq!(child.telemetry.trace_id, parent.telemetry.trace_id);
    assert_eq!(child.telemetry.parent_span_id.as_ref(), Some(&parent.telemetry.span_id));
    assert_eq!(
        child.relationship.parent_context_id.as_ref(),
        Some(&parent.session.session_id)
    );
    assert!(child.payload.output_data.is_empty());
    assert!(child.payload.intermediate_results.is_empty());
    assert_eq!(child.input("alert"), Some(&json!("disk_full")));
    assert_eq!(child.identity, parent.identity);
    assert_eq!(child.security, parent.security);
}

#[test]
fn test_grandchild_keeps_trace() {
    let root = Context::new();
    let child = root.clone_for_child();
    let grandchild = child.clone_for_child();

    assert_eq!(grandchild.telemetry.trace_id, root.telemetry.trace_id);
    assert_eq!(grandchild.telemetry.parent_span_id.as_ref(), Some(&child.telemetry.span_id));
}

#[test]
fn test_merge_children_in_order() {
    let mut base = Context::new().with_output("x", json!([1]));

    let mut a = base.clone_for_child();
    a.set_output("x", json!([2]));
    a.set_output("only_a", json!("a"));
    let mut b = base.clone_for_child();
    b.set_output("x", json!([3]));
    b.set_output("only_a", json!("b"));

    base.merge_child(&a);
    base.merge_child(&b);

    assert_eq!(base.output("x"), Some(&json!([1, 2, 3])));
    assert_eq!(base.output("only_a"), Some(&json!("a")));
    assert_eq!(
        base.relationship.child_context_ids,
        vec![a.session.session_id.clone(), b.session.session_id.clone()]
    );
}

#[test]
fn test_state_history_is_append_only() {
    let mut ctx = Context::new();
    ctx.update_state("detecting", json!({}));
    ctx.update_state("triaging", json!({"issues": 2}));

    let history: Vec<(&str, &str)> = ctx
        .state
        .history
        .iter()
        .map(|t| (t.from_state.as_str(), t.to_state.as_str()))
        .collect();
    assert_eq!(
        history,
        vec![("initialized", "detecting"), ("detecting", "triaging")]
    );
    assert_eq!(ctx.state.previous_state.as_deref(), Some("detecting"));
}

// =============================================================================
// Agent Lifecycle
// =============================================================================

#[test]
fn test_paused_agent_blocks_until_resumed() {
    let telemetry = Arc::new(TelemetryRecorder::new());
    let agent = Arc::new(Agent::new("triage", echo, telemetry.clone()));
    agent.pause();

    let finished = Arc::new(AtomicBool::new(false));
    let worker = {
        let agent = agent.clone();
        let finished = finished.clone();
        thread::spawn(move || {
            let mut ctx = Context::new();
            let result = agent.execute(&mut ctx);
            finished.store(true, Ordering::SeqCst);
            result
        })
    };

    thread::sleep(Duration::from_millis(100));
    assert!(!finished.load(Ordering::SeqCst));
    assert_eq!(telemetry.events_of(EventType::AgentStart).len(), 1);

    agent.handle().resume();
    let out = worker.join().unwrap().unwrap();
    assert_eq!(out.identity.agent_id, "triage");
    assert_eq!(agent.status(), AgentStatus::Running);
}

#[test]
fn test_stop_while_paused_fails_execute() {
    let agent = Arc::new(Agent::new("resolver", echo, Arc::new(TelemetryRecorder::new())));
    agent.pause();

    let handle = agent.handle();
    let worker = {
        let agent = agent.clone();
        thread::spawn(move || {
            let mut ctx = Context::new();
            let result = agent.execute(&mut ctx);
            (result, ctx)
        })
    };

    thread::sleep(Duration::from_millis(50));
    handle.stop();
    handle.resume();

    let (result, ctx) = worker.join().unwrap();
    assert!(matches!(result, Err(AgentError::Stopped { .. })));
    assert_eq!(ctx.current_state(), "error");
    assert_eq!(agent.status(), AgentStatus::Stopped);
}
