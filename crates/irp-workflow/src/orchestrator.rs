//! Workflow orchestrator
//!
//! Runs agents over a shared context behind a pre-pipeline policy gate.
//!
//! Sequential mode: the gate can halt the run before any agent starts
//! (`policy_violation`, `awaiting_approval`). Once agents run, every
//! successful step is followed by a full policy evaluation that is only
//! recorded, never acted upon.
//!
//! Parallel mode: groups run one after another; each agent of a group
//! works on its own child clone, and the children are merged back into
//! the base in list order before the next group starts. Nothing actually
//! runs concurrently.

use chrono::Utc;
use irp_core::{tags, Context, EventType, Executable, LogLevel, Telemetry};
use irp_policy::{PolicyAction, PolicyEngine};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

use crate::proof::{output_digest, StepOutcome, StepRecord, WorkflowRun};

pub const STATE_POLICY_VIOLATION: &str = "policy_violation";
pub const STATE_AWAITING_APPROVAL: &str = "awaiting_approval";
pub const STATE_WORKFLOW_FAILED: &str = "workflow_failed";
pub const STATE_WORKFLOW_COMPLETE: &str = "workflow_complete";
pub const STATE_PARALLEL_COMPLETE: &str = "parallel_workflow_complete";

/// A group of agents whose members each get an isolated child context
pub type AgentGroup = Vec<Arc<dyn Executable>>;

pub struct WorkflowOrchestrator {
    name: String,
    agents: Vec<Arc<dyn Executable>>,
    policy_engine: Arc<PolicyEngine>,
    telemetry: Arc<dyn Telemetry>,
}

impl WorkflowOrchestrator {
    pub fn new(policy_engine: Arc<PolicyEngine>, telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            name: "workflow".to_string(),
            agents: Vec::new(),
            policy_engine,
            telemetry,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_agent(mut self, agent: Arc<dyn Executable>) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn add_agent(&mut self, agent: Arc<dyn Executable>) {
        self.agents.push(agent);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn agent_ids(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.id()).collect()
    }

    pub fn policy_engine(&self) -> &Arc<PolicyEngine> {
        &self.policy_engine
    }

    /// Run the registered agents in order, returning the terminal context
    pub fn execute(&self, initial: Context, stop_on_error: bool) -> Context {
        self.execute_with_report(initial, stop_on_error).into_context()
    }

    pub fn execute_with_report(&self, initial: Context, stop_on_error: bool) -> WorkflowRun {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut context = initial;
        let mut steps = Vec::new();

        self.emit(
            &mut context,
            EventType::WorkflowStart,
            json!({ "workflow": self.name, "mode": "sequential", "agents": self.agent_ids() }),
        );

        if self.gate(&mut context) {
            return self.finish(context, steps, started_at, clock);
        }

        for agent in &self.agents {
            let in_hash = output_digest(&context);
            let step_clock = Instant::now();

            match agent.execute(&mut context) {
                Ok(next) => {
                    context = next;
                    steps.push(StepRecord {
                        agent_id: agent.id().to_string(),
                        group: None,
                        in_hash,
                        out_hash: output_digest(&context),
                        latency_ms: elapsed_ms(step_clock),
                        outcome: StepOutcome::Completed,
                    });
                    self.audit_step(&mut context, agent.id());
                }
                Err(err) => {
                    tracing::error!(
                        workflow = %self.name,
                        agent_id = %agent.id(),
                        error = %err,
                        "agent failed"
                    );
                    steps.push(StepRecord {
                        agent_id: agent.id().to_string(),
                        group: None,
                        out_hash: in_hash.clone(),
                        in_hash,
                        latency_ms: elapsed_ms(step_clock),
                        outcome: StepOutcome::Failed {
                            error: err.to_string(),
                        },
                    });

                    if stop_on_error {
                        context.update_state(
                            STATE_WORKFLOW_FAILED,
                            json!({
                                "agent_id": err.agent_id(),
                                "error": err.to_string(),
                            }),
                        );
                        return self.finish(context, steps, started_at, clock);
                    }
                }
            }
        }

        context.update_state(
            STATE_WORKFLOW_COMPLETE,
            json!({ "agents_run": steps.iter().filter(|s| s.is_completed()).count() }),
        );
        self.finish(context, steps, started_at, clock)
    }

    /// Run `groups` one after another with isolate-then-merge semantics
    pub fn execute_parallel(&self, initial: Context, groups: &[AgentGroup]) -> Context {
        self.execute_parallel_with_report(initial, groups).into_context()
    }

    pub fn execute_parallel_with_report(&self, initial: Context, groups: &[AgentGroup]) -> WorkflowRun {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut context = initial;
        let mut steps = Vec::new();

        let layout: Vec<Vec<&str>> = groups
            .iter()
            .map(|g| g.iter().map(|a| a.id()).collect())
            .collect();
        self.emit(
            &mut context,
            EventType::WorkflowStart,
            json!({ "workflow": self.name, "mode": "parallel", "groups": layout }),
        );

        for (index, group) in groups.iter().enumerate() {
            let mut children = Vec::with_capacity(group.len());

            for agent in group {
                let mut child = context.clone_for_child();
                let in_hash = output_digest(&child);
                let step_clock = Instant::now();

                match agent.execute(&mut child) {
                    Ok(done) => {
                        steps.push(StepRecord {
                            agent_id: agent.id().to_string(),
                            group: Some(index),
                            in_hash,
                            out_hash: output_digest(&done),
                            latency_ms: elapsed_ms(step_clock),
                            outcome: StepOutcome::Completed,
                        });
                        children.push(done);
                    }
                    Err(err) => {
                        tracing::warn!(
                            workflow = %self.name,
                            group = index,
                            agent_id = %agent.id(),
                            error = %err,
                            "agent failed, dropping its contribution"
                        );
                        steps.push(StepRecord {
                            agent_id: agent.id().to_string(),
                            group: Some(index),
                            out_hash: in_hash.clone(),
                            in_hash,
                            latency_ms: elapsed_ms(step_clock),
                            outcome: StepOutcome::Failed {
                                error: err.to_string(),
                            },
                        });
                    }
                }
            }

            for child in &children {
                context.merge_child(child);
            }
            tracing::debug!(group = index, merged = children.len(), "group merged");
        }

        context.update_state(STATE_PARALLEL_COMPLETE, json!({ "groups": groups.len() }));
        self.finish(context, steps, started_at, clock)
    }

    // Returns true when the run must stop before any agent.
    fn gate(&self, context: &mut Context) -> bool {
        let engine = &self.policy_engine;

        let denials = engine.evaluate_action(context, PolicyAction::Deny);
        let violations = engine.get_violations(&denials);
        if !violations.is_empty() {
            let names: Vec<&str> = violations.iter().map(|e| e.rule_name.as_str()).collect();
            let ids: Vec<&str> = violations.iter().map(|e| e.rule_id.as_str()).collect();
            self.telemetry.log(
                LogLevel::Warning,
                &format!("workflow {} blocked by policy: {}", self.name, names.join(", ")),
                &tags([("workflow", self.name.as_str()), ("trace_id", context.telemetry.trace_id.as_str())]),
            );
            let metadata = json!({ "violations": names, "rule_ids": ids });
            context.update_state(STATE_POLICY_VIOLATION, metadata);
            return true;
        }

        let approvals = engine.evaluate_action(context, PolicyAction::RequireApproval);
        if engine.check_approval_required(&approvals) && !context.has_approver() {
            let rules: Vec<&str> = approvals
                .iter()
                .filter(|e| e.requires_approval())
                .map(|e| e.rule_name.as_str())
                .collect();
            self.telemetry.log(
                LogLevel::Info,
                &format!("workflow {} awaiting approval", self.name),
                &tags([("workflow", self.name.as_str()), ("trace_id", context.telemetry.trace_id.as_str())]),
            );
            let metadata = json!({ "rules": rules });
            context.update_state(STATE_AWAITING_APPROVAL, metadata);
            return true;
        }

        false
    }

    // Observational only: matches are recorded, the run carries on.
    fn audit_step(&self, context: &mut Context, agent_id: &str) {
        let evaluations = self.policy_engine.evaluate(context);
        for evaluation in evaluations.iter().filter(|e| e.matched) {
            self.emit(
                context,
                EventType::PolicyEvaluation,
                json!({
                    "after_agent": agent_id,
                    "rule_id": evaluation.rule_id,
                    "rule_name": evaluation.rule_name,
                    "action": evaluation.action,
                }),
            );
        }
    }

    fn finish(
        &self,
        mut context: Context,
        steps: Vec<StepRecord>,
        started_at: chrono::DateTime<Utc>,
        clock: Instant,
    ) -> WorkflowRun {
        let duration_ms = elapsed_ms(clock);
        let data = json!({
            "workflow": self.name,
            "final_state": context.current_state(),
            "steps": steps.len(),
            "duration_ms": duration_ms,
        });
        self.emit(&mut context, EventType::WorkflowComplete, data);
        tracing::info!(
            workflow = %self.name,
            trace_id = %context.telemetry.trace_id,
            final_state = %context.current_state(),
            steps = steps.len(),
            duration_ms,
            "workflow finished"
        );

        WorkflowRun {
            workflow: self.name.clone(),
            context,
            steps,
            started_at,
            duration_ms,
        }
    }

    fn emit(&self, context: &mut Context, event_type: EventType, data: Value) {
        let event = self.telemetry.record_event(
            event_type,
            &context.telemetry.trace_id,
            &context.telemetry.span_id,
            None,
            data,
        );
        context.add_event(event);
    }
}

impl std::fmt::Debug for WorkflowOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("WorkflowOrchestrator")
            .field("name", &self.name)
            .field("agents", &self.agent_ids())
            .finish_non_exhaustive()
    }
}

fn elapsed_ms(clock: Instant) -> u64 {
    clock.elapsed().as_millis() as u64
}
