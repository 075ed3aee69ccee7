//! Agent lifecycle
//!
//! An [`Agent`] wraps a pluggable [`Process`] behaviour with a tri-state
//! status machine (RUNNING, PAUSED, STOPPED) and telemetry. Callers only ever
//! go through [`Agent::execute`].
//!
//! Pausing is cooperative: the status is checked right before `process`
//! runs. A paused agent blocks its caller, without timeout, until another
//! thread resumes or stops it through an [`AgentHandle`]. STOPPED is
//! terminal.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Instant;

use crate::context::Context;
use crate::error::{panic_message, AgentError};
use crate::telemetry::{tags, EventType, LogLevel, Telemetry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentStatus {
    Running,
    Paused,
    Stopped,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AgentStatus::Running => write!(f, "RUNNING"),
            AgentStatus::Paused => write!(f, "PAUSED"),
            AgentStatus::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// Business behaviour of an agent.
///
/// Receives the working context and returns the context the pipeline should
/// continue with. Implemented for any `Fn(Context) -> anyhow::Result<Context>`.
pub trait Process: Send + Sync {
    fn process(&self, context: Context) -> anyhow::Result<Context>;
}

impl<F> Process for F
where
    F: Fn(Context) -> anyhow::Result<Context> + Send + Sync,
{
    fn process(&self, context: Context) -> anyhow::Result<Context> {
        self(context)
    }
}

/// What the workflow orchestrator needs from a pipeline member
pub trait Executable: Send + Sync {
    fn id(&self) -> &str;

    /// Run against `context`, returning the context to continue with.
    ///
    /// On failure `context` holds the audit trail of the attempt.
    fn execute(&self, context: &mut Context) -> Result<Context, AgentError>;
}

struct StatusCell {
    status: Mutex<AgentStatus>,
    changed: Condvar,
}

/// Shared control over an agent's status.
///
/// Cloneable and `Send`, so a supervisor thread can pause, resume or stop an
/// agent while it is blocked inside `execute`.
#[derive(Clone)]
pub struct AgentHandle {
    agent_id: String,
    cell: Arc<StatusCell>,
}

impl AgentHandle {
    fn new(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            cell: Arc::new(StatusCell {
                status: Mutex::new(AgentStatus::Running),
                changed: Condvar::new(),
            }),
        }
    }

    pub fn status(&self) -> AgentStatus {
        *self.lock()
    }

    pub fn pause(&self) {
        self.transition(AgentStatus::Paused);
    }

    pub fn resume(&self) {
        self.transition(AgentStatus::Running);
    }

    pub fn stop(&self) {
        self.transition(AgentStatus::Stopped);
    }

    /// Block while paused; fail if stopped.
    ///
    /// There is no timeout: an agent left paused blocks the caller until
    /// someone resumes or stops it.
    pub fn wait_until_runnable(&self) -> Result<(), AgentError> {
        let mut status = self.lock();
        let mut announced = false;
        loop {
            match *status {
                AgentStatus::Running => return Ok(()),
                AgentStatus::Stopped => {
                    return Err(AgentError::Stopped {
                        agent_id: self.agent_id.clone(),
                    })
                }
                AgentStatus::Paused => {
                    if !announced {
                        tracing::info!(agent_id = %self.agent_id, "agent paused, waiting for resume");
                        announced = true;
                    }
                    status = self
                        .cell
                        .changed
                        .wait(status)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
            }
        }
    }

    fn transition(&self, next: AgentStatus) {
        let mut status = self.lock();
        if *status == AgentStatus::Stopped && next != AgentStatus::Stopped {
            tracing::warn!(agent_id = %self.agent_id, requested = %next, "agent is stopped; ignoring transition");
            return;
        }
        let current = *status;
        if current != next {
            tracing::info!(agent_id = %self.agent_id, from = %current, to = %next, "agent status changed");
        }
        *status = next;
        self.cell.changed.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, AgentStatus> {
        self.cell
            .status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Lifecycle wrapper around a [`Process`] behaviour
pub struct Agent {
    id: String,
    name: String,
    handle: AgentHandle,
    behavior: Box<dyn Process>,
    telemetry: Arc<dyn Telemetry>,
}

impl Agent {
    pub fn new(
        id: impl Into<String>,
        behavior: impl Process + 'static,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            handle: AgentHandle::new(&id),
            id,
            behavior: Box::new(behavior),
            telemetry,
        }
    }

    /// Set a human-readable name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> AgentStatus {
        self.handle.status()
    }

    /// Shared status control for other threads
    pub fn handle(&self) -> AgentHandle {
        self.handle.clone()
    }

    pub fn pause(&self) {
        self.handle.pause();
    }

    pub fn resume(&self) {
        self.handle.resume();
    }

    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Run the agent against `context`.
    ///
    /// Emits AGENT_START, waits out a pause, stamps the agent id on the
    /// context and hands a copy to the behaviour. The behaviour's context is
    /// returned on success (after AGENT_COMPLETE). On any fault AGENT_ERROR
    /// is emitted, `context` is moved to the `error` state, and the fault is
    /// returned to the caller.
    pub fn execute(&self, context: &mut Context) -> Result<Context, AgentError> {
        let started = Instant::now();
        let start_data = json!({ "agent_name": self.name, "state": context.state.current_state });
        self.emit(context, EventType::AgentStart, start_data);
        self.telemetry.log(
            LogLevel::Info,
            &format!("agent {} starting", self.id),
            &tags([
                ("agent_id", self.id.as_str()),
                ("trace_id", context.telemetry.trace_id.as_str()),
            ]),
        );

        let outcome = self.handle.wait_until_runnable().and_then(|()| {
            context.identity.agent_id = self.id.clone();
            self.run_behavior(context.clone())
        });

        match outcome {
            Ok(mut next) => {
                let elapsed_ms = started.elapsed().as_millis() as f64;
                self.emit(
                    &mut next,
                    EventType::AgentComplete,
                    json!({ "agent_name": self.name, "duration_ms": elapsed_ms }),
                );
                let metric = self.telemetry.record_metric(
                    "agent.duration_ms",
                    elapsed_ms,
                    &tags([("agent_id", self.id.as_str())]),
                );
                next.add_metric(metric);
                Ok(next)
            }
            Err(err) => {
                self.emit(
                    context,
                    EventType::AgentError,
                    json!({ "error_type": err.kind(), "error": err.to_string() }),
                );
                self.telemetry.log(
                    LogLevel::Error,
                    &format!("agent {} failed: {}", self.id, err),
                    &tags([("agent_id", self.id.as_str()), ("error_type", err.kind())]),
                );
                context.update_state(
                    "error",
                    json!({
                        "agent_id": self.id,
                        "error_type": err.kind(),
                        "error": err.to_string(),
                    }),
                );
                Err(err)
            }
        }
    }

    fn run_behavior(&self, context: Context) -> Result<Context, AgentError> {
        let result = catch_unwind(AssertUnwindSafe(|| self.behavior.process(context)))
            .unwrap_or_else(|payload| Err(anyhow::anyhow!(panic_message(payload.as_ref()))));

        result.map_err(|source| AgentError::Process {
            agent_id: self.id.clone(),
            source,
        })
    }

    // Telemetry collaborator first, then the context's own buffer.
    fn emit(&self, context: &mut Context, event_type: EventType, data: Value) {
        let event = self.telemetry.record_event(
            event_type,
            &context.telemetry.trace_id,
            &context.telemetry.span_id,
            Some(&self.id),
            data,
        );
        context.add_event(event);
    }
}

impl Executable for Agent {
    fn id(&self) -> &str {
        &self.id
    }

    fn execute(&self, context: &mut Context) -> Result<Context, AgentError> {
        Agent::execute(self, context)
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TelemetryRecorder;
    use std::thread;
    use std::time::Duration;

    fn recorder() -> Arc<TelemetryRecorder> {
        Arc::new(TelemetryRecorder::new())
    }

    fn writes_detections(mut ctx: Context) -> anyhow::Result<Context> {
        ctx.set_output("detections", json!(["cpu_spike"]));
        Ok(ctx)
    }

    #[test]
    fn test_initial_status_running() {
        let agent = Agent::new("detector", writes_detections, recorder());
        assert_eq!(agent.status(), AgentStatus::Running);
    }

    #[test]
    fn test_pause_is_idempotent() {
        let agent = Agent::new("detector", writes_detections, recorder());
        agent.pause();
        agent.pause();
        assert_eq!(agent.status(), AgentStatus::Paused);
        agent.resume();
        assert_eq!(agent.status(), AgentStatus::Running);
    }

    #[test]
    fn test_stop_is_terminal() {
        let agent = Agent::new("detector", writes_detections, recorder());
        agent.stop();
        agent.resume();
        agent.pause();
        assert_eq!(agent.status(), AgentStatus::Stopped);

        let mut ctx = Context::new();
        let err = agent.execute(&mut ctx).unwrap_err();
        assert!(matches!(err, AgentError::Stopped { .. }));
        assert!(err.is_lifecycle());
    }

    #[test]
    fn test_execute_sets_agent_id_and_events() {
        let telemetry = recorder();
        let agent = Agent::new("detector", writes_detections, telemetry.clone());
        let mut ctx = Context::new();

        let out = agent.execute(&mut ctx).unwrap();

        assert_eq!(out.identity.agent_id, "detector");
        assert_eq!(out.output("detections"), Some(&json!(["cpu_spike"])));
        let kinds: Vec<EventType> = out.telemetry.events.iter().map(|e| e.event_type).collect();
        assert_eq!(kinds, vec![EventType::AgentStart, EventType::AgentComplete]);
        assert_eq!(telemetry.events_of(EventType::AgentComplete).len(), 1);
        assert_eq!(telemetry.metrics().len(), 1);
    }

    #[test]
    fn test_process_error_marks_original_context() {
        let telemetry = recorder();
        let failing = |_ctx: Context| -> anyhow::Result<Context> { anyhow::bail!("model timeout") };
        let agent = Agent::new("triage", failing, telemetry.clone());
        let mut ctx = Context::new();

        let err = agent.execute(&mut ctx).unwrap_err();

        assert!(matches!(err, AgentError::Process { .. }));
        assert!(err.to_string().contains("model timeout"));
        assert_eq!(ctx.current_state(), "error");
        assert_eq!(ctx.state.history.last().unwrap().metadata["agent_id"], "triage");
        let kinds: Vec<EventType> = ctx.telemetry.events.iter().map(|e| e.event_type).collect();
        assert_eq!(kinds, vec![EventType::AgentStart, EventType::AgentError]);
        assert_eq!(telemetry.events_of(EventType::AgentError).len(), 1);
    }

    #[test]
    fn test_panicking_process_is_reported() {
        let panicking = |_ctx: Context| -> anyhow::Result<Context> { panic!("index out of range") };
        let agent = Agent::new("resolver", panicking, recorder());
        let mut ctx = Context::new();

        let err = agent.execute(&mut ctx).unwrap_err();
        assert!(err.to_string().contains("index out of range"));
        assert_eq!(ctx.current_state(), "error");
    }

    #[test]
    fn test_paused_agent_waits_for_resume() {
        let agent = Arc::new(Agent::new("auditor", writes_detections, recorder()));
        agent.pause();

        let handle = agent.handle();
        let resumer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            handle.resume();
        });

        let mut ctx = Context::new();
        let out = agent.execute(&mut ctx).unwrap();
        resumer.join().unwrap();

        assert_eq!(out.identity.agent_id, "auditor");
    }

    #[test]
    fn test_stop_while_paused_fails() {
        let agent = Arc::new(Agent::new("auditor", writes_detections, recorder()));
        agent.pause();

        let handle = agent.handle();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            handle.stop();
        });

        let mut ctx = Context::new();
        let err = agent.execute(&mut ctx).unwrap_err();
        stopper.join().unwrap();

        assert!(matches!(err, AgentError::Stopped { .. }));
        assert_eq!(ctx.current_state(), "error");
    }
}
