//! Unified Error Model
use std::any::Any;
use thiserror::Error;

/// Faults surfaced by [`crate::Agent::execute`].
#[derive(Error, Debug)]
pub enum AgentError {
    /// Lifecycle fault: the agent was stopped. Terminal, never recovered.
    #[error("AGENT/STOPPED: agent {agent_id} is stopped")]
    Stopped { agent_id: String },

    /// Business fault raised by the agent's `process` behaviour.
    #[error("AGENT/PROCESS: agent {agent_id} failed: {source}")]
    Process {
        agent_id: String,
        #[source]
        source: anyhow::Error,
    },
}

impl AgentError {
    /// Id of the agent that raised the fault
    pub fn agent_id(&self) -> &str {
        match self {
            AgentError::Stopped { agent_id } | AgentError::Process { agent_id, .. } => agent_id,
        }
    }

    /// Short fault type label used in telemetry payloads
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Stopped { .. } => "AgentStopped",
            AgentError::Process { .. } => "ProcessError",
        }
    }

    pub fn is_lifecycle(&self) -> bool {
        matches!(self, AgentError::Stopped { .. })
    }
}

/// Best-effort text of a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
