//! IRP Core: Context, Agent lifecycle e Telemetry
//!
//! Shared data model threaded through every pipeline run, the lifecycle
//! wrapper around pluggable agent behaviour, and the telemetry contract the
//! rest of the workspace reports through.

pub mod agent;
pub mod context;
pub mod error;
pub mod telemetry;

pub use agent::{Agent, AgentHandle, AgentStatus, Executable, Process};
pub use context::{
    Annotation, Context, Dependencies, Identity, Knowledge, Payload, PolicyState, Relationship,
    Resource, Security, Session, State, StateTransition, Temporal, TelemetryState, Topology,
};
pub use error::{panic_message, AgentError};
pub use telemetry::{
    tags, EventType, LogLevel, MetricRecord, Tags, Telemetry, TelemetryEvent, TelemetryRecorder,
};

/// Versão do núcleo IRP
pub const IRP_VERSION: &str = "1.0.0";
