//! IRP Workflow: Encadeia agentes com gate de política
//!
//! ```text
//! Context → Policy Gate ──(DENY)──────────→ policy_violation
//!               │      └─(APPROVAL, no approver)→ awaiting_approval
//!               ↓
//!           Agent 1 → audit eval → Agent 2 → audit eval → … → workflow_complete
//!               │ fault + stop_on_error
//!               └──────────────────────────────────────────→ workflow_failed
//! ```
//!
//! Every step yields a [`StepRecord`] with blake3 digests of the output map
//! before and after the agent ran.

pub mod orchestrator;
pub mod proof;

pub use orchestrator::{
    AgentGroup, WorkflowOrchestrator, STATE_AWAITING_APPROVAL, STATE_PARALLEL_COMPLETE,
    STATE_POLICY_VIOLATION, STATE_WORKFLOW_COMPLETE, STATE_WORKFLOW_FAILED,
};
pub use proof::{output_digest, StepOutcome, StepRecord, WorkflowRun};
