//! IRP Debate: consenso adversarial entre personas
//!
//! A cautious and an aggressive persona argue over one contentious issue
//! for a bounded number of rounds; a neutral arbitrator then settles on a
//! single decision. Every persona speaks through a [`PersonaReasoner`], and
//! any fault it raises is absorbed: a failed position becomes an
//! `investigate` fallback, a failed arbitration adopts the cautious
//! proposal. A debate always terminates with a decision.

pub mod error;
pub mod orchestrator;
pub mod persona;
pub mod position;

pub use error::DebateError;
pub use orchestrator::{convergence, scoring, DebateConfig, DebateOrchestrator};
pub use persona::{
    ArbitrationRequest, Persona, PersonaReasoner, PersonaResponse, PositionRequest, Proposal,
    Rebuttal,
};
pub use position::{DebateIssue, DebatePosition, DebateResult, DebateRound, FALLBACK_ACTION};
