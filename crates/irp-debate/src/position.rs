//! Debate records: the issue, positions, rounds and the final result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::persona::{Persona, PersonaResponse, Proposal};

/// Action proposed when a persona could not produce a position
pub const FALLBACK_ACTION: &str = "investigate";

/// The contentious decision under debate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateIssue {
    pub rule_id: String,
    pub rule_name: String,
    pub severity: String,
    #[serde(default)]
    pub details: Value,
}

impl DebateIssue {
    pub fn new(
        rule_id: impl Into<String>,
        rule_name: impl Into<String>,
        severity: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            rule_name: rule_name.into(),
            severity: severity.into(),
            details: Value::Null,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebatePosition {
    pub agent_id: String,
    pub stance: String,
    pub proposal: Proposal,
    pub argument: String,
    pub round: u32,
    pub confidence: f64,
}

impl DebatePosition {
    pub(crate) fn from_response(persona: Persona, round: u32, response: PersonaResponse) -> Self {
        Self {
            agent_id: persona.agent_id().to_string(),
            stance: persona.stance().to_string(),
            proposal: response.proposal,
            argument: response.argument,
            round,
            confidence: response.confidence.clamp(0.0, 1.0),
        }
    }

    pub(crate) fn fallback(persona: Persona, round: u32, fault: &anyhow::Error) -> Self {
        Self {
            agent_id: persona.agent_id().to_string(),
            stance: persona.stance().to_string(),
            proposal: Proposal::new(FALLBACK_ACTION),
            argument: format!("position unavailable: {}", fault),
            round,
            confidence: 0.0,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.confidence == 0.0 && self.proposal.action == FALLBACK_ACTION
    }

    pub(crate) fn transcript_line(&self) -> String {
        format!(
            "[round {}] {} proposes '{}' (confidence {:.2}): {}",
            self.round + 1,
            self.agent_id,
            self.proposal.action,
            self.confidence,
            self.argument
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateRound {
    pub round: u32,
    pub cautious: DebatePosition,
    pub aggressive: DebatePosition,
    pub convergence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateResult {
    pub debate_id: String,
    pub issue: DebateIssue,
    pub consensus_reached: bool,
    pub final_decision: Proposal,
    /// Rounds actually run
    pub debate_rounds: u32,
    /// Convergence of the last round
    pub convergence_score: f64,
    pub rounds: Vec<DebateRound>,
    pub transcript: Vec<String>,
    /// blake3 digest of the transcript
    pub digest: String,
    /// Set when arbitration failed and the cautious proposal was adopted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arbitration_error: Option<String>,
}

impl DebateResult {
    pub fn final_positions(&self) -> Option<(&DebatePosition, &DebatePosition)> {
        self.rounds.last().map(|r| (&r.cautious, &r.aggressive))
    }

    pub fn summary_line(&self) -> String {
        let status = if self.consensus_reached {
            "CONSENSUS"
        } else {
            "ARBITRATED"
        };
        format!(
            "[{}] {} rounds | convergence={:.2} | decision={} | issue={}",
            status,
            self.debate_rounds,
            self.convergence_score,
            self.final_decision.action,
            self.issue.rule_id
        )
    }
}

pub(crate) fn transcript_digest(lines: &[String]) -> String {
    format!("blake3:{}", blake3::hash(lines.join("\n").as_bytes()))
}
