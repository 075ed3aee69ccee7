//! Personas and the reasoning collaborator they speak through.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::position::{DebateIssue, DebatePosition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    /// Minimises blast radius
    Cautious,
    /// Restores service fast
    Aggressive,
    /// Neutral synthesis of the final positions
    Arbitrator,
}

impl Persona {
    pub fn agent_id(self) -> &'static str {
        match self {
            Persona::Cautious => "cautious_agent",
            Persona::Aggressive => "aggressive_agent",
            Persona::Arbitrator => "arbitrator_agent",
        }
    }

    pub fn stance(self) -> &'static str {
        match self {
            Persona::Cautious => "conservative",
            Persona::Aggressive => "aggressive",
            Persona::Arbitrator => "neutral",
        }
    }

    fn brief(self) -> &'static str {
        match self {
            Persona::Cautious => {
                "You are a cautious incident responder. Prefer reversible, low-risk actions \
                 and protect data integrity over speed."
            }
            Persona::Aggressive => {
                "You are an aggressive incident responder. Prefer decisive actions that \
                 restore service quickly, accepting moderate risk."
            }
            Persona::Arbitrator => {
                "You are a neutral arbitrator. Weigh both positions and decide on exactly \
                 one action."
            }
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Persona::Cautious => write!(f, "cautious"),
            Persona::Aggressive => write!(f, "aggressive"),
            Persona::Arbitrator => write!(f, "arbitrator"),
        }
    }
}

/// Structured proposal: an action label plus free-form details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub action: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl Proposal {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: Value) -> Self {
        self.details.insert(key.into(), value);
        self
    }
}

/// What a persona returns for one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaResponse {
    pub proposal: Proposal,
    pub argument: String,
    pub confidence: f64,
}

/// The opposing position a persona is asked to rebut
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rebuttal {
    pub agent_id: String,
    pub proposal: Proposal,
    pub argument: String,
}

impl From<&DebatePosition> for Rebuttal {
    fn from(position: &DebatePosition) -> Self {
        Self {
            agent_id: position.agent_id.clone(),
            proposal: position.proposal.clone(),
            argument: position.argument.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRequest {
    pub persona: Persona,
    pub round: u32,
    pub issue: DebateIssue,
    pub opponent: Option<Rebuttal>,
}

impl PositionRequest {
    /// Text prompt for the reasoning service
    pub fn render(&self) -> String {
        let mut prompt = format!(
            "{}\n\nIssue: {} ({})\nSeverity: {}\nDetails: {}\n",
            self.persona.brief(),
            self.issue.rule_name,
            self.issue.rule_id,
            self.issue.severity,
            self.issue.details,
        );
        if let Some(opponent) = &self.opponent {
            prompt.push_str(&format!(
                "\n{} proposed '{}': {}\nRebut this position or revise your own.\n",
                opponent.agent_id, opponent.proposal.action, opponent.argument,
            ));
        }
        prompt.push_str(
            "\nRespond with JSON: {\"proposal\": {\"action\": ...}, \"argument\": ..., \"confidence\": 0.0-1.0}",
        );
        prompt
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrationRequest {
    pub issue: DebateIssue,
    pub cautious: DebatePosition,
    pub aggressive: DebatePosition,
    pub consensus_reached: bool,
    pub convergence_score: f64,
}

impl ArbitrationRequest {
    pub fn render(&self) -> String {
        format!(
            "{}\n\nIssue: {} ({})\nSeverity: {}\n\n\
             Cautious position '{}' (confidence {:.2}): {}\n\
             Aggressive position '{}' (confidence {:.2}): {}\n\
             Convergence: {:.2}\n\n\
             Respond with JSON: {{\"action\": ..., ...details}}",
            Persona::Arbitrator.brief(),
            self.issue.rule_name,
            self.issue.rule_id,
            self.issue.severity,
            self.cautious.proposal.action,
            self.cautious.confidence,
            self.cautious.argument,
            self.aggressive.proposal.action,
            self.aggressive.confidence,
            self.aggressive.argument,
            self.convergence_score,
        )
    }
}

/// External reasoning service that voices the personas
pub trait PersonaReasoner: Send + Sync {
    fn argue(&self, request: &PositionRequest) -> anyhow::Result<PersonaResponse>;

    fn arbitrate(&self, request: &ArbitrationRequest) -> anyhow::Result<Proposal>;
}
