//! Debate orchestrator: drives the cautious → aggressive round loop and the
//! final arbitration.
//!
//! Round `n`:
//! 1. cautious persona argues; from round 1 on it sees the aggressive
//!    position of round `n - 1` only
//! 2. aggressive persona argues against the cautious position of round `n`
//! 3. convergence of the two proposed actions is scored; at or above the
//!    threshold the loop stops early
//!
//! The arbitrator always runs once on the last pair of positions, whether
//! or not consensus was reached.

use irp_core::{panic_message, EventType, Telemetry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::DebateError;
use crate::persona::{ArbitrationRequest, Persona, PersonaReasoner, PositionRequest, Proposal, Rebuttal};
use crate::position::{transcript_digest, DebateIssue, DebatePosition, DebateResult, DebateRound};

/// Convergence scoring tiers
pub mod scoring {
    pub const EXACT_MATCH: f64 = 0.9;
    pub const SUBSTRING_MATCH: f64 = 0.6;
    pub const DIVERGENT: f64 = 0.3;
}

/// Similarity of two proposed actions
pub fn convergence(a: &str, b: &str) -> f64 {
    if a == b {
        scoring::EXACT_MATCH
    } else if a.contains(b) || b.contains(a) {
        scoring::SUBSTRING_MATCH
    } else {
        scoring::DIVERGENT
    }
}

fn default_max_rounds() -> u32 {
    3
}

fn default_threshold() -> f64 {
    0.8
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateConfig {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default = "default_threshold")]
    pub convergence_threshold: f64,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            convergence_threshold: default_threshold(),
        }
    }
}

impl DebateConfig {
    pub fn validate(&self) -> Result<(), DebateError> {
        if self.max_rounds == 0 {
            return Err(DebateError::InvalidConfig(
                "max_rounds must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.convergence_threshold) {
            return Err(DebateError::InvalidConfig(format!(
                "convergence_threshold must lie in [0, 1], got {}",
                self.convergence_threshold
            )));
        }
        Ok(())
    }
}

pub struct DebateOrchestrator {
    config: DebateConfig,
    reasoner: Arc<dyn PersonaReasoner>,
    telemetry: Arc<dyn Telemetry>,
}

impl DebateOrchestrator {
    pub fn new(
        config: DebateConfig,
        reasoner: Arc<dyn PersonaReasoner>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Result<Self, DebateError> {
        config.validate()?;
        Ok(Self {
            config,
            reasoner,
            telemetry,
        })
    }

    pub fn config(&self) -> &DebateConfig {
        &self.config
    }

    /// Debate `issue` under a fresh trace
    pub fn debate(&self, issue: DebateIssue) -> DebateResult {
        let trace_id = Uuid::new_v4().simple().to_string();
        self.debate_traced(issue, &trace_id, "debate")
    }

    /// Debate `issue`, reporting telemetry under an existing trace
    pub fn debate_traced(&self, issue: DebateIssue, trace_id: &str, span_id: &str) -> DebateResult {
        let debate_id = Uuid::new_v4().to_string();
        let mut rounds: Vec<DebateRound> = Vec::new();
        let mut transcript = vec![format!(
            "Debate {} on {} ({}), severity {}",
            debate_id, issue.rule_name, issue.rule_id, issue.severity
        )];
        let mut consensus_reached = false;

        tracing::info!(%debate_id, rule_id = %issue.rule_id, max_rounds = self.config.max_rounds, "debate started");

        for round in 0..self.config.max_rounds {
            let opponent = rounds.last().map(|r| Rebuttal::from(&r.aggressive));
            let cautious = self.position(Persona::Cautious, round, &issue, opponent);

            let opponent = Some(Rebuttal::from(&cautious));
            let aggressive = self.position(Persona::Aggressive, round, &issue, opponent);

            let score = convergence(&cautious.proposal.action, &aggressive.proposal.action);
            transcript.push(cautious.transcript_line());
            transcript.push(aggressive.transcript_line());
            transcript.push(format!("[round {}] convergence {:.2}", round + 1, score));

            self.record(
                EventType::DebateRound,
                trace_id,
                span_id,
                json!({
                    "debate_id": debate_id,
                    "round": round,
                    "cautious_action": cautious.proposal.action,
                    "aggressive_action": aggressive.proposal.action,
                    "convergence": score,
                }),
            );
            tracing::debug!(%debate_id, round, convergence = score, "debate round complete");

            rounds.push(DebateRound {
                round,
                cautious,
                aggressive,
                convergence: score,
            });

            if score >= self.config.convergence_threshold {
                consensus_reached = true;
                break;
            }
        }

        let convergence_score = rounds.last().map(|r| r.convergence).unwrap_or(0.0);
        let (final_decision, arbitration_error) = match rounds.last() {
            Some(last) => self.arbitrate(&issue, last, consensus_reached),
            None => (Proposal::new(crate::position::FALLBACK_ACTION), None),
        };
        transcript.push(match &arbitration_error {
            None => format!("[arbitration] decision '{}'", final_decision.action),
            Some(err) => format!(
                "[arbitration] failed ({}), adopting cautious proposal '{}'",
                err, final_decision.action
            ),
        });

        let debate_rounds = rounds.len() as u32;
        let digest = transcript_digest(&transcript);
        self.record(
            EventType::DebateComplete,
            trace_id,
            span_id,
            json!({
                "debate_id": debate_id,
                "consensus_reached": consensus_reached,
                "rounds": debate_rounds,
                "convergence": convergence_score,
                "decision": final_decision.action,
                "digest": digest,
            }),
        );
        tracing::info!(
            %debate_id,
            consensus_reached,
            rounds = debate_rounds,
            decision = %final_decision.action,
            "debate finished"
        );

        DebateResult {
            debate_id,
            issue,
            consensus_reached,
            final_decision,
            debate_rounds,
            convergence_score,
            rounds,
            transcript,
            digest,
            arbitration_error,
        }
    }

    fn position(
        &self,
        persona: Persona,
        round: u32,
        issue: &DebateIssue,
        opponent: Option<Rebuttal>,
    ) -> DebatePosition {
        let request = PositionRequest {
            persona,
            round,
            issue: issue.clone(),
            opponent,
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| self.reasoner.argue(&request)))
            .unwrap_or_else(|payload| Err(anyhow::anyhow!(panic_message(payload.as_ref()))));

        match outcome {
            Ok(response) => DebatePosition::from_response(persona, round, response),
            Err(err) => {
                tracing::warn!(%persona, round, error = %err, "persona failed, using fallback position");
                DebatePosition::fallback(persona, round, &err)
            }
        }
    }

    // Falls back to the cautious proposal on any fault.
    fn arbitrate(
        &self,
        issue: &DebateIssue,
        last: &DebateRound,
        consensus_reached: bool,
    ) -> (Proposal, Option<String>) {
        let request = ArbitrationRequest {
            issue: issue.clone(),
            cautious: last.cautious.clone(),
            aggressive: last.aggressive.clone(),
            consensus_reached,
            convergence_score: last.convergence,
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| self.reasoner.arbitrate(&request)))
            .unwrap_or_else(|payload| Err(anyhow::anyhow!(panic_message(payload.as_ref()))));

        match outcome {
            Ok(decision) => (decision, None),
            Err(err) => {
                tracing::warn!(error = %err, "arbitration failed, adopting cautious proposal");
                let reason = err.to_string();
                let decision = last
                    .cautious
                    .proposal
                    .clone()
                    .with_detail("arbitration_error", Value::String(reason.clone()));
                (decision, Some(reason))
            }
        }
    }

    fn record(&self, event_type: EventType, trace_id: &str, span_id: &str, data: Value) {
        self.telemetry
            .record_event(event_type, trace_id, span_id, Some(Persona::Arbitrator.agent_id()), data);
    }
}

impl std::fmt::Debug for DebateOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("DebateOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::PersonaResponse;
    use irp_core::TelemetryRecorder;

    struct Fixed {
        cautious: &'static str,
        aggressive: &'static str,
    }

    impl PersonaReasoner for Fixed {
        fn argue(&self, request: &PositionRequest) -> anyhow::Result<PersonaResponse> {
            let action = match request.persona {
                Persona::Cautious => self.cautious,
                _ => self.aggressive,
            };
            Ok(PersonaResponse {
                proposal: Proposal::new(action),
                argument: format!("{} is right", action),
                confidence: 0.7,
            })
        }

        fn arbitrate(&self, request: &ArbitrationRequest) -> anyhow::Result<Proposal> {
            Ok(request.aggressive.proposal.clone())
        }
    }

    fn orchestrator(cautious: &'static str, aggressive: &'static str, max_rounds: u32) -> DebateOrchestrator {
        DebateOrchestrator::new(
            DebateConfig {
                max_rounds,
                convergence_threshold: 0.8,
            },
            Arc::new(Fixed { cautious, aggressive }),
            Arc::new(TelemetryRecorder::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_convergence_tiers() {
        assert_eq!(convergence("scale", "scale"), 0.9);
        assert_eq!(convergence("scale", "scale_up"), 0.6);
        assert_eq!(convergence("scale_up", "scale"), 0.6);
        assert_eq!(convergence("scale", "rollback"), 0.3);
    }

    #[test]
    fn test_config_validation() {
        assert!(DebateConfig::default().validate().is_ok());
        let zero = DebateConfig {
            max_rounds: 0,
            ..DebateConfig::default()
        };
        assert!(matches!(zero.validate(), Err(DebateError::InvalidConfig(_))));
        let threshold = DebateConfig {
            convergence_threshold: 1.5,
            ..DebateConfig::default()
        };
        assert!(threshold.validate().is_err());
    }

    #[test]
    fn test_identical_actions_converge_in_one_round() {
        let result = orchestrator("restart_service", "restart_service", 3)
            .debate(DebateIssue::new("svc_down", "Service down", "high"));
        assert!(result.consensus_reached);
        assert_eq!(result.debate_rounds, 1);
        assert_eq!(result.convergence_score, 0.9);
        assert_eq!(result.final_decision.action, "restart_service");
    }

    #[test]
    fn test_divergent_actions_exhaust_rounds() {
        let result = orchestrator("rollback", "scale_up", 2)
            .debate(DebateIssue::new("latency", "High latency", "medium"));
        assert!(!result.consensus_reached);
        assert_eq!(result.debate_rounds, 2);
        assert_eq!(result.convergence_score, 0.3);
        assert_eq!(result.final_decision.action, "scale_up");
        assert!(result.summary_line().starts_with("[ARBITRATED] 2 rounds"));
    }

    #[test]
    fn test_digest_matches_transcript() {
        let result = orchestrator("rollback", "rollback", 1)
            .debate(DebateIssue::new("r", "R", "low"));
        assert_eq!(result.digest, transcript_digest(&result.transcript));
        assert!(result.transcript.last().unwrap().starts_with("[arbitration]"));
    }
}
