//! Step proofs: what each agent step did to the shared output map
use chrono::{DateTime, Utc};
use irp_core::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed,
    Failed { error: String },
}

/// Record of one agent step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub agent_id: String,
    /// Index of the parallel group, `None` for sequential runs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<usize>,
    pub in_hash: String,
    pub out_hash: String,
    pub latency_ms: u64,
    pub outcome: StepOutcome,
}

impl StepRecord {
    pub fn is_completed(&self) -> bool {
        self.outcome == StepOutcome::Completed
    }

    /// True when the step left `output_data` untouched
    pub fn is_noop(&self) -> bool {
        self.in_hash == self.out_hash
    }
}

/// Terminal context of a run plus its step proofs
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub workflow: String,
    pub context: Context,
    pub steps: Vec<StepRecord>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl WorkflowRun {
    pub fn final_state(&self) -> &str {
        self.context.current_state()
    }

    pub fn failed_steps(&self) -> Vec<&StepRecord> {
        self.steps.iter().filter(|s| !s.is_completed()).collect()
    }

    /// Agent ids in the order they ran
    pub fn agents_run(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.agent_id.as_str()).collect()
    }

    pub fn into_context(self) -> Context {
        self.context
    }
}

/// Digest of `payload.output_data`, keys in sorted order
pub fn output_digest(context: &Context) -> String {
    let ordered: BTreeMap<&String, &serde_json::Value> =
        context.payload.output_data.iter().collect();
    let bytes = serde_json::to_vec(&ordered).unwrap_or_default();
    format!("blake3:{}", blake3::hash(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_digest_ignores_insertion_order() {
        let mut a = Context::new();
        a.set_output("x", json!(1));
        a.set_output("y", json!(2));
        let mut b = Context::new();
        b.set_output("y", json!(2));
        b.set_output("x", json!(1));
        assert_eq!(output_digest(&a), output_digest(&b));
    }

    #[test]
    fn test_digest_tracks_output_only() {
        let base = Context::new();
        let mut changed = base.clone();
        changed.add_note("notes are not outputs");
        assert_eq!(output_digest(&base), output_digest(&changed));

        changed.set_output("detections", json!([]));
        assert_ne!(output_digest(&base), output_digest(&changed));
        assert!(output_digest(&changed).starts_with("blake3:"));
    }

    #[test]
    fn test_outcome_serde() {
        let failed = StepOutcome::Failed { error: "boom".into() };
        let v = serde_json::to_value(&failed).unwrap();
        assert_eq!(v, json!({"status": "failed", "error": "boom"}));
    }
}
