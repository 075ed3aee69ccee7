//! Composition root: one telemetry recorder and one policy engine shared by
//! every orchestrator built from a [`RuntimeConfig`].

use irp_core::{Agent, Context, Executable, Process, TelemetryRecorder};
use irp_debate::{DebateError, DebateOrchestrator, PersonaReasoner};
use irp_policy::{incident_response_rules, PolicyEnforcer, PolicyEngine, RiskClassifier};
use irp_workflow::{AgentGroup, WorkflowOrchestrator, WorkflowRun};
use std::sync::Arc;

use crate::config::RuntimeConfig;
use crate::error::ConfigError;

pub struct Runtime {
    config: RuntimeConfig,
    telemetry: Arc<TelemetryRecorder>,
    policy_engine: Arc<PolicyEngine>,
    reasoner: Arc<dyn PersonaReasoner>,
    enforcer: PolicyEnforcer,
}

impl Runtime {
    /// Validate `config` and build the shared engine.
    ///
    /// Rules are registered in this order: semantic guard, bundled rules,
    /// configured rules.
    pub fn from_config(
        config: RuntimeConfig,
        classifier: Arc<dyn RiskClassifier>,
        reasoner: Arc<dyn PersonaReasoner>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let telemetry = Arc::new(TelemetryRecorder::with_capacity(
            config.logging.telemetry_buffer,
        ));

        let mut engine = PolicyEngine::new(telemetry.clone());
        if config.policy.semantic_guard {
            engine = engine.with_semantic_guard(classifier);
        }
        if config.policy.include_default_rules {
            for rule in incident_response_rules() {
                engine.add_rule(rule);
            }
        }
        for spec in &config.policy.rules {
            let rule = spec
                .clone()
                .into_rule()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            engine.add_rule(rule);
        }

        tracing::info!(
            workflow = %config.workflow.name,
            rules = engine.rule_count(),
            semantic_guard = config.policy.semantic_guard,
            "runtime ready"
        );

        Ok(Self {
            config,
            telemetry,
            policy_engine: Arc::new(engine),
            reasoner,
            enforcer: PolicyEnforcer::new(),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn telemetry(&self) -> &Arc<TelemetryRecorder> {
        &self.telemetry
    }

    pub fn policy_engine(&self) -> &Arc<PolicyEngine> {
        &self.policy_engine
    }

    pub fn enforcer(&self) -> &PolicyEnforcer {
        &self.enforcer
    }

    /// Agent reporting through the shared recorder
    pub fn agent(&self, id: impl Into<String>, behavior: impl Process + 'static) -> Arc<Agent> {
        Arc::new(Agent::new(id, behavior, self.telemetry.clone()))
    }

    pub fn workflow(&self, agents: Vec<Arc<dyn Executable>>) -> WorkflowOrchestrator {
        agents.into_iter().fold(
            WorkflowOrchestrator::new(self.policy_engine.clone(), self.telemetry.clone())
                .with_name(self.config.workflow.name.clone()),
            WorkflowOrchestrator::with_agent,
        )
    }

    /// Sequential run honouring `workflow.stop_on_error`
    pub fn run(&self, agents: Vec<Arc<dyn Executable>>, initial: Context) -> WorkflowRun {
        self.workflow(agents)
            .execute_with_report(initial, self.config.workflow.stop_on_error)
    }

    pub fn run_parallel(&self, groups: &[AgentGroup], initial: Context) -> WorkflowRun {
        self.workflow(Vec::new())
            .execute_parallel_with_report(initial, groups)
    }

    pub fn debate(&self) -> Result<DebateOrchestrator, DebateError> {
        DebateOrchestrator::new(
            self.config.debate.clone(),
            self.reasoner.clone(),
            self.telemetry.clone(),
        )
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("policy_engine", &self.policy_engine)
            .finish_non_exhaustive()
    }
}
