//! Runtime configuration
//!
//! Loaded from YAML, then adjusted from the environment:
//!
//! | Variable | Overrides |
//! |---|---|
//! | `IRP_LOG` | `logging.level` |
//! | `IRP_STOP_ON_ERROR` | `workflow.stop_on_error` |
//! | `IRP_DEBATE_MAX_ROUNDS` | `debate.max_rounds` |

use irp_core::telemetry::DEFAULT_BUFFER_CAPACITY;
use irp_debate::DebateConfig;
use irp_policy::RuleSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

pub const ENV_LOG: &str = "IRP_LOG";
pub const ENV_STOP_ON_ERROR: &str = "IRP_STOP_ON_ERROR";
pub const ENV_DEBATE_MAX_ROUNDS: &str = "IRP_DEBATE_MAX_ROUNDS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub name: String,
    pub stop_on_error: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            name: "incident_response".to_string(),
            stop_on_error: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Register the semantic safety gate
    pub semantic_guard: bool,
    /// Register the bundled incident response rules
    pub include_default_rules: bool,
    pub rules: Vec<RuleSpec>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            semantic_guard: true,
            include_default_rules: false,
            rules: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing-subscriber` filter directive, e.g. `info` or `irp_policy=debug`
    pub level: String,
    /// Capacity of the in-memory event and metric buffers
    pub telemetry_buffer: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            telemetry_buffer: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub workflow: WorkflowConfig,
    pub policy: PolicyConfig,
    pub debate: DebateConfig,
    pub logging: LoggingConfig,
}

impl RuntimeConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup(ENV_LOG).filter(|v| !v.trim().is_empty()) {
            self.logging.level = level;
        }

        if let Some(raw) = lookup(ENV_STOP_ON_ERROR) {
            self.workflow.stop_on_error = parse_bool(&raw).ok_or_else(|| {
                ConfigError::Invalid(format!("{}: expected a boolean, got '{}'", ENV_STOP_ON_ERROR, raw))
            })?;
        }

        if let Some(raw) = lookup(ENV_DEBATE_MAX_ROUNDS) {
            self.debate.max_rounds = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!(
                    "{}: expected a round count, got '{}'",
                    ENV_DEBATE_MAX_ROUNDS, raw
                ))
            })?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workflow.name.trim().is_empty() {
            return Err(ConfigError::Invalid("workflow.name must not be empty".to_string()));
        }
        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.level must not be empty".to_string()));
        }
        if self.logging.telemetry_buffer == 0 {
            return Err(ConfigError::Invalid(
                "logging.telemetry_buffer must be positive".to_string(),
            ));
        }
        self.debate
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let mut seen = std::collections::HashSet::new();
        for spec in &self.policy.rules {
            spec.validate()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
            if !seen.insert(spec.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate rule id '{}'", spec.id)));
            }
        }
        Ok(())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert!(!config.workflow.stop_on_error);
        assert!(config.policy.semantic_guard);
        assert!(!config.policy.include_default_rules);
        assert_eq!(config.debate.max_rounds, 3);
        assert_eq!(config.debate.convergence_threshold, 0.8);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.telemetry_buffer, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = RuntimeConfig::from_yaml_str("workflow:\n  stop_on_error: true\n").unwrap();
        assert!(config.workflow.stop_on_error);
        assert_eq!(config.workflow.name, "incident_response");
        assert_eq!(config.debate.max_rounds, 3);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = RuntimeConfig::default();
        config
            .apply_overrides(lookup(&[
                (ENV_LOG, "irp_policy=debug"),
                (ENV_STOP_ON_ERROR, "yes"),
                (ENV_DEBATE_MAX_ROUNDS, "5"),
            ]))
            .unwrap();
        assert_eq!(config.logging.level, "irp_policy=debug");
        assert!(config.workflow.stop_on_error);
        assert_eq!(config.debate.max_rounds, 5);
    }

    #[test]
    fn test_bad_override_rejected() {
        let mut config = RuntimeConfig::default();
        let err = config
            .apply_overrides(lookup(&[(ENV_DEBATE_MAX_ROUNDS, "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert_eq!(config.debate.max_rounds, 3);
    }

    #[test]
    fn test_validate_rejects_zero_rounds() {
        let mut config = RuntimeConfig::default();
        config.debate.max_rounds = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_rounds"));
    }
}
