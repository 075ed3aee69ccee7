//! Action-string enforcement
//!
//! Screens free-text resolution actions with precompiled patterns, checked
//! family by family:
//!
//! 1. dangerous commands (critical)
//! 2. PII exposure (critical)
//! 3. resource exhaustion (warning)
//!
//! The first matching pattern, in family order, decides the result.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Severity attached to an enforcement result
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnforcementResult {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub severity: Severity,
    #[serde(default)]
    pub violated_rules: Vec<String>,
}

impl EnforcementResult {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            severity: Severity::Info,
            violated_rules: Vec::new(),
        }
    }
}

struct PatternRule {
    id: &'static str,
    description: &'static str,
    regex: Regex,
}

struct PatternFamily {
    name: &'static str,
    severity: Severity,
    rules: Vec<PatternRule>,
}

fn pattern(id: &'static str, description: &'static str, re: &str) -> PatternRule {
    PatternRule {
        id,
        description,
        regex: Regex::new(re).unwrap(),
    }
}

lazy_static! {
    static ref FAMILIES: Vec<PatternFamily> = vec![
        PatternFamily {
            name: "dangerous_command",
            severity: Severity::Critical,
            rules: vec![
                pattern(
                    "recursive_delete",
                    "recursive filesystem deletion",
                    r"(?i)\brm\s+(?:-[a-z]*r[a-z]*\s+)(?:-[a-z]+\s+)*/",
                ),
                pattern(
                    "destructive_sql",
                    "destructive database operation",
                    r"(?i)\b(?:drop\s+(?:table|database|schema)|truncate\s+table)\b",
                ),
                pattern(
                    "unscoped_delete",
                    "database delete without a WHERE clause",
                    r"(?i)\bdelete\s+from\s+[\w.]+\s*(?:;|$)",
                ),
                pattern(
                    "filesystem_format",
                    "filesystem formatting",
                    r"(?i)\bmkfs(?:\.\w+)?\b|\bdd\s+if=\S+\s+of=/dev/",
                ),
                pattern(
                    "fork_bomb",
                    "fork bomb",
                    r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
                ),
                pattern(
                    "kill_init",
                    "killing process 1",
                    r"(?i)\bkill\s+(?:-(?:9|kill|s\s+kill)\s+)?1\b",
                ),
                pattern(
                    "world_writable_root",
                    "world-writable root permissions",
                    r"(?i)\bchmod\s+(?:-r\s+)?0?777\s+/(?:\s|$)",
                ),
            ],
        },
        PatternFamily {
            name: "pii_exposure",
            severity: Severity::Critical,
            rules: vec![
                pattern("national_id", "national id number", r"\b\d{3}-\d{2}-\d{4}\b"),
                pattern(
                    "payment_card",
                    "payment card number",
                    r"\b(?:\d{4}[- ]?){3}\d{4}\b",
                ),
                pattern("passport", "passport number", r"\b[A-Z]{1,2}\d{6,9}\b"),
            ],
        },
        PatternFamily {
            name: "resource_exhaustion",
            severity: Severity::Warning,
            rules: vec![
                pattern(
                    "infinite_while",
                    "unbounded while loop",
                    r"(?i)\bwhile\s*\(?\s*(?:true|1)\b\s*\)?|\bwhile\s+:\s*;",
                ),
                pattern("infinite_for", "unbounded for loop", r"\bfor\s*\(\s*;\s*;\s*\)"),
                pattern("bare_loop", "unbounded loop block", r"\bloop\s*\{"),
            ],
        },
    ];
}

/// Validates resolution actions before they are carried out
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEnforcer;

impl PolicyEnforcer {
    pub fn new() -> Self {
        Self
    }

    /// Screen `action` and `details`; the first matching pattern wins
    pub fn validate_action(&self, action: &str, details: &str) -> EnforcementResult {
        let text = format!("{} {}", action, details);

        for family in FAMILIES.iter() {
            if let Some(rule) = family.rules.iter().find(|r| r.regex.is_match(&text)) {
                tracing::warn!(
                    family = family.name,
                    rule = rule.id,
                    severity = %family.severity,
                    "action rejected by enforcer"
                );
                return EnforcementResult {
                    allowed: false,
                    reason: Some(format!("{}: {}", family.name, rule.description)),
                    severity: family.severity,
                    violated_rules: vec![rule.id.to_string()],
                };
            }
        }

        EnforcementResult::allow()
    }

    /// Pull `resolution_action` / `resolution_details` out of a loose
    /// record and validate them
    pub fn validate_resolution(&self, record: &Value) -> EnforcementResult {
        let action = field_text(record, "resolution_action");
        let details = field_text(record, "resolution_details");
        self.validate_action(&action, &details)
    }

    /// `(family, severity, rule ids)` in check order
    pub fn families(&self) -> Vec<(&'static str, Severity, Vec<&'static str>)> {
        FAMILIES
            .iter()
            .map(|f| (f.name, f.severity, f.rules.iter().map(|r| r.id).collect()))
            .collect()
    }
}

fn field_text(record: &Value, key: &str) -> String {
    match record.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
