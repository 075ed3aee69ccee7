//! Policy errors
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("POLICY/PARSE: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("POLICY/INVALID_RULE: rule '{id}': {reason}")]
    InvalidRule { id: String, reason: String },
}
