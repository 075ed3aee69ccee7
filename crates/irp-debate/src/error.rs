//! Debate errors
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DebateError {
    #[error("DEBATE/INVALID_CONFIG: {0}")]
    InvalidConfig(String),
}
