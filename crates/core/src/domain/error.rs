// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid lifecycle transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Invalid endpoint '{0}': expected host:port")]
    InvalidEndpoint(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Invalid topic: {0}")]
    InvalidTopic(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
