// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
///
/// Supervision transitions report [`SupervisorError`](crate::application::SupervisorError);
/// everything around them (persistence, topic admin, recovery) reports this.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Supervisor error: {0}")]
    Supervisor(#[from] crate::application::SupervisorError),

    #[error("Spawn error: {0}")]
    Spawn(#[from] crate::port::SpawnError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: sqlx::Error conversion is handled in the infra-sqlite crate
// by converting to AppError::Storage(String)
