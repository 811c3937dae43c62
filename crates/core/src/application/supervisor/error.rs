// Supervisor Error Types

use std::time::Duration;
use thiserror::Error;

use crate::application::classifier::Classification;
use crate::domain::{DomainError, HealthEndpoint, LifecycleState};
use crate::port::SpawnError;

/// Errors reported by Start/Stop
///
/// Every variant names the service so the caller can decide on a retry.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("{service}: failed to spawn: {source}")]
    Spawn {
        service: String,
        #[source]
        source: SpawnError,
    },

    #[error("{service}: output ended before the service became ready")]
    EndOfStreamWithoutReadiness { service: String },

    #[error("{service}: not ready after {timeout:?}")]
    ReadinessTimeout { service: String, timeout: Duration },

    #[error("{service}: startup failed ({classification}): {line}")]
    StartupFailure {
        service: String,
        classification: Classification,
        line: String,
    },

    #[error("{service}: start cancelled")]
    Cancelled { service: String },

    #[error("{service}: {endpoint} still open after {budget:?}; stop may still complete")]
    StopTimeout {
        service: String,
        endpoint: HealthEndpoint,
        budget: Duration,
    },

    #[error("{service}: cannot {operation} while {state}")]
    InvalidState {
        service: String,
        operation: &'static str,
        state: LifecycleState,
    },

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

impl SupervisorError {
    /// Service the error refers to, if any
    pub fn service(&self) -> Option<&str> {
        match self {
            SupervisorError::UnknownService(service)
            | SupervisorError::Spawn { service, .. }
            | SupervisorError::EndOfStreamWithoutReadiness { service }
            | SupervisorError::ReadinessTimeout { service, .. }
            | SupervisorError::StartupFailure { service, .. }
            | SupervisorError::Cancelled { service }
            | SupervisorError::StopTimeout { service, .. }
            | SupervisorError::InvalidState { service, .. } => Some(service),
            SupervisorError::Domain(_) => None,
        }
    }

    /// Classification that fired, for output-driven failures
    pub fn classification(&self) -> Option<Classification> {
        match self {
            SupervisorError::StartupFailure { classification, .. } => Some(*classification),
            _ => None,
        }
    }
}
