// Lifecycle Domain Model

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};
use crate::domain::service::ProcessId;

/// Supervision state of one service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Stopped,
    Starting,
    Ready,
    Failed,
    Stopping,
}

impl LifecycleState {
    /// A transition is in flight
    pub fn is_transitional(self) -> bool {
        matches!(self, LifecycleState::Starting | LifecycleState::Stopping)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Stopped => write!(f, "STOPPED"),
            LifecycleState::Starting => write!(f, "STARTING"),
            LifecycleState::Ready => write!(f, "READY"),
            LifecycleState::Failed => write!(f, "FAILED"),
            LifecycleState::Stopping => write!(f, "STOPPING"),
        }
    }
}

/// Registry entry value: state plus the last known process identity
///
/// The pid only ever changes together with the state, so an entry never
/// mixes the identity of an old process with the state of a new attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub state: LifecycleState,
    pub pid: Option<ProcessId>,
    pub started_at: Option<i64>, // epoch ms
    pub since: Option<i64>,      // epoch ms of the last transition
}

impl Default for ServiceStatus {
    fn default() -> Self {
        Self {
            state: LifecycleState::Stopped,
            pid: None,
            started_at: None,
            since: None,
        }
    }
}

impl ServiceStatus {
    fn transition(
        &mut self,
        allowed_from: &[LifecycleState],
        to: LifecycleState,
        now_millis: i64,
    ) -> Result<()> {
        if !allowed_from.contains(&self.state) {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        self.since = Some(now_millis);
        Ok(())
    }

    /// Stopped/Failed -> Starting (drops the previous identity)
    pub fn begin_start(&mut self, now_millis: i64) -> Result<()> {
        self.transition(
            &[LifecycleState::Stopped, LifecycleState::Failed],
            LifecycleState::Starting,
            now_millis,
        )?;
        self.pid = None;
        self.started_at = None;
        Ok(())
    }

    /// Starting -> Ready, recording the spawned process
    pub fn mark_ready(&mut self, pid: ProcessId, started_at: i64, now_millis: i64) -> Result<()> {
        self.transition(
            &[LifecycleState::Starting],
            LifecycleState::Ready,
            now_millis,
        )?;
        self.pid = Some(pid);
        self.started_at = Some(started_at);
        Ok(())
    }

    /// Starting -> Failed
    pub fn mark_failed(&mut self, now_millis: i64) -> Result<()> {
        self.transition(
            &[LifecycleState::Starting],
            LifecycleState::Failed,
            now_millis,
        )
    }

    /// Ready -> Stopping (identity kept until the port closes)
    pub fn begin_stop(&mut self, now_millis: i64) -> Result<()> {
        self.transition(
            &[LifecycleState::Ready],
            LifecycleState::Stopping,
            now_millis,
        )
    }

    /// Stopping -> Stopped
    pub fn mark_stopped(&mut self, now_millis: i64) -> Result<()> {
        self.transition(
            &[LifecycleState::Stopping],
            LifecycleState::Stopped,
            now_millis,
        )?;
        self.pid = None;
        self.started_at = None;
        Ok(())
    }

    /// Endpoint found closed outside of a transition (Ready/Stopping -> Stopped)
    pub fn observe_closed(&mut self, now_millis: i64) -> Result<()> {
        self.transition(
            &[LifecycleState::Ready, LifecycleState::Stopping],
            LifecycleState::Stopped,
            now_millis,
        )?;
        self.pid = None;
        self.started_at = None;
        Ok(())
    }

    /// Endpoint found open outside of a transition (Stopped/Failed -> Ready)
    ///
    /// `pid` is known only when it was recovered from persisted state.
    pub fn observe_open(
        &mut self,
        pid: Option<ProcessId>,
        started_at: Option<i64>,
        now_millis: i64,
    ) -> Result<()> {
        self.transition(
            &[LifecycleState::Stopped, LifecycleState::Failed],
            LifecycleState::Ready,
            now_millis,
        )?;
        self.pid = pid;
        self.started_at = started_at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_then_ready() {
        let mut status = ServiceStatus::default();
        assert_eq!(status.state, LifecycleState::Stopped);

        status.begin_start(1000).unwrap();
        assert_eq!(status.state, LifecycleState::Starting);
        assert_eq!(status.since, Some(1000));

        status.mark_ready(4242, 1000, 2000).unwrap();
        assert_eq!(status.state, LifecycleState::Ready);
        assert_eq!(status.pid, Some(4242));
        assert_eq!(status.started_at, Some(1000));
    }

    #[test]
    fn test_stop_clears_identity() {
        let mut status = ServiceStatus::default();
        status.begin_start(1).unwrap();
        status.mark_ready(7, 1, 2).unwrap();
        status.begin_stop(3).unwrap();
        assert_eq!(status.pid, Some(7));

        status.mark_stopped(4).unwrap();
        assert_eq!(status.state, LifecycleState::Stopped);
        assert!(status.pid.is_none());
        assert!(status.started_at.is_none());
    }

    #[test]
    fn test_retry_after_failure() {
        let mut status = ServiceStatus::default();
        status.begin_start(1).unwrap();
        status.mark_failed(2).unwrap();
        assert_eq!(status.state, LifecycleState::Failed);

        assert!(status.begin_start(3).is_ok());
        assert_eq!(status.state, LifecycleState::Starting);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut status = ServiceStatus::default();

        // Cannot become ready without starting
        assert!(status.mark_ready(1, 1, 1).is_err());
        // Cannot stop what is not running
        assert!(status.begin_stop(1).is_err());
        assert!(status.mark_stopped(1).is_err());

        status.begin_start(1).unwrap();
        // Cannot start twice
        assert!(status.begin_start(2).is_err());
        assert_eq!(status.state, LifecycleState::Starting);
    }

    #[test]
    fn test_observed_transitions() {
        let mut status = ServiceStatus::default();
        status.observe_open(None, None, 10).unwrap();
        assert_eq!(status.state, LifecycleState::Ready);
        assert!(status.pid.is_none());

        status.observe_closed(20).unwrap();
        assert_eq!(status.state, LifecycleState::Stopped);

        // Not while a start is in flight
        status.begin_start(30).unwrap();
        assert!(status.observe_open(Some(1), None, 40).is_err());
        assert!(status.observe_closed(40).is_err());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LifecycleState::Ready.to_string(), "READY");
        assert!(LifecycleState::Stopping.is_transitional());
        assert!(!LifecycleState::Failed.is_transitional());
    }
}
