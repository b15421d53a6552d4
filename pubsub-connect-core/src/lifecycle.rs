//! Connector lifecycle state machine.
//!
//! ```text
//! Unstarted --start--> Validating --ok--> Ready --stop--> Stopped
//!                          |
//!                          +--err--> Failed
//! ```
//!
//! `Failed` is terminal. Recovering from it requires a new connector instance.

use crate::{ConnectorError, ConnectorResult};
use serde::Serialize;
use std::fmt;

/// Lifecycle state of a connector instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    #[default]
    Unstarted,
    Validating,
    Ready,
    Stopped,
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Unstarted => "unstarted",
            LifecycleState::Validating => "validating",
            LifecycleState::Ready => "ready",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks and guards lifecycle transitions
#[derive(Debug, Default)]
pub struct Lifecycle {
    state: LifecycleState,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// `Unstarted -> Validating`, triggered by `start`
    pub fn begin_validation(&mut self) -> ConnectorResult<()> {
        self.transition(LifecycleState::Unstarted, LifecycleState::Validating, "start")
    }

    /// `Validating -> Ready`
    pub fn mark_ready(&mut self) -> ConnectorResult<()> {
        self.transition(LifecycleState::Validating, LifecycleState::Ready, "become ready")
    }

    /// `Validating -> Failed`
    pub fn mark_failed(&mut self) -> ConnectorResult<()> {
        self.transition(LifecycleState::Validating, LifecycleState::Failed, "fail")
    }

    /// Ensure the connector is `Ready` before serving `operation`
    pub fn require_ready(&self, operation: &'static str) -> ConnectorResult<()> {
        match self.state {
            LifecycleState::Ready => Ok(()),
            state => Err(ConnectorError::illegal_state(operation, state)),
        }
    }

    /// Mark the lifecycle terminal. A failed lifecycle stays failed.
    pub fn stop(&mut self) {
        if self.state != LifecycleState::Failed {
            self.state = LifecycleState::Stopped;
        }
    }

    fn transition(
        &mut self,
        from: LifecycleState,
        to: LifecycleState,
        operation: &'static str,
    ) -> ConnectorResult<()> {
        if self.state != from {
            return Err(ConnectorError::illegal_state(operation, self.state));
        }
        self.state = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), LifecycleState::Unstarted);

        lifecycle.begin_validation().unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Validating);
        assert!(lifecycle.require_ready("compute task configs").is_err());

        lifecycle.mark_ready().unwrap();
        assert!(lifecycle.require_ready("compute task configs").is_ok());

        lifecycle.stop();
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
        assert!(lifecycle.require_ready("compute task configs").is_err());
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.begin_validation().unwrap();
        lifecycle.mark_failed().unwrap();

        assert!(lifecycle.begin_validation().is_err());
        assert!(lifecycle.mark_ready().is_err());

        lifecycle.stop();
        assert_eq!(lifecycle.state(), LifecycleState::Failed);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.begin_validation().unwrap();
        lifecycle.mark_ready().unwrap();

        match lifecycle.begin_validation() {
            Err(ConnectorError::IllegalState { operation, state }) => {
                assert_eq!(operation, "start");
                assert_eq!(state, LifecycleState::Ready);
            }
            other => panic!("expected IllegalState, got {:?}", other),
        }
    }

    #[test]
    fn test_stop_before_start() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.stop();
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
        assert!(lifecycle.begin_validation().is_err());
    }

    #[test]
    fn test_state_serializes_like_display() {
        for state in [
            LifecycleState::Unstarted,
            LifecycleState::Validating,
            LifecycleState::Ready,
            LifecycleState::Stopped,
            LifecycleState::Failed,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state));
        }
    }
}
