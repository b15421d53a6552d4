//! Error types for connectors.

use crate::LifecycleState;
use std::fmt;
use thiserror::Error;

/// Result type alias for connector operations
pub type ConnectorResult<T> = std::result::Result<T, ConnectorError>;

/// Boxed cause carried by errors that wrap a lower level failure
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A single configuration key that failed type, range or enum validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigViolation {
    /// The offending configuration key
    pub key: String,
    /// Human readable reason
    pub reason: String,
}

impl ConfigViolation {
    pub fn new(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.reason)
    }
}

fn join_violations(violations: &[ConfigViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors surfaced by connector lifecycle operations
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// One or more configuration keys are invalid. Always reported before any network activity.
    #[error("invalid configuration: {}", join_violations(.violations))]
    InvalidConfig { violations: Vec<ConfigViolation> },

    /// The credentials file could not be read or parsed
    #[error("failed to load credentials from {path}: {reason}")]
    CredentialLoad { path: String, reason: String },

    /// The upstream subscription could not be described (network, auth, not found, deadline)
    #[error("error verifying the subscription {subscription} for project {project}: {source}")]
    SubscriptionUnreachable {
        project: String,
        subscription: String,
        #[source]
        source: BoxError,
    },

    /// A lifecycle operation was called in a state that does not allow it
    #[error("cannot {operation} while the connector is {state}")]
    IllegalState {
        operation: &'static str,
        state: LifecycleState,
    },

    /// Raw configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),
}

impl ConnectorError {
    /// Create a configuration loading error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid configuration error from collected violations
    pub fn invalid_config(violations: Vec<ConfigViolation>) -> Self {
        Self::InvalidConfig { violations }
    }

    /// Create a credential loading error
    pub fn credential_load(path: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::CredentialLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Wrap any failure of the subscription readiness check
    pub fn subscription_unreachable(
        project: impl Into<String>,
        subscription: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::SubscriptionUnreachable {
            project: project.into(),
            subscription: subscription.into(),
            source: source.into(),
        }
    }

    /// Create a lifecycle misuse error
    pub fn illegal_state(operation: &'static str, state: LifecycleState) -> Self {
        Self::IllegalState { operation, state }
    }

    /// Whether this error stems from user supplied configuration
    ///
    /// Credential failures count as configuration errors for propagation.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. } | Self::CredentialLoad { .. } | Self::Config(_)
        )
    }

    /// Offending keys of an `InvalidConfig` error, empty otherwise
    pub fn violations(&self) -> &[ConfigViolation] {
        match self {
            Self::InvalidConfig { violations } => violations,
            _ => &[],
        }
    }
}
