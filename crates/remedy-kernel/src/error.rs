//! Error types for the remediation kernel
//!
//! Execution failures are returned as data (`ExecutionResult`). The errors
//! here cover what is surfaced to the caller as `Err`:
//! - Safety violations detected on a rendered command
//! - Unknown policies, decisions and providers
//! - Invalid policies, scores and configuration
//! - Illegal lifecycle transitions

use crate::lifecycle::DecisionState;
use crate::safety::SafetyViolation;
use crate::types::{DecisionId, Environment, FailureKind, PolicyId};

/// Main kernel error type
#[derive(Debug, thiserror::Error)]
pub enum RemedyError {
    /// Rendered command matched a destructive pattern
    #[error("safety violation: {0}")]
    Safety(#[from] SafetyViolation),

    /// Policy registration or lookup failed
    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    /// No connector registered under this provider name
    #[error("connector unavailable: {0}")]
    ConnectorUnavailable(String),

    /// Decision id not present in the log
    #[error("decision not found: {0}")]
    DecisionNotFound(DecisionId),

    /// Score outside `[0, 1]` or not a number
    #[error("invalid risk score: {0}")]
    InvalidScore(f64),

    /// Snapshot could not be captured
    #[error("snapshot capture failed ({kind:?}): {message}")]
    SnapshotFailed {
        /// Why capture stopped
        kind: FailureKind,
        /// Provider or guard diagnostic
        message: String,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Lifecycle state machine rejected a transition
    #[error("lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),
}

impl RemedyError {
    /// Safety stops are never retried
    #[inline]
    #[must_use]
    pub fn is_safety_stop(&self) -> bool {
        matches!(
            self,
            Self::Safety(_)
                | Self::SnapshotFailed {
                    kind: FailureKind::SafetyViolation,
                    ..
                }
        )
    }

    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectorUnavailable(_) => true,
            Self::SnapshotFailed { kind, .. } => matches!(
                kind,
                FailureKind::Remote
                    | FailureKind::Transport
                    | FailureKind::Timeout
                    | FailureKind::Busy
            ),
            _ => false,
        }
    }
}

/// Policy registry errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PolicyError {
    /// Approval threshold above block threshold
    #[error("require_approval_above ({require_approval_above}) exceeds block_above ({block_above})")]
    InvalidThresholds {
        /// Lower threshold
        require_approval_above: f64,
        /// Upper threshold
        block_above: f64,
    },

    /// Threshold outside `[0, 1]`
    #[error("{field} must be within [0, 1], got {value}")]
    OutOfRange {
        /// Offending field name
        field: &'static str,
        /// Value supplied
        value: f64,
    },

    /// Blank policy name
    #[error("policy name must not be empty")]
    EmptyName,

    /// Unknown or evicted policy id
    #[error("policy not found: {0}")]
    NotFound(PolicyId),

    /// Policy applied to a proposal for another environment
    #[error("policy {policy} governs {expected}, not {actual}")]
    EnvironmentMismatch {
        /// Policy that was named
        policy: PolicyId,
        /// Environment the policy was registered for
        expected: Environment,
        /// Environment of the proposal
        actual: Environment,
    },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid TOML for [`crate::config::EngineConfig`]
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Extra blocked pattern does not compile
    #[error("invalid blocked pattern `{pattern}`: {source}")]
    InvalidPattern {
        /// Pattern as configured
        pattern: String,
        /// Regex compiler error
        #[source]
        source: regex::Error,
    },

    /// Out-of-range or inconsistent setting
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Lifecycle state machine errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// Transition not in the lifecycle graph
    #[error("illegal transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state
        from: DecisionState,
        /// Requested state
        to: DecisionState,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safety_errors_are_not_retryable() {
        let err = RemedyError::Safety(SafetyViolation {
            pattern: "rm -rf".to_string(),
            command: "rm -rf /".to_string(),
        });
        assert!(err.is_safety_stop());
        assert!(!err.is_retryable());

        let err = RemedyError::SnapshotFailed {
            kind: FailureKind::SafetyViolation,
            message: "blocked".to_string(),
        };
        assert!(err.is_safety_stop());
        assert!(!err.is_retryable());
    }

    #[test]
    fn transient_capture_failures_are_retryable() {
        let err = RemedyError::SnapshotFailed {
            kind: FailureKind::Timeout,
            message: "timed out".to_string(),
        };
        assert!(err.is_retryable());
        assert!(RemedyError::ConnectorUnavailable("aws".to_string()).is_retryable());
        assert!(!RemedyError::InvalidScore(f64::NAN).is_retryable());
    }

    #[test]
    fn policy_error_messages() {
        let err = PolicyError::InvalidThresholds {
            require_approval_above: 0.8,
            block_above: 0.5,
        };
        assert!(err.to_string().contains("exceeds block_above"));

        let err = PolicyError::EnvironmentMismatch {
            policy: PolicyId::new(),
            expected: Environment::Production,
            actual: Environment::Staging,
        };
        assert!(err.to_string().ends_with("governs production, not staging"));
    }
}
