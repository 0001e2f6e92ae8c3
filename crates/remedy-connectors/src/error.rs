//! Connector error types
//!
//! These never cross the connector boundary as `Err`: the connector maps
//! them to FAILED execution results or `SnapshotFailed` errors with the
//! matching failure kind.

use remedy_kernel::FailureKind;

/// Template rendering errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// Placeholder with no value among defaults, action fields or parameters
    #[error("missing parameter: {0}")]
    MissingParameter(String),

    /// Parameter value that would break out of its argument position or
    /// read as an option
    #[error("parameter {name} contains forbidden characters or starts with '-'")]
    UnsafeValue {
        /// Placeholder whose value was refused
        name: String,
    },
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote unreachable: {0}")]
    Unreachable(String),
}

impl TransportError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Unreachable(_))
    }
}

impl From<&RenderError> for FailureKind {
    fn from(_: &RenderError) -> Self {
        FailureKind::Render
    }
}

impl From<&TransportError> for FailureKind {
    fn from(_: &TransportError) -> Self {
        FailureKind::Transport
    }
}
