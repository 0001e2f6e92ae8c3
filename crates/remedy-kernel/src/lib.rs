//! Remedy Kernel (remedy-kernel)
//!
//! Decision and safety core for auto-remediation:
//! 1. **Score**: risk of an action from its type, environment and blast radius
//! 2. **Gate**: policy thresholds map the score to an outcome
//! 3. **Act**: snapshot, validate the rendered command, execute, roll back
//!
//! Provider connectors live outside the kernel and plug in through the
//! [`api::ActionExecutor`] and [`api::SnapshotManager`] traits.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use remedy_kernel::prelude::*;
//!
//! let router = Arc::new(ConnectorRouter::new().with(connector));
//! let engine = RemediationEngine::new(EngineConfig::default(), router, Arc::new(TracingSink))?;
//!
//! let proposal = RemediationProposal::new("billing", "restart_service", "spooler", Environment::Staging, 1)
//!     .on_provider("windows");
//! let report = engine.remediate(&proposal, CallOptions::default()).await?;
//! ```

pub mod api;
pub mod call;
pub mod config;
pub mod decision_log;
pub mod engine;
pub mod error;
pub mod gate;
pub mod lease;
pub mod lifecycle;
pub mod policy;
pub mod ring;
pub mod risk;
pub mod router;
pub mod safety;
pub mod sink;
pub mod snapshot;
pub mod types;

// Re-exports
pub use error::*;
pub use types::*;

/// Commonly used items
pub mod prelude {
    pub use crate::api::{ActionExecutor, Connector, SnapshotManager};
    pub use crate::call::{CallOptions, CancelHandle};
    pub use crate::config::EngineConfig;
    pub use crate::decision_log::{DecisionFilter, RemediationDecision};
    pub use crate::engine::{RemediationEngine, RemediationReport};
    pub use crate::error::{ConfigError, PolicyError, RemedyError};
    pub use crate::lifecycle::DecisionState;
    pub use crate::policy::{DecisionPolicy, PolicySpec};
    pub use crate::risk::{calculate_risk_score, RiskAssessment};
    pub use crate::router::ConnectorRouter;
    pub use crate::safety::{SafetyValidator, SafetyViolation};
    pub use crate::sink::{AuditEvent, EventSink, MemorySink, NullSink, TracingSink};
    pub use crate::snapshot::{Snapshot, SnapshotStore};
    pub use crate::types::{
        ActionType, DecisionOutcome, Environment, ExecutionResult, ExecutionStatus, FailureKind,
        RemediationAction, RemediationProposal, RiskLevel, SnapshotId,
    };
    pub use std::sync::Arc;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
