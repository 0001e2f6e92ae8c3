//! Connector-facing traits
//!
//! A provider connector is anything that can act on a resource
//! ([`ActionExecutor`]) and capture and restore its state
//! ([`SnapshotManager`]). The engine only ever talks to connectors through
//! these traits, via the [`crate::router::ConnectorRouter`].
//!
//! Execution failures are data (`ExecutionResult` with status FAILED), not
//! errors. Read paths fail soft.

use crate::error::RemedyError;
use crate::snapshot::Snapshot;
use crate::types::{
    Environment, ExecutionResult, Health, RemediationAction, Resource, ResourceEvent, SnapshotId,
    TimeRange,
};
use std::collections::BTreeMap;

/// Runs remediation actions against one provider
#[async_trait::async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Render, validate and run one action
    ///
    /// Exactly one remote call is made for a supported, safe action. An
    /// unsupported operation or a safety violation returns FAILED without
    /// any remote call.
    async fn execute_action(&self, action: &RemediationAction) -> ExecutionResult;

    /// Health of a resource; unreachable resources report unhealthy
    async fn get_health(&self, resource_id: &str) -> Health;

    /// Inventory, optionally filtered; empty on failure
    async fn list_resources(
        &self,
        resource_type: Option<&str>,
        environment: Option<&Environment>,
    ) -> Vec<Resource>;

    /// Events for a resource within `range`; empty on failure
    async fn get_events(&self, resource_id: &str, range: TimeRange) -> Vec<ResourceEvent>;
}

/// Captures and restores resource state
#[async_trait::async_trait]
pub trait SnapshotManager: Send + Sync {
    /// Capture the current state of a resource
    ///
    /// `parameters` are the action parameters the capture is taken for
    /// (namespace, region and so on). They are stored on the snapshot so
    /// that a restore addresses the same resource.
    ///
    /// # Errors
    /// Returns [`RemedyError::SnapshotFailed`], carrying the failure kind,
    /// when capture is refused or fails.
    async fn create_snapshot(
        &self,
        resource_id: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<Snapshot, RemedyError>;

    /// Live snapshot by id, without touching the provider
    fn find_snapshot(&self, snapshot_id: &SnapshotId) -> Option<Snapshot>;

    /// Re-apply a captured snapshot
    ///
    /// Unknown or expired ids return FAILED with a "not found" message.
    async fn rollback(&self, snapshot_id: &SnapshotId) -> ExecutionResult;
}

/// A full provider connector
pub trait Connector: ActionExecutor + SnapshotManager {
    /// Provider name this connector is registered under
    fn provider(&self) -> &str;
}
