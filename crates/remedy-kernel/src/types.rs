//! Core types for the remediation kernel
//!
//! Defines the vocabulary shared by every component:
//! - Identifiers for decisions, policies, snapshots and actions
//! - Action types, environments, risk levels and decision outcomes
//! - Execution results and the read-path records returned by connectors

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;
use uuid::Uuid;

/// Unique decision identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DecisionId(pub Ulid);

impl DecisionId {
    /// Generate new decision ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for DecisionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique action identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ActionId(pub Ulid);

impl ActionId {
    /// Generate new action ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Policy identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyId(pub Uuid);

impl PolicyId {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PolicyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot identifier
///
/// Kept as an opaque string so that ids handed back by callers (including
/// ids that were never issued) can be looked up without a parse step.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SnapshotId(pub String);

impl SnapshotId {
    /// Generate new snapshot ID
    #[must_use]
    pub fn new() -> Self {
        Self(format!("snap-{}", Uuid::new_v4().simple()))
    }

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for SnapshotId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SnapshotId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Class of corrective action, used for risk scoring and allow-lists
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    Restart,
    Scale,
    Rollback,
    Failover,
    Patch,
    /// Any action type without a dedicated variant (stored lowercase)
    Custom(String),
}

impl ActionType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            ActionType::Restart => "restart",
            ActionType::Scale => "scale",
            ActionType::Rollback => "rollback",
            ActionType::Failover => "failover",
            ActionType::Patch => "patch",
            ActionType::Custom(name) => name,
        }
    }

    /// Classify a provider operation name by its leading verb
    ///
    /// `restart_service` and `restart-deployment` both classify as
    /// [`ActionType::Restart`].
    #[must_use]
    pub fn from_operation(operation: &str) -> Self {
        let verb = operation
            .trim()
            .split(['_', '-', ' '])
            .next()
            .unwrap_or(operation);
        Self::parse(verb)
    }

    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "restart" => ActionType::Restart,
            "scale" => ActionType::Scale,
            "rollback" => ActionType::Rollback,
            "failover" => ActionType::Failover,
            "patch" => ActionType::Patch,
            other => ActionType::Custom(other.to_string()),
        }
    }
}

impl FromStr for ActionType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for ActionType {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<String> for ActionType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<ActionType> for String {
    fn from(value: ActionType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment environment of the target resource
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Environment {
    Production,
    Staging,
    Development,
    Custom(String),
}

impl Environment {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Environment::Production => "production",
            Environment::Staging => "staging",
            Environment::Development => "development",
            Environment::Custom(name) => name,
        }
    }

    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" => Environment::Production,
            "staging" => Environment::Staging,
            "development" => Environment::Development,
            other => Environment::Custom(other.to_string()),
        }
    }
}

impl FromStr for Environment {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for Environment {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<String> for Environment {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<Environment> for String {
    fn from(value: Environment) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk level bucketed from a risk score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Minimal,
    Low,
    Moderate,
    High,
    Extreme,
}

impl RiskLevel {
    /// Bucket a score into a level
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score < 0.2 {
            RiskLevel::Minimal
        } else if score < 0.4 {
            RiskLevel::Low
        } else if score < 0.6 {
            RiskLevel::Moderate
        } else if score < 0.8 {
            RiskLevel::High
        } else {
            RiskLevel::Extreme
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Minimal => "MINIMAL",
            RiskLevel::Low => "LOW",
            RiskLevel::Moderate => "MODERATE",
            RiskLevel::High => "HIGH",
            RiskLevel::Extreme => "EXTREME",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal classification of a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionOutcome {
    AutoExecute,
    RequireApproval,
    Defer,
    Escalate,
    Block,
}

impl DecisionOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionOutcome::AutoExecute => "AUTO_EXECUTE",
            DecisionOutcome::RequireApproval => "REQUIRE_APPROVAL",
            DecisionOutcome::Defer => "DEFER",
            DecisionOutcome::Escalate => "ESCALATE",
            DecisionOutcome::Block => "BLOCK",
        }
    }

    /// Only auto-execute decisions may proceed to execution in this engine
    #[inline]
    #[must_use]
    pub fn is_executable(&self) -> bool {
        matches!(self, DecisionOutcome::AutoExecute)
    }
}

impl fmt::Display for DecisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single execute or rollback call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

/// Why an execution failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Rendered command matched a destructive pattern; never sent
    SafetyViolation,
    /// Operation has no template for this provider; never sent
    UnsupportedAction,
    /// Template could not be rendered from the supplied parameters
    Render,
    /// Remote side reported a non-success status
    Remote,
    /// Transport could not deliver the call
    Transport,
    Timeout,
    Cancelled,
    /// Unknown snapshot or resource
    NotFound,
    /// Snapshot payload failed its digest check
    Integrity,
    /// Another remediation holds the resource lease
    Busy,
}

impl FailureKind {
    /// Failures detected before any remote call was attempted
    #[inline]
    #[must_use]
    pub fn is_pre_flight(&self) -> bool {
        matches!(
            self,
            FailureKind::SafetyViolation
                | FailureKind::UnsupportedAction
                | FailureKind::Render
                | FailureKind::NotFound
                | FailureKind::Integrity
                | FailureKind::Busy
        )
    }
}

/// Result of an execute or rollback call
///
/// Produced once per call and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub failure: Option<FailureKind>,
    pub message: String,
    pub snapshot_id: Option<SnapshotId>,
    pub action_id: Option<ActionId>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionResult {
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Success,
            failure: None,
            message: message.into(),
            snapshot_id: None,
            action_id: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            failure: Some(kind),
            message: message.into(),
            snapshot_id: None,
            action_id: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_snapshot(mut self, snapshot_id: SnapshotId) -> Self {
        self.snapshot_id = Some(snapshot_id);
        self
    }

    #[must_use]
    pub fn with_action(mut self, action_id: ActionId) -> Self {
        self.action_id = Some(action_id);
        self
    }

    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// A concrete operation to run against a remote resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationAction {
    pub id: ActionId,
    /// Provider operation name, e.g. `restart_service`
    pub action_type: String,
    pub target_resource: String,
    pub environment: Environment,
    pub risk_level: RiskLevel,
    pub parameters: BTreeMap<String, String>,
}

impl RemediationAction {
    #[must_use]
    pub fn new(
        operation: impl Into<String>,
        target_resource: impl Into<String>,
        environment: Environment,
    ) -> Self {
        Self {
            id: ActionId::new(),
            action_type: operation.into(),
            target_resource: target_resource.into(),
            environment,
            risk_level: RiskLevel::Minimal,
            parameters: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_risk_level(mut self, level: RiskLevel) -> Self {
        self.risk_level = level;
        self
    }

    /// Risk class of this operation
    #[must_use]
    pub fn classified_type(&self) -> ActionType {
        ActionType::from_operation(&self.action_type)
    }
}

/// A proposed remediation, prior to scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationProposal {
    pub service: String,
    pub action_type: ActionType,
    pub target_resource: String,
    pub environment: Environment,
    /// Number of units the remediation could affect
    pub blast_radius: u32,
    /// Connector that would carry out the action
    pub provider: String,
    /// Provider operation name
    pub operation: String,
    pub parameters: BTreeMap<String, String>,
    /// Policy to gate under; default thresholds apply when absent
    pub policy_id: Option<PolicyId>,
}

impl RemediationProposal {
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        operation: impl Into<String>,
        target_resource: impl Into<String>,
        environment: Environment,
        blast_radius: u32,
    ) -> Self {
        let operation = operation.into();
        Self {
            service: service.into(),
            action_type: ActionType::from_operation(&operation),
            target_resource: target_resource.into(),
            environment,
            blast_radius,
            provider: String::new(),
            operation,
            parameters: BTreeMap::new(),
            policy_id: None,
        }
    }

    #[must_use]
    pub fn under_policy(mut self, policy_id: PolicyId) -> Self {
        self.policy_id = Some(policy_id);
        self
    }

    #[must_use]
    pub fn on_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    #[must_use]
    pub fn with_action_type(mut self, action_type: ActionType) -> Self {
        self.action_type = action_type;
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Build the concrete action this proposal would execute
    #[must_use]
    pub fn to_action(&self, risk_level: RiskLevel) -> RemediationAction {
        RemediationAction {
            id: ActionId::new(),
            action_type: self.operation.clone(),
            target_resource: self.target_resource.clone(),
            environment: self.environment.clone(),
            risk_level,
            parameters: self.parameters.clone(),
        }
    }
}

/// Health of a single resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub healthy: bool,
    pub status: String,
    pub resource_id: String,
}

impl Health {
    #[must_use]
    pub fn healthy(resource_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            healthy: true,
            status: status.into(),
            resource_id: resource_id.into(),
        }
    }

    #[must_use]
    pub fn unhealthy(resource_id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            healthy: false,
            status: status.into(),
            resource_id: resource_id.into(),
        }
    }
}

/// Inventory entry reported by a connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub status: String,
}

/// Event reported for a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceEvent {
    pub resource_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

/// Closed time interval used for event queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The window ending now
    #[must_use]
    pub fn last(window: ChronoDuration) -> Self {
        let end = Utc::now();
        Self {
            start: end - window,
            end,
        }
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_type_parses_case_insensitively() {
        assert_eq!("RESTART".parse::<ActionType>().unwrap(), ActionType::Restart);
        assert_eq!(ActionType::from("Failover"), ActionType::Failover);
        assert_eq!(
            ActionType::from("drain"),
            ActionType::Custom("drain".to_string())
        );
    }

    #[test]
    fn operation_names_classify_by_verb() {
        assert_eq!(ActionType::from_operation("restart_service"), ActionType::Restart);
        assert_eq!(ActionType::from_operation("scale-deployment"), ActionType::Scale);
        assert_eq!(ActionType::from_operation("patch"), ActionType::Patch);
        assert_eq!(
            ActionType::from_operation("kill_process"),
            ActionType::Custom("kill".to_string())
        );
    }

    #[test]
    fn enums_serialize_as_wire_strings() {
        let json = serde_json::to_string(&DecisionOutcome::RequireApproval).unwrap();
        assert_eq!(json, "\"REQUIRE_APPROVAL\"");

        let json = serde_json::to_string(&ActionType::Rollback).unwrap();
        assert_eq!(json, "\"rollback\"");

        let env: Environment = serde_json::from_str("\"Production\"").unwrap();
        assert_eq!(env, Environment::Production);
    }

    #[test]
    fn risk_level_buckets() {
        assert_eq!(RiskLevel::from_score(0.0), RiskLevel::Minimal);
        assert_eq!(RiskLevel::from_score(0.2), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(0.4), RiskLevel::Moderate);
        assert_eq!(RiskLevel::from_score(0.6), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.8), RiskLevel::Extreme);
        assert_eq!(RiskLevel::from_score(1.0), RiskLevel::Extreme);
    }

    #[test]
    fn time_range_contains_bounds() {
        let range = TimeRange::last(ChronoDuration::minutes(5));
        assert!(range.contains(range.start));
        assert!(range.contains(range.end));
        assert!(!range.contains(range.end + ChronoDuration::seconds(1)));
    }
}
