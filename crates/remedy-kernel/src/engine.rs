//! Remediation engine
//!
//! The service surface of the kernel. An engine is built explicitly from a
//! configuration, a connector router and an audit sink, then shared behind
//! an `Arc`. It owns the policy registry, the decision log, the execution
//! history and the lease table.
//!
//! [`RemediationEngine::remediate`] runs the whole pipeline for one
//! proposal:
//!
//! 1. Resolve the provider and check the policy applies to the environment
//! 2. Score the proposal and gate it
//! 3. Stop unless the outcome is `AUTO_EXECUTE`
//! 4. Take the lease on the target resource
//! 5. Capture a snapshot with the action's parameters, then execute
//! 6. On a failure that reached the remote side, roll back if configured

use crate::api::{ActionExecutor, Connector, SnapshotManager};
use crate::call::{guarded, guarded_execution, CallOptions};
use crate::config::EngineConfig;
use crate::decision_log::{
    DecisionFilter, DecisionLog, DecisionStats, ExecutionHistory, ExecutionKind, ExecutionRecord,
    RemediationDecision,
};
use crate::error::{PolicyError, RemedyError};
use crate::gate;
use crate::lease::LeaseTable;
use crate::lifecycle::{DecisionState, Lifecycle};
use crate::policy::{DecisionPolicy, PolicyRegistry, PolicySpec};
use crate::risk::{calculate_risk_score, RiskAssessment};
use crate::router::{ConnectorRouter, ProviderOutcome};
use crate::safety::SafetyValidator;
use crate::sink::{AuditEvent, EventSink};
use crate::snapshot::Snapshot;
use crate::types::{
    ActionType, DecisionId, DecisionOutcome, Environment, ExecutionResult, FailureKind, Health,
    PolicyId, RemediationAction, RemediationProposal, Resource, ResourceEvent, RiskLevel,
    SnapshotId, TimeRange,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outcome of [`RemediationEngine::remediate`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationReport {
    pub assessment: RiskAssessment,
    pub decision: RemediationDecision,
    /// Last lifecycle state reached
    pub final_state: DecisionState,
    /// Every lifecycle state visited, in order
    pub states: Vec<DecisionState>,
    pub snapshot_id: Option<SnapshotId>,
    pub execution: Option<ExecutionResult>,
    pub rollback: Option<ExecutionResult>,
}

impl RemediationReport {
    /// The action ran and succeeded
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.final_state == DecisionState::Succeeded
    }
}

/// Aggregate engine statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub decisions: DecisionStats,
    pub executions_succeeded: usize,
    pub executions_failed: usize,
    pub policies: usize,
    pub providers: Vec<String>,
}

/// Auto-remediation service
pub struct RemediationEngine {
    config: EngineConfig,
    router: Arc<ConnectorRouter>,
    sink: Arc<dyn EventSink>,
    validator: SafetyValidator,
    policies: PolicyRegistry,
    decisions: DecisionLog,
    executions: ExecutionHistory,
    leases: LeaseTable,
}

impl std::fmt::Debug for RemediationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemediationEngine")
            .field("router", &self.router)
            .field("decisions", &self.decisions.len())
            .field("policies", &self.policies.len())
            .finish_non_exhaustive()
    }
}

impl RemediationEngine {
    /// Build an engine and register the configured policies
    ///
    /// # Errors
    /// Returns [`RemedyError::Config`] if the configuration is invalid.
    pub fn new(
        config: EngineConfig,
        router: Arc<ConnectorRouter>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, RemedyError> {
        config.validate()?;
        let validator =
            SafetyValidator::with_additional_patterns(config.extra_blocked_patterns.iter().cloned())?;

        let engine = Self {
            policies: PolicyRegistry::new(config.policy_capacity),
            decisions: DecisionLog::new(config.decision_log_capacity),
            executions: ExecutionHistory::new(config.execution_history_capacity),
            leases: LeaseTable::new(),
            validator,
            router,
            sink,
            config,
        };

        for spec in engine.config.policies.clone() {
            engine.policies.register(spec)?;
        }

        tracing::info!(
            "remediation engine ready: {} providers, {} policies",
            engine.router.len(),
            engine.policies.len()
        );
        Ok(engine)
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn router(&self) -> &Arc<ConnectorRouter> {
        &self.router
    }

    /// The validator built from the configured patterns
    #[must_use]
    pub fn validator(&self) -> &SafetyValidator {
        &self.validator
    }

    // ---- scoring and gating ----

    /// Score a proposed action for a service
    #[must_use]
    pub fn calculate_risk_score(
        &self,
        service: &str,
        action_type: &ActionType,
        environment: &Environment,
        blast_radius: u32,
    ) -> RiskAssessment {
        let assessment = calculate_risk_score(action_type, environment, blast_radius);
        tracing::info!(
            "risk for {} {} in {} (blast radius {}): {} {}",
            service,
            action_type,
            environment,
            blast_radius,
            assessment.risk_score,
            assessment.risk_level
        );
        assessment
    }

    /// Validate and store a policy
    ///
    /// # Errors
    /// Returns [`RemedyError::Policy`] for invalid thresholds.
    pub fn register_policy(&self, spec: PolicySpec) -> Result<DecisionPolicy, RemedyError> {
        Ok(self.policies.register(spec)?)
    }

    /// # Errors
    /// Returns [`crate::error::PolicyError::NotFound`] for unknown or evicted ids.
    pub fn get_policy(&self, id: PolicyId) -> Result<DecisionPolicy, RemedyError> {
        Ok(self.policies.require(id)?)
    }

    #[must_use]
    pub fn list_policies(&self) -> Vec<DecisionPolicy> {
        self.policies.list()
    }

    /// Gate a scored action and record the decision
    ///
    /// # Errors
    /// Returns [`RemedyError::InvalidScore`] for a score outside `[0, 1]`
    /// and [`crate::error::PolicyError::NotFound`] for an unknown policy id. Nothing is
    /// recorded in either case.
    pub fn evaluate_decision(
        &self,
        service: &str,
        action_type: &ActionType,
        risk_score: f64,
        policy_id: Option<PolicyId>,
    ) -> Result<RemediationDecision, RemedyError> {
        let risk_score = gate::check_score(risk_score)?;
        let policy = policy_id
            .map(|id| self.policies.require(id))
            .transpose()?;

        let verdict = gate::evaluate(action_type, risk_score, policy.as_ref());
        let decision = RemediationDecision {
            id: DecisionId::new(),
            service: service.to_string(),
            action_type: action_type.clone(),
            risk_score,
            risk_level: RiskLevel::from_score(risk_score),
            outcome: verdict.outcome,
            policy_id,
            rationale: verdict.rationale,
            timestamp: Utc::now(),
        };

        tracing::info!(
            "decision {} for {} {}: score {} ({}) -> {}",
            decision.id,
            decision.service,
            decision.action_type,
            decision.risk_score,
            decision.risk_level,
            decision.outcome
        );

        self.decisions.record(decision.clone());
        self.sink.emit(AuditEvent::Decision {
            decision_id: decision.id,
            service: decision.service.clone(),
            action_type: decision.action_type.to_string(),
            risk_score: decision.risk_score,
            risk_level: decision.risk_level,
            outcome: decision.outcome,
            at: decision.timestamp,
        });
        Ok(decision)
    }

    /// Check a rendered command against the configured blocklist
    ///
    /// # Errors
    /// Returns [`RemedyError::Safety`] on a match.
    pub fn check_command(&self, rendered: &str) -> Result<(), RemedyError> {
        self.validator.validate(rendered).map_err(|violation| {
            self.sink.emit(AuditEvent::SafetyViolation {
                provider: String::new(),
                subject: rendered.to_string(),
                detail: violation.to_string(),
                at: Utc::now(),
            });
            RemedyError::from(violation)
        })
    }

    // ---- execution ----

    fn connector(&self, provider: &str) -> Result<Arc<dyn Connector>, RemedyError> {
        self.router.get(provider)
    }

    fn options(&self, options: CallOptions) -> CallOptions {
        options.or_timeout(self.config.call_timeout())
    }

    /// Run one action through a provider connector
    ///
    /// The target resource is leased for the duration of the call.
    ///
    /// # Errors
    /// Returns [`RemedyError::ConnectorUnavailable`] for unknown providers.
    /// Every other failure is a FAILED result.
    pub async fn execute_action(
        &self,
        provider: &str,
        action: &RemediationAction,
        options: CallOptions,
    ) -> Result<ExecutionResult, RemedyError> {
        let connector = self.connector(provider)?;
        let options = self.options(options);
        let key = LeaseTable::key(provider, &action.target_resource);

        let result = match guarded(&options, self.leases.acquire(&key)).await {
            Ok(_lease) => self.run_action(&*connector, provider, action, &options, None).await,
            Err(abort) => {
                tracing::warn!("lease on {} not acquired: {}", key, abort);
                ExecutionResult::failed(FailureKind::Busy, format!("resource {key} busy: {abort}"))
                    .with_action(action.id)
            }
        };
        Ok(result)
    }

    async fn run_action(
        &self,
        connector: &dyn Connector,
        provider: &str,
        action: &RemediationAction,
        options: &CallOptions,
        decision_id: Option<DecisionId>,
    ) -> ExecutionResult {
        let what = format!("{} on {}", action.action_type, action.target_resource);
        let result = guarded_execution(options, &what, connector.execute_action(action))
            .await
            .with_action(action.id);

        if result.is_success() {
            tracing::info!("{} via {} succeeded: {}", what, provider, result.message);
        } else {
            tracing::warn!(
                "{} via {} failed ({:?}): {}",
                what,
                provider,
                result.failure,
                result.message
            );
        }

        self.note_safety(provider, &action.target_resource, &result);
        self.executions.record(ExecutionRecord {
            kind: ExecutionKind::Execute,
            provider: provider.to_string(),
            subject: action.target_resource.clone(),
            decision_id,
            result: result.clone(),
        });
        self.sink.emit(AuditEvent::Execution {
            provider: provider.to_string(),
            target_resource: action.target_resource.clone(),
            result: result.clone(),
        });
        result
    }

    fn note_safety(&self, provider: &str, subject: &str, result: &ExecutionResult) {
        if result.failure == Some(FailureKind::SafetyViolation) {
            tracing::warn!("safety violation via {} on {}: {}", provider, subject, result.message);
            self.sink.emit(AuditEvent::SafetyViolation {
                provider: provider.to_string(),
                subject: subject.to_string(),
                detail: result.message.clone(),
                at: result.timestamp,
            });
        }
    }

    /// Capture the state of a resource
    ///
    /// `parameters` select the resource the same way the action that
    /// follows will (namespace, region). The resource is leased for the
    /// duration of the capture.
    ///
    /// # Errors
    /// Returns [`RemedyError::ConnectorUnavailable`] for unknown providers
    /// and [`RemedyError::SnapshotFailed`] when capture fails or is aborted.
    pub async fn create_snapshot(
        &self,
        provider: &str,
        resource_id: &str,
        parameters: &BTreeMap<String, String>,
        options: CallOptions,
    ) -> Result<Snapshot, RemedyError> {
        let connector = self.connector(provider)?;
        let options = self.options(options);
        let key = LeaseTable::key(provider, resource_id);

        let _lease = guarded(&options, self.leases.acquire(&key))
            .await
            .map_err(|abort| RemedyError::SnapshotFailed {
                kind: FailureKind::Busy,
                message: format!("resource {key} busy: {abort}"),
            })?;
        self.capture(&*connector, provider, resource_id, parameters, &options)
            .await
    }

    async fn capture(
        &self,
        connector: &dyn Connector,
        provider: &str,
        resource_id: &str,
        parameters: &BTreeMap<String, String>,
        options: &CallOptions,
    ) -> Result<Snapshot, RemedyError> {
        let capture = connector.create_snapshot(resource_id, parameters);
        let snapshot = match guarded(options, capture).await {
            Ok(result) => result,
            Err(abort) => Err(RemedyError::SnapshotFailed {
                kind: abort.failure_kind(),
                message: format!("capture of {resource_id} {abort}"),
            }),
        };

        match &snapshot {
            Ok(snap) => {
                tracing::info!("captured {} of {} via {}", snap.id, resource_id, provider);
                self.sink.emit(AuditEvent::SnapshotCaptured {
                    provider: provider.to_string(),
                    resource_id: resource_id.to_string(),
                    snapshot_id: snap.id.clone(),
                    at: snap.timestamp,
                });
            }
            Err(RemedyError::SnapshotFailed { kind, message }) => {
                tracing::warn!("capture of {} via {} failed: {}", resource_id, provider, message);
                if *kind == FailureKind::SafetyViolation {
                    self.sink.emit(AuditEvent::SafetyViolation {
                        provider: provider.to_string(),
                        subject: resource_id.to_string(),
                        detail: message.clone(),
                        at: Utc::now(),
                    });
                }
            }
            Err(err) => tracing::warn!("capture of {} via {} failed: {}", resource_id, provider, err),
        }
        snapshot
    }

    /// Restore a captured snapshot
    ///
    /// The snapshot's resource is leased for the duration of the restore.
    ///
    /// # Errors
    /// Returns [`RemedyError::ConnectorUnavailable`] for unknown providers.
    /// Unknown snapshot ids are a FAILED result mentioning "not found".
    pub async fn rollback(
        &self,
        provider: &str,
        snapshot_id: &SnapshotId,
        options: CallOptions,
    ) -> Result<ExecutionResult, RemedyError> {
        let connector = self.connector(provider)?;
        let options = self.options(options);

        // Unknown ids fall through to the connector, which reports them.
        let Some(snapshot) = connector.find_snapshot(snapshot_id) else {
            return Ok(self
                .restore(&*connector, provider, snapshot_id, &options, None)
                .await);
        };

        let key = LeaseTable::key(provider, &snapshot.resource_id);
        let result = match guarded(&options, self.leases.acquire(&key)).await {
            Ok(_lease) => {
                self.restore(&*connector, provider, snapshot_id, &options, None)
                    .await
            }
            Err(abort) => {
                tracing::warn!("lease on {} not acquired: {}", key, abort);
                ExecutionResult::failed(FailureKind::Busy, format!("resource {key} busy: {abort}"))
                    .with_snapshot(snapshot_id.clone())
            }
        };
        Ok(result)
    }

    async fn restore(
        &self,
        connector: &dyn Connector,
        provider: &str,
        snapshot_id: &SnapshotId,
        options: &CallOptions,
        decision_id: Option<DecisionId>,
    ) -> ExecutionResult {
        let what = format!("rollback of {snapshot_id}");
        let result = guarded_execution(options, &what, connector.rollback(snapshot_id)).await;

        if result.is_success() {
            tracing::info!("{} via {} succeeded", what, provider);
        } else {
            tracing::warn!("{} via {} failed: {}", what, provider, result.message);
        }

        self.note_safety(provider, snapshot_id.as_str(), &result);
        self.executions.record(ExecutionRecord {
            kind: ExecutionKind::Rollback,
            provider: provider.to_string(),
            subject: snapshot_id.to_string(),
            decision_id,
            result: result.clone(),
        });
        self.sink.emit(AuditEvent::Rollback {
            provider: provider.to_string(),
            snapshot_id: snapshot_id.clone(),
            result: result.clone(),
        });
        result
    }

    /// Score, gate and, when allowed, execute a proposal
    ///
    /// The provider and the policy are checked before anything is scored,
    /// so a rejected proposal leaves no decision behind.
    ///
    /// # Errors
    /// Returns an error for an unknown provider, an unknown policy or a
    /// policy registered for another environment. Execution problems are
    /// reported in the [`RemediationReport`].
    pub async fn remediate(
        &self,
        proposal: &RemediationProposal,
        options: CallOptions,
    ) -> Result<RemediationReport, RemedyError> {
        let connector = self.connector(&proposal.provider)?;
        if let Some(id) = proposal.policy_id {
            let policy = self.policies.require(id)?;
            if policy.environment != proposal.environment {
                return Err(PolicyError::EnvironmentMismatch {
                    policy: id,
                    expected: policy.environment,
                    actual: proposal.environment.clone(),
                }
                .into());
            }
        }

        let mut lifecycle = Lifecycle::new();

        let assessment = self.calculate_risk_score(
            &proposal.service,
            &proposal.action_type,
            &proposal.environment,
            proposal.blast_radius,
        );
        lifecycle.advance(DecisionState::Scored)?;

        let decision = self.evaluate_decision(
            &proposal.service,
            &proposal.action_type,
            assessment.risk_score,
            proposal.policy_id,
        )?;
        lifecycle.advance(DecisionState::from(decision.outcome))?;

        let mut report = RemediationReport {
            assessment,
            decision,
            final_state: lifecycle.state(),
            states: Vec::new(),
            snapshot_id: None,
            execution: None,
            rollback: None,
        };

        if !report.decision.outcome.is_executable() {
            tracing::info!(
                "{} {} not executed: {}",
                proposal.service,
                proposal.operation,
                report.decision.outcome
            );
            report.states = lifecycle.history().to_vec();
            return Ok(report);
        }

        let options = self.options(options);
        let action = proposal.to_action(report.assessment.risk_level);
        let key = LeaseTable::key(&proposal.provider, &proposal.target_resource);
        let decision_id = Some(report.decision.id);

        lifecycle.advance(DecisionState::Executing)?;
        let _lease = match guarded(&options, self.leases.acquire(&key)).await {
            Ok(lease) => lease,
            Err(abort) => {
                let result = ExecutionResult::failed(
                    FailureKind::Busy,
                    format!("resource {key} busy: {abort}"),
                )
                .with_action(action.id);
                lifecycle.advance(DecisionState::Failed)?;
                report.execution = Some(result);
                return Ok(finish(report, &lifecycle));
            }
        };

        let snapshot = match self
            .capture(
                &*connector,
                &proposal.provider,
                &proposal.target_resource,
                &proposal.parameters,
                &options,
            )
            .await
        {
            Ok(snapshot) => snapshot,
            Err(err) => {
                let kind = match &err {
                    RemedyError::SnapshotFailed { kind, .. } => *kind,
                    _ => FailureKind::Remote,
                };
                let result = ExecutionResult::failed(
                    kind,
                    format!("not executed, snapshot capture failed: {err}"),
                )
                .with_action(action.id);
                lifecycle.advance(DecisionState::Failed)?;
                report.execution = Some(result);
                return Ok(finish(report, &lifecycle));
            }
        };
        report.snapshot_id = Some(snapshot.id.clone());

        let result = self
            .run_action(&*connector, &proposal.provider, &action, &options, decision_id)
            .await
            .with_snapshot(snapshot.id.clone());

        if result.is_success() {
            lifecycle.advance(DecisionState::Succeeded)?;
            report.execution = Some(result);
            return Ok(finish(report, &lifecycle));
        }

        lifecycle.advance(DecisionState::Failed)?;
        let reached_remote = result.failure.map_or(true, |kind| !kind.is_pre_flight());
        report.execution = Some(result);

        if self.config.auto_rollback_on_failure && reached_remote {
            // The caller's cancel may already have fired; the restore must still run.
            let rollback_options = CallOptions::new().with_timeout(self.config.call_timeout());
            let rollback = self
                .restore(
                    &*connector,
                    &proposal.provider,
                    &snapshot.id,
                    &rollback_options,
                    decision_id,
                )
                .await;
            if rollback.is_success() {
                lifecycle.advance(DecisionState::RolledBack)?;
            }
            report.rollback = Some(rollback);
        }

        Ok(finish(report, &lifecycle))
    }

    // ---- read paths ----

    /// # Errors
    /// Returns [`RemedyError::ConnectorUnavailable`] for unknown providers.
    pub async fn get_health(
        &self,
        provider: &str,
        resource_id: &str,
        options: CallOptions,
    ) -> Result<Health, RemedyError> {
        let connector = self.connector(provider)?;
        let options = self.options(options);
        Ok(match guarded(&options, connector.get_health(resource_id)).await {
            Ok(health) => health,
            Err(abort) => {
                tracing::warn!("health of {} via {} aborted: {}", resource_id, provider, abort);
                Health::unhealthy(resource_id, abort.to_string())
            }
        })
    }

    /// # Errors
    /// Returns [`RemedyError::ConnectorUnavailable`] for unknown providers.
    pub async fn list_resources(
        &self,
        provider: &str,
        resource_type: Option<&str>,
        environment: Option<&Environment>,
        options: CallOptions,
    ) -> Result<Vec<Resource>, RemedyError> {
        let connector = self.connector(provider)?;
        let options = self.options(options);
        Ok(
            match guarded(&options, connector.list_resources(resource_type, environment)).await {
                Ok(resources) => resources,
                Err(abort) => {
                    tracing::warn!("inventory via {} aborted: {}", provider, abort);
                    Vec::new()
                }
            },
        )
    }

    /// # Errors
    /// Returns [`RemedyError::ConnectorUnavailable`] for unknown providers.
    pub async fn get_events(
        &self,
        provider: &str,
        resource_id: &str,
        range: TimeRange,
        options: CallOptions,
    ) -> Result<Vec<ResourceEvent>, RemedyError> {
        let connector = self.connector(provider)?;
        let options = self.options(options);
        Ok(match guarded(&options, connector.get_events(resource_id, range)).await {
            Ok(events) => events,
            Err(abort) => {
                tracing::warn!("events of {} via {} aborted: {}", resource_id, provider, abort);
                Vec::new()
            }
        })
    }

    /// Inventory from every registered provider
    pub async fn fleet_inventory(
        &self,
        resource_type: Option<&str>,
        environment: Option<&Environment>,
        options: CallOptions,
    ) -> BTreeMap<String, ProviderOutcome<Vec<Resource>>> {
        let options = self.options(options);
        self.router
            .fleet_inventory(resource_type, environment, &options)
            .await
    }

    /// Health of the given resources on every registered provider
    pub async fn health_sweep(
        &self,
        resource_ids: &[String],
        options: CallOptions,
    ) -> BTreeMap<String, ProviderOutcome<Vec<Health>>> {
        let options = self.options(options);
        self.router.health_sweep(resource_ids, &options).await
    }

    // ---- history ----

    #[must_use]
    pub fn list_decisions(
        &self,
        service: Option<&str>,
        outcome: Option<DecisionOutcome>,
    ) -> Vec<RemediationDecision> {
        let filter = DecisionFilter {
            service: service.map(str::to_string),
            outcome,
        };
        self.decisions.list(&filter)
    }

    /// # Errors
    /// Returns [`RemedyError::DecisionNotFound`] for unknown or evicted ids.
    pub fn get_decision(&self, id: DecisionId) -> Result<RemediationDecision, RemedyError> {
        self.decisions
            .get(id)
            .ok_or(RemedyError::DecisionNotFound(id))
    }

    #[must_use]
    pub fn list_executions(&self) -> Vec<ExecutionRecord> {
        self.executions.list()
    }

    #[must_use]
    pub fn get_stats(&self) -> EngineStats {
        let (executions_succeeded, executions_failed) = self.executions.tally();
        EngineStats {
            decisions: self.decisions.stats(),
            executions_succeeded,
            executions_failed,
            policies: self.policies.len(),
            providers: self.router.providers(),
        }
    }

    /// Drop lease entries nobody holds
    pub fn prune_leases(&self) -> usize {
        self.leases.prune_idle()
    }
}

fn finish(mut report: RemediationReport, lifecycle: &Lifecycle) -> RemediationReport {
    report.final_state = lifecycle.state();
    report.states = lifecycle.history().to_vec();
    report
}
