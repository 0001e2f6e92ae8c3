//! Profile-driven provider connector
//!
//! Every path follows the same order: render the full command, validate the
//! rendered string, then make exactly one transport call. Nothing reaches
//! the transport when rendering or validation fails.

use crate::error::RenderError;
use crate::profile::ProviderProfile;
use crate::template::{CommandTemplate, Vars};
use crate::transport::{RemoteCommand, RemoteOutput, RemoteTransport};
use chrono::SecondsFormat;
use remedy_kernel::api::{ActionExecutor, Connector, SnapshotManager};
use remedy_kernel::error::RemedyError;
use remedy_kernel::safety::SafetyValidator;
use remedy_kernel::snapshot::{Snapshot, SnapshotStore};
use remedy_kernel::types::{
    Environment, ExecutionResult, FailureKind, Health, RemediationAction, Resource, ResourceEvent,
    SnapshotId, TimeRange,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Default snapshot capacity for a connector with its own store
const DEFAULT_SNAPSHOT_CAPACITY: usize = 500;

/// Why a command never left the connector
#[derive(Debug)]
struct Refused {
    kind: FailureKind,
    message: String,
}

impl From<Refused> for ExecutionResult {
    fn from(refused: Refused) -> Self {
        ExecutionResult::failed(refused.kind, refused.message)
    }
}

/// Connector for one provider, driven by a [`ProviderProfile`]
pub struct ProviderConnector {
    profile: ProviderProfile,
    transport: Arc<dyn RemoteTransport>,
    validator: Arc<SafetyValidator>,
    store: Arc<SnapshotStore>,
}

impl std::fmt::Debug for ProviderConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConnector")
            .field("provider", &self.profile.name)
            .field("snapshots", &self.store.len())
            .finish_non_exhaustive()
    }
}

impl ProviderConnector {
    /// Connector with the built-in blocklist and a private snapshot store
    #[must_use]
    pub fn new(profile: ProviderProfile, transport: Arc<dyn RemoteTransport>) -> Self {
        Self {
            profile,
            transport,
            validator: Arc::new(SafetyValidator::new()),
            store: Arc::new(SnapshotStore::new(DEFAULT_SNAPSHOT_CAPACITY)),
        }
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Arc<SafetyValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Share a snapshot store with other connectors
    #[must_use]
    pub fn with_store(mut self, store: Arc<SnapshotStore>) -> Self {
        self.store = store;
        self
    }

    #[must_use]
    pub fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    #[must_use]
    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Placeholder values for an action: profile defaults, then action
    /// parameters, then the fields of the action itself
    fn action_vars(&self, action: &RemediationAction) -> Vars {
        let mut vars = self.scoped_vars(&action.target_resource, &action.parameters);
        vars.insert("environment".to_string(), action.environment.to_string());
        vars
    }

    /// Defaults overlaid with `parameters`; the target always wins
    fn scoped_vars(&self, resource_id: &str, parameters: &BTreeMap<String, String>) -> Vars {
        let mut vars = self.profile.defaults.clone();
        vars.extend(parameters.clone());
        vars.insert("target".to_string(), resource_id.to_string());
        vars
    }

    fn target_vars(&self, resource_id: &str) -> Vars {
        self.scoped_vars(resource_id, &BTreeMap::new())
    }

    /// Render then validate
    fn prepare(&self, template: &CommandTemplate, vars: &Vars) -> Result<String, Refused> {
        let line = template.render(vars).map_err(|err: RenderError| Refused {
            kind: FailureKind::from(&err),
            message: format!("render failed: {err}"),
        })?;

        self.validator.validate(&line).map_err(|violation| Refused {
            kind: FailureKind::SafetyViolation,
            message: format!("safety violation: {violation}"),
        })?;

        Ok(line)
    }

    /// The single transport call for one operation
    async fn send(&self, command: RemoteCommand) -> Result<RemoteOutput, Refused> {
        tracing::debug!("{} <- {}", self.profile.name, command.line);
        self.transport.call(&command).await.map_err(|err| Refused {
            kind: FailureKind::from(&err),
            message: format!("transport error: {err}"),
        })
    }

    fn fallback_environment(&self) -> &str {
        self.profile
            .defaults
            .get("environment")
            .map_or("unknown", String::as_str)
    }
}

/// `deployments` and `Deployment` name the same type
fn same_resource_type(requested: &str, actual: &str) -> bool {
    requested
        .trim_end_matches('s')
        .eq_ignore_ascii_case(actual.trim_end_matches('s'))
}

#[async_trait::async_trait]
impl ActionExecutor for ProviderConnector {
    async fn execute_action(&self, action: &RemediationAction) -> ExecutionResult {
        let provider = &self.profile.name;
        let operation = &action.action_type;

        let Some(template) = self.profile.operation(operation) else {
            tracing::warn!("{} has no template for {}", provider, operation);
            return ExecutionResult::failed(
                FailureKind::UnsupportedAction,
                format!("unsupported action: {operation} on {provider}"),
            )
            .with_action(action.id);
        };

        let result = match self.prepare(template, &self.action_vars(action)) {
            Err(refused) => refused.into(),
            Ok(line) => match self.send(RemoteCommand::new(line)).await {
                Err(refused) => refused.into(),
                Ok(out) if out.success() => ExecutionResult::success(format!(
                    "{operation} on {} succeeded",
                    action.target_resource
                )),
                Ok(out) => ExecutionResult::failed(
                    FailureKind::Remote,
                    format!(
                        "{operation} on {} failed (exit {}): {}",
                        action.target_resource,
                        out.exit_code,
                        out.diagnostic()
                    ),
                ),
            },
        };
        result.with_action(action.id)
    }

    async fn get_health(&self, resource_id: &str) -> Health {
        let check = &self.profile.health;
        let line = match self.prepare(&check.template, &self.target_vars(resource_id)) {
            Ok(line) => line,
            Err(refused) => {
                tracing::warn!("health of {} not queried: {}", resource_id, refused.message);
                return Health::unhealthy(resource_id, refused.message);
            }
        };

        match self.send(RemoteCommand::new(line)).await {
            Ok(out) => {
                let status = out.stdout.lines().next().unwrap_or_default().trim().to_string();
                if check.is_healthy(out.success(), &status) {
                    Health::healthy(resource_id, status)
                } else if out.success() {
                    Health::unhealthy(resource_id, status)
                } else {
                    Health::unhealthy(resource_id, out.diagnostic())
                }
            }
            Err(refused) => {
                tracing::warn!("health of {} unavailable: {}", resource_id, refused.message);
                Health::unhealthy(resource_id, refused.message)
            }
        }
    }

    async fn list_resources(
        &self,
        resource_type: Option<&str>,
        environment: Option<&Environment>,
    ) -> Vec<Resource> {
        let mut vars = self.profile.defaults.clone();
        if let Some(kind) = resource_type {
            vars.insert("resource_type".to_string(), kind.to_string());
        }

        let line = match self.prepare(&self.profile.inventory, &vars) {
            Ok(line) => line,
            Err(refused) => {
                tracing::warn!("inventory of {} not queried: {}", self.profile.name, refused.message);
                return Vec::new();
            }
        };
        let out = match self.send(RemoteCommand::new(line)).await {
            Ok(out) if out.success() => out,
            Ok(out) => {
                tracing::warn!("inventory of {} failed: {}", self.profile.name, out.diagnostic());
                return Vec::new();
            }
            Err(refused) => {
                tracing::warn!("inventory of {} unavailable: {}", self.profile.name, refused.message);
                return Vec::new();
            }
        };

        (self.profile.parse_inventory)(&out.stdout, &self.profile.name, self.fallback_environment())
            .into_iter()
            .filter(|r| resource_type.map_or(true, |t| same_resource_type(t, &r.resource_type)))
            .filter(|r| environment.map_or(true, |e| r.environment.eq_ignore_ascii_case(e.as_str())))
            .collect()
    }

    async fn get_events(&self, resource_id: &str, range: TimeRange) -> Vec<ResourceEvent> {
        let mut vars = self.target_vars(resource_id);
        vars.insert(
            "start".to_string(),
            range.start.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        vars.insert(
            "end".to_string(),
            range.end.to_rfc3339_opts(SecondsFormat::Secs, true),
        );

        let line = match self.prepare(&self.profile.events, &vars) {
            Ok(line) => line,
            Err(refused) => {
                tracing::warn!("events of {} not queried: {}", resource_id, refused.message);
                return Vec::new();
            }
        };
        match self.send(RemoteCommand::new(line)).await {
            Ok(out) if out.success() => (self.profile.parse_events)(&out.stdout, resource_id)
                .into_iter()
                .filter(|e| range.contains(e.timestamp))
                .collect(),
            Ok(out) => {
                tracing::warn!("events of {} failed: {}", resource_id, out.diagnostic());
                Vec::new()
            }
            Err(refused) => {
                tracing::warn!("events of {} unavailable: {}", resource_id, refused.message);
                Vec::new()
            }
        }
    }
}

#[async_trait::async_trait]
impl SnapshotManager for ProviderConnector {
    async fn create_snapshot(
        &self,
        resource_id: &str,
        parameters: &BTreeMap<String, String>,
    ) -> Result<Snapshot, RemedyError> {
        let refused = |r: Refused| RemedyError::SnapshotFailed {
            kind: r.kind,
            message: r.message,
        };

        let line = self
            .prepare(&self.profile.capture, &self.scoped_vars(resource_id, parameters))
            .map_err(refused)?;
        let out = self.send(RemoteCommand::new(line)).await.map_err(refused)?;
        if !out.success() {
            return Err(RemedyError::SnapshotFailed {
                kind: FailureKind::Remote,
                message: format!("capture of {resource_id} failed (exit {}): {}", out.exit_code, out.diagnostic()),
            });
        }

        let snapshot = Snapshot::new(
            self.profile.name.clone(),
            resource_id,
            self.profile.snapshot_type.clone(),
            out.stdout.trim_end(),
        )
        .with_parameters(parameters.clone());
        self.store.insert(snapshot.clone());
        tracing::debug!("stored {} for {}", snapshot.id, resource_id);
        Ok(snapshot)
    }

    fn find_snapshot(&self, snapshot_id: &SnapshotId) -> Option<Snapshot> {
        self.store
            .get(snapshot_id)
            .filter(|s| s.provider == self.profile.name)
    }

    async fn rollback(&self, snapshot_id: &SnapshotId) -> ExecutionResult {
        let Some(snapshot) = self.find_snapshot(snapshot_id) else {
            return ExecutionResult::failed(
                FailureKind::NotFound,
                format!("snapshot {snapshot_id} not found"),
            );
        };

        if !snapshot.verify() {
            tracing::warn!("snapshot {} failed its digest check", snapshot_id);
            return ExecutionResult::failed(
                FailureKind::Integrity,
                format!("snapshot {snapshot_id} payload does not match its digest"),
            )
            .with_snapshot(snapshot_id.clone());
        }

        let vars = self.scoped_vars(&snapshot.resource_id, &snapshot.parameters);
        let result = match self.prepare(&self.profile.restore, &vars) {
            Err(refused) => refused.into(),
            Ok(line) => {
                let command = RemoteCommand::new(line).with_stdin(snapshot.payload.clone());
                match self.send(command).await {
                    Err(refused) => refused.into(),
                    Ok(out) if out.success() => ExecutionResult::success(format!(
                        "restored {} from {}",
                        snapshot.resource_id, snapshot_id
                    )),
                    Ok(out) => ExecutionResult::failed(
                        FailureKind::Remote,
                        format!(
                            "restore of {} failed (exit {}): {}",
                            snapshot.resource_id,
                            out.exit_code,
                            out.diagnostic()
                        ),
                    ),
                }
            }
        };
        result.with_snapshot(snapshot_id.clone())
    }
}

impl Connector for ProviderConnector {
    fn provider(&self) -> &str {
        &self.profile.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use parking_lot::Mutex;

    /// Answers every call with one canned output and records the lines
    struct Canned {
        output: RemoteOutput,
        calls: Mutex<Vec<RemoteCommand>>,
    }

    #[async_trait::async_trait]
    impl RemoteTransport for Canned {
        async fn call(&self, command: &RemoteCommand) -> Result<RemoteOutput, TransportError> {
            self.calls.lock().push(command.clone());
            Ok(self.output.clone())
        }
    }

    fn connector(output: RemoteOutput) -> (ProviderConnector, Arc<Canned>) {
        let transport = Arc::new(Canned {
            output,
            calls: Mutex::new(Vec::new()),
        });
        (
            ProviderConnector::new(ProviderProfile::windows(), transport.clone()),
            transport,
        )
    }

    #[test]
    fn resource_types_match_loosely() {
        assert!(same_resource_type("deployments", "deployment"));
        assert!(same_resource_type("Service", "service"));
        assert!(!same_resource_type("pods", "deployment"));
    }

    #[tokio::test]
    async fn parameters_cannot_override_target() {
        let (conn, transport) = connector(RemoteOutput::ok(""));
        let action = RemediationAction::new("restart_service", "spooler", Environment::Production)
            .with_parameter("target", "other");
        assert!(conn.execute_action(&action).await.is_success());
        assert_eq!(
            transport.calls.lock()[0].line,
            "Restart-Service -Name 'spooler' -Force"
        );
    }

    #[tokio::test]
    async fn remote_failure_carries_diagnostic() {
        let (conn, _) = connector(RemoteOutput::failed(1, "Cannot find any service"));
        let action = RemediationAction::new("restart_service", "nosuch", Environment::Staging);
        let result = conn.execute_action(&action).await;
        assert_eq!(result.failure, Some(FailureKind::Remote));
        assert!(result.message.contains("Cannot find any service"));
        assert_eq!(result.action_id, Some(action.id));
    }

    #[tokio::test]
    async fn snapshot_from_another_provider_is_not_found() {
        let (conn, transport) = connector(RemoteOutput::ok(""));
        let foreign = Snapshot::new("kubernetes", "api", "deployment", "{}");
        let id = conn.store().insert(foreign);
        let result = conn.rollback(&id).await;
        assert_eq!(result.failure, Some(FailureKind::NotFound));
        assert!(transport.calls.lock().is_empty());
    }
}
