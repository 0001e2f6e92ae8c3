//! Provider profiles
//!
//! A profile is the data half of a connector: per-operation command
//! templates, the capture and restore commands for snapshots, the health,
//! inventory and event queries, and the parsers for their output.
//!
//! Built-in profiles:
//! - `aws` drives the AWS CLI (EC2, Auto Scaling, RDS, ECS)
//! - `kubernetes` drives `kubectl`
//! - `windows` drives PowerShell service cmdlets

use crate::template::{CommandTemplate, Vars};
use crate::transport::Shell;
use chrono::{DateTime, TimeZone, Utc};
use remedy_kernel::types::{Resource, ResourceEvent};
use serde_json::Value;
use std::collections::BTreeMap;

/// Parses inventory output: `(stdout, provider, fallback environment)`
pub type InventoryParser = fn(&str, &str, &str) -> Vec<Resource>;

/// Parses event output: `(stdout, resource id)`
pub type EventParser = fn(&str, &str) -> Vec<ResourceEvent>;

/// Health query and how to read its result
#[derive(Debug, Clone)]
pub struct HealthCheck {
    pub template: CommandTemplate,
    /// Case-insensitive states that count as healthy; empty means a zero
    /// exit code is enough
    pub healthy_states: Vec<String>,
}

impl HealthCheck {
    /// Interpret one health response
    #[must_use]
    pub fn is_healthy(&self, exit_ok: bool, status: &str) -> bool {
        if !exit_ok {
            return false;
        }
        self.healthy_states.is_empty()
            || self
                .healthy_states
                .iter()
                .any(|s| s.eq_ignore_ascii_case(status.trim()))
    }
}

/// Command set and parsers for one provider
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub name: String,
    pub shell: Shell,
    /// Placeholder defaults, overridden by action parameters
    pub defaults: Vars,
    pub operations: BTreeMap<String, CommandTemplate>,
    pub capture: CommandTemplate,
    pub snapshot_type: String,
    /// Restore command; the snapshot payload is written to its stdin
    pub restore: CommandTemplate,
    pub health: HealthCheck,
    /// Receives `{resource_type}`
    pub inventory: CommandTemplate,
    pub parse_inventory: InventoryParser,
    /// Receives `{target}`, `{start}` and `{end}` (RFC 3339)
    pub events: CommandTemplate,
    pub parse_events: EventParser,
}

impl ProviderProfile {
    /// Template for an operation, if the provider supports it
    #[must_use]
    pub fn operation(&self, name: &str) -> Option<&CommandTemplate> {
        self.operations.get(name)
    }

    /// Supported operation names, sorted
    pub fn operations(&self) -> impl Iterator<Item = &str> {
        self.operations.keys().map(String::as_str)
    }

    #[must_use]
    pub fn with_default(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_operation(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.operations
            .insert(name.into(), CommandTemplate::new(template.into()));
        self
    }

    /// AWS CLI profile; resources are EC2 instance ids unless the operation
    /// names another service
    #[must_use]
    pub fn aws() -> Self {
        Self {
            name: "aws".to_string(),
            shell: Shell::Posix,
            defaults: vars(&[("resource_type", "instance"), ("region", "us-east-1")]),
            operations: templates(&[
                ("reboot_instance", "aws ec2 reboot-instances --region {region} --instance-ids {target}"),
                ("restart_instance", "aws ec2 reboot-instances --region {region} --instance-ids {target}"),
                ("start_instance", "aws ec2 start-instances --region {region} --instance-ids {target}"),
                ("stop_instance", "aws ec2 stop-instances --region {region} --instance-ids {target}"),
                (
                    "scale_asg",
                    "aws autoscaling set-desired-capacity --region {region} --auto-scaling-group-name {target} --desired-capacity {capacity}",
                ),
                (
                    "failover_db_cluster",
                    "aws rds failover-db-cluster --region {region} --db-cluster-identifier {target}",
                ),
                (
                    "restart_ecs_service",
                    "aws ecs update-service --region {region} --cluster {cluster} --service {target} --force-new-deployment",
                ),
            ]),
            capture: CommandTemplate::new(
                "aws ec2 describe-instances --region {region} --instance-ids {target} --query 'Reservations[0].Instances[0].State.Name' --output text",
            ),
            snapshot_type: "instance_state".to_string(),
            restore: CommandTemplate::new(
                "state=$(cat); if [ \"$state\" = running ]; then aws ec2 start-instances --region {region} --instance-ids {target}; else aws ec2 stop-instances --region {region} --instance-ids {target}; fi",
            ),
            health: HealthCheck {
                template: CommandTemplate::new(
                    "aws ec2 describe-instances --region {region} --instance-ids {target} --query 'Reservations[0].Instances[0].State.Name' --output text",
                ),
                healthy_states: vec!["running".to_string()],
            },
            inventory: CommandTemplate::new("aws ec2 describe-instances --region {region} --output json"),
            parse_inventory: parse_aws_inventory,
            events: CommandTemplate::new(
                "aws cloudtrail lookup-events --region {region} --lookup-attributes AttributeKey=ResourceName,AttributeValue={target} --start-time {start} --end-time {end} --output json",
            ),
            parse_events: parse_aws_events,
        }
    }

    /// `kubectl` profile; resources are deployments in `{namespace}`
    #[must_use]
    pub fn kubernetes() -> Self {
        Self {
            name: "kubernetes".to_string(),
            shell: Shell::Posix,
            defaults: vars(&[("namespace", "default"), ("resource_type", "deployments")]),
            operations: templates(&[
                ("restart_deployment", "kubectl rollout restart deployment/{target} -n {namespace}"),
                ("scale_deployment", "kubectl scale deployment/{target} --replicas={replicas} -n {namespace}"),
                ("rollback_deployment", "kubectl rollout undo deployment/{target} -n {namespace}"),
                ("restart_pod", "kubectl delete pod {target} -n {namespace} --wait=false"),
                ("cordon_node", "kubectl cordon {target}"),
                ("uncordon_node", "kubectl uncordon {target}"),
            ]),
            capture: CommandTemplate::new("kubectl get deployment/{target} -n {namespace} -o json"),
            snapshot_type: "deployment".to_string(),
            restore: CommandTemplate::new("kubectl apply -n {namespace} -f -"),
            health: HealthCheck {
                template: CommandTemplate::new(
                    "kubectl rollout status deployment/{target} -n {namespace} --timeout=10s",
                ),
                healthy_states: Vec::new(),
            },
            inventory: CommandTemplate::new("kubectl get {resource_type} --all-namespaces -o json"),
            parse_inventory: parse_kubernetes_inventory,
            events: CommandTemplate::new(
                "kubectl get events -n {namespace} --field-selector involvedObject.name={target} -o json",
            ),
            parse_events: parse_kubernetes_events,
        }
    }

    /// PowerShell profile; resources are Windows service names
    #[must_use]
    pub fn windows() -> Self {
        Self {
            name: "windows".to_string(),
            shell: Shell::PowerShell,
            defaults: vars(&[("resource_type", "service"), ("log_name", "System")]),
            operations: templates(&[
                ("restart_service", "Restart-Service -Name '{target}' -Force"),
                ("start_service", "Start-Service -Name '{target}'"),
                ("stop_service", "Stop-Service -Name '{target}' -Force"),
                ("set_startup_type", "Set-Service -Name '{target}' -StartupType {startup_type}"),
                ("restart_app_pool", "Restart-WebAppPool -Name '{target}'"),
            ]),
            capture: CommandTemplate::new(
                "Get-CimInstance Win32_Service -Filter \"Name='{target}'\" | Select-Object Name,StartMode,State | ConvertTo-Json -Compress",
            ),
            snapshot_type: "service_config".to_string(),
            restore: CommandTemplate::new(
                "$s = [Console]::In.ReadToEnd() | ConvertFrom-Json; $mode = if ($s.StartMode -eq 'Auto') { 'Automatic' } else { $s.StartMode }; Set-Service -Name '{target}' -StartupType $mode; if ($s.State -eq 'Running') { Start-Service -Name '{target}' } else { Stop-Service -Name '{target}' -Force }",
            ),
            health: HealthCheck {
                template: CommandTemplate::new("(Get-Service -Name '{target}').Status.ToString()"),
                healthy_states: vec!["running".to_string()],
            },
            inventory: CommandTemplate::new(
                "Get-Service | Select-Object Name,DisplayName,Status | ConvertTo-Json -Compress",
            ),
            parse_inventory: parse_windows_inventory,
            events: CommandTemplate::new(
                "Get-WinEvent -FilterHashtable @{ LogName='{log_name}'; StartTime='{start}'; EndTime='{end}' } | Where-Object { $_.Message -like '*{target}*' } | Select-Object TimeCreated,LevelDisplayName,Message | ConvertTo-Json -Compress",
            ),
            parse_events: parse_windows_events,
        }
    }
}

fn vars(pairs: &[(&str, &str)]) -> Vars {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn templates(pairs: &[(&str, &str)]) -> BTreeMap<String, CommandTemplate> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), CommandTemplate::new(*v)))
        .collect()
}

// Output parsers. Malformed output yields an empty list; callers log it.

fn parse_json(stdout: &str) -> Option<Value> {
    match serde_json::from_str(stdout) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!("unparseable provider output: {}", err);
            None
        }
    }
}

/// PowerShell emits a bare object for one result and an array for many
fn as_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value.pointer(pointer).and_then(Value::as_str)
}

/// RFC 3339 or the legacy PowerShell `/Date(ms)/` form
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    let millis = raw
        .strip_prefix("/Date(")?
        .strip_suffix(")/")?
        .split(['+', '-'])
        .next()?
        .parse::<i64>()
        .ok()?;
    Utc.timestamp_millis_opt(millis).single()
}

fn parse_aws_inventory(stdout: &str, provider: &str, fallback_env: &str) -> Vec<Resource> {
    let Some(doc) = parse_json(stdout) else {
        return Vec::new();
    };
    let reservations = doc
        .get("Reservations")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    reservations
        .iter()
        .filter_map(|r| r.get("Instances").and_then(Value::as_array))
        .flatten()
        .filter_map(|instance| {
            let id = instance.get("InstanceId")?.as_str()?.to_string();
            let tag = |key: &str| {
                instance
                    .get("Tags")
                    .and_then(Value::as_array)
                    .and_then(|tags| {
                        tags.iter()
                            .find(|t| t.get("Key").and_then(Value::as_str) == Some(key))
                    })
                    .and_then(|t| t.get("Value"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };
            Some(Resource {
                name: tag("Name").unwrap_or_else(|| id.clone()),
                environment: tag("Environment").unwrap_or_else(|| fallback_env.to_string()),
                resource_type: "instance".to_string(),
                provider: provider.to_string(),
                status: str_at(instance, "/State/Name").unwrap_or("unknown").to_string(),
                id,
            })
        })
        .collect()
}

fn parse_aws_events(stdout: &str, resource_id: &str) -> Vec<ResourceEvent> {
    let Some(doc) = parse_json(stdout) else {
        return Vec::new();
    };
    doc.get("Events")
        .and_then(Value::as_array)
        .map(|events| {
            events
                .iter()
                .filter_map(|e| {
                    let timestamp = match e.get("EventTime")? {
                        Value::String(raw) => parse_timestamp(raw)?,
                        // Older CLI versions print epoch seconds
                        Value::Number(n) => {
                            #[allow(clippy::cast_possible_truncation)]
                            let millis = (n.as_f64()? * 1000.0) as i64;
                            Utc.timestamp_millis_opt(millis).single()?
                        }
                        _ => return None,
                    };
                    Some(ResourceEvent {
                        resource_id: resource_id.to_string(),
                        timestamp,
                        kind: e.get("EventName")?.as_str()?.to_string(),
                        message: str_at(e, "/Username")
                            .map(|user| format!("by {user}"))
                            .unwrap_or_default(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_kubernetes_inventory(stdout: &str, provider: &str, fallback_env: &str) -> Vec<Resource> {
    let Some(doc) = parse_json(stdout) else {
        return Vec::new();
    };
    let items = doc.get("items").and_then(Value::as_array).cloned().unwrap_or_default();

    items
        .iter()
        .filter_map(|item| {
            let name = str_at(item, "/metadata/name")?.to_string();
            let namespace = str_at(item, "/metadata/namespace").unwrap_or("default");
            let desired = item.pointer("/spec/replicas").and_then(Value::as_u64);
            let available = item
                .pointer("/status/availableReplicas")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            let status = match desired {
                Some(want) if available >= want => "Available",
                Some(_) => "Progressing",
                None => "Unknown",
            };
            Some(Resource {
                id: name.clone(),
                name: format!("{namespace}/{name}"),
                resource_type: item
                    .get("kind")
                    .and_then(Value::as_str)
                    .unwrap_or("Deployment")
                    .to_ascii_lowercase(),
                environment: str_at(item, "/metadata/labels/environment")
                    .unwrap_or(fallback_env)
                    .to_string(),
                provider: provider.to_string(),
                status: status.to_string(),
            })
        })
        .collect()
}

fn parse_kubernetes_events(stdout: &str, resource_id: &str) -> Vec<ResourceEvent> {
    let Some(doc) = parse_json(stdout) else {
        return Vec::new();
    };
    doc.get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let raw = str_at(item, "/lastTimestamp")
                        .or_else(|| str_at(item, "/eventTime"))?;
                    Some(ResourceEvent {
                        resource_id: resource_id.to_string(),
                        timestamp: parse_timestamp(raw)?,
                        kind: str_at(item, "/reason").unwrap_or("Unknown").to_string(),
                        message: str_at(item, "/message").unwrap_or_default().to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// `ServiceControllerStatus` values as serialized by `ConvertTo-Json`
fn service_status(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_u64() {
            Some(1) => "Stopped",
            Some(2) => "StartPending",
            Some(3) => "StopPending",
            Some(4) => "Running",
            Some(7) => "Paused",
            _ => "Unknown",
        }
        .to_string(),
        _ => "Unknown".to_string(),
    }
}

fn parse_windows_inventory(stdout: &str, provider: &str, fallback_env: &str) -> Vec<Resource> {
    let Some(doc) = parse_json(stdout) else {
        return Vec::new();
    };
    as_list(doc)
        .iter()
        .filter_map(|svc| {
            let id = svc.get("Name")?.as_str()?.to_string();
            Some(Resource {
                name: svc
                    .get("DisplayName")
                    .and_then(Value::as_str)
                    .map_or_else(|| id.clone(), str::to_string),
                resource_type: "service".to_string(),
                environment: fallback_env.to_string(),
                provider: provider.to_string(),
                status: svc.get("Status").map_or_else(|| "Unknown".to_string(), service_status),
                id,
            })
        })
        .collect()
}

fn parse_windows_events(stdout: &str, resource_id: &str) -> Vec<ResourceEvent> {
    let Some(doc) = parse_json(stdout) else {
        return Vec::new();
    };
    as_list(doc)
        .iter()
        .filter_map(|e| {
            Some(ResourceEvent {
                resource_id: resource_id.to_string(),
                timestamp: parse_timestamp(e.get("TimeCreated")?.as_str()?)?,
                kind: e
                    .get("LevelDisplayName")
                    .and_then(Value::as_str)
                    .unwrap_or("Information")
                    .to_string(),
                message: e.get("Message").and_then(Value::as_str).unwrap_or_default().to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use remedy_kernel::safety::SafetyValidator;
    use remedy_kernel::types::ActionType;

    fn sample_vars(profile: &ProviderProfile) -> Vars {
        let mut v = profile.defaults.clone();
        for (k, val) in [
            ("target", "svc-1"),
            ("replicas", "3"),
            ("capacity", "4"),
            ("cluster", "main"),
            ("startup_type", "Automatic"),
            ("start", "2026-01-01T00:00:00Z"),
            ("end", "2026-01-02T00:00:00Z"),
        ] {
            v.insert(k.to_string(), val.to_string());
        }
        v
    }

    #[test]
    fn builtin_templates_render_and_pass_validation() {
        let validator = SafetyValidator::new();
        for profile in [
            ProviderProfile::aws(),
            ProviderProfile::kubernetes(),
            ProviderProfile::windows(),
        ] {
            let v = sample_vars(&profile);
            let all = profile
                .operations
                .values()
                .chain([&profile.capture, &profile.restore, &profile.health.template])
                .chain([&profile.inventory, &profile.events]);
            for template in all {
                let line = template.render(&v).unwrap();
                assert!(
                    validator.is_safe(&line),
                    "{} template rejected: {}",
                    profile.name,
                    line
                );
            }
        }
    }

    #[test]
    fn operation_names_classify_by_verb() {
        let k8s = ProviderProfile::kubernetes();
        let types: Vec<_> = k8s.operations().map(ActionType::from_operation).collect();
        assert!(types.contains(&ActionType::Restart));
        assert!(types.contains(&ActionType::Scale));
        assert!(types.contains(&ActionType::Rollback));
        assert!(ProviderProfile::aws()
            .operations()
            .any(|op| ActionType::from_operation(op) == ActionType::Failover));
    }

    #[test]
    fn health_states_are_case_insensitive() {
        let check = ProviderProfile::windows().health;
        assert!(check.is_healthy(true, "Running\r\n"));
        assert!(!check.is_healthy(true, "Stopped"));
        assert!(!check.is_healthy(false, "Running"));

        let exit_only = ProviderProfile::kubernetes().health;
        assert!(exit_only.is_healthy(true, "deployment \"api\" successfully rolled out"));
    }

    #[test]
    fn parses_kubernetes_inventory() {
        let out = r#"{"items":[
            {"kind":"Deployment","metadata":{"name":"api","namespace":"prod","labels":{"environment":"production"}},
             "spec":{"replicas":3},"status":{"availableReplicas":3}},
            {"kind":"Deployment","metadata":{"name":"worker","namespace":"dev"},
             "spec":{"replicas":2},"status":{}}
        ]}"#;
        let resources = parse_kubernetes_inventory(out, "kubernetes", "unknown");
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].id, "api");
        assert_eq!(resources[0].environment, "production");
        assert_eq!(resources[0].status, "Available");
        assert_eq!(resources[1].status, "Progressing");
        assert_eq!(resources[1].environment, "unknown");
    }

    #[test]
    fn parses_aws_inventory_tags() {
        let out = r#"{"Reservations":[{"Instances":[
            {"InstanceId":"i-0abc","State":{"Name":"running"},
             "Tags":[{"Key":"Name","Value":"web-1"},{"Key":"Environment","Value":"staging"}]}
        ]}]}"#;
        let resources = parse_aws_inventory(out, "aws", "unknown");
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].name, "web-1");
        assert_eq!(resources[0].environment, "staging");
        assert_eq!(resources[0].status, "running");
    }

    #[test]
    fn parses_single_windows_service_and_numeric_status() {
        let out = r#"{"Name":"Spooler","DisplayName":"Print Spooler","Status":4}"#;
        let resources = parse_windows_inventory(out, "windows", "production");
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].status, "Running");
        assert_eq!(resources[0].environment, "production");
    }

    #[test]
    fn parses_legacy_powershell_dates() {
        let at = parse_timestamp("/Date(1700000000000)/").unwrap();
        assert_eq!(at.timestamp(), 1_700_000_000);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn malformed_output_is_empty() {
        assert!(parse_kubernetes_events("not json", "api").is_empty());
        assert!(parse_aws_events("{}", "i-1").is_empty());
    }
}
