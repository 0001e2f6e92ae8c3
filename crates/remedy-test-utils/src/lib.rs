//! Testing utilities for the remedy workspace
//!
//! Scripted transports, provider output fixtures and engine builders.

#![allow(missing_docs)]

use parking_lot::Mutex;
use remedy_connectors::{
    ProviderConnector, ProviderProfile, RemoteCommand, RemoteOutput, RemoteTransport,
    TransportError,
};
use remedy_kernel::config::EngineConfig;
use remedy_kernel::engine::RemediationEngine;
use remedy_kernel::router::ConnectorRouter;
use remedy_kernel::sink::MemorySink;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Canned reply for calls whose line contains `needle`
#[derive(Debug, Clone)]
struct Rule {
    needle: String,
    reply: Reply,
}

#[derive(Debug, Clone)]
enum Reply {
    Output(RemoteOutput),
    Unreachable(String),
}

/// Transport that answers from rules and records every call
///
/// Rules are checked in insertion order; the first whose needle occurs in
/// the command line wins. Unmatched calls succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<RemoteCommand>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(self: &Arc<Self>, needle: &str, output: RemoteOutput) -> Arc<Self> {
        self.rules.lock().push(Rule {
            needle: needle.to_string(),
            reply: Reply::Output(output),
        });
        Arc::clone(self)
    }

    pub fn unreachable(self: &Arc<Self>, needle: &str, reason: &str) -> Arc<Self> {
        self.rules.lock().push(Rule {
            needle: needle.to_string(),
            reply: Reply::Unreachable(reason.to_string()),
        });
        Arc::clone(self)
    }

    /// Delay every call, for timeout tests
    pub fn delayed(self: &Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.delay.lock() = Some(delay);
        Arc::clone(self)
    }

    pub fn calls(&self) -> Vec<RemoteCommand> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.line.clone()).collect()
    }

    /// Most calls ever running at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RemoteTransport for ScriptedTransport {
    async fn call(&self, command: &RemoteCommand) -> Result<RemoteOutput, TransportError> {
        self.calls.lock().push(command.clone());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let reply = self
            .rules
            .lock()
            .iter()
            .find(|r| command.line.contains(&r.needle))
            .map(|r| r.reply.clone());
        match reply {
            Some(Reply::Output(output)) => Ok(output),
            Some(Reply::Unreachable(reason)) => Err(TransportError::Unreachable(reason)),
            None => Ok(RemoteOutput::ok("")),
        }
    }
}

pub fn windows_connector(transport: &Arc<ScriptedTransport>) -> Arc<ProviderConnector> {
    Arc::new(ProviderConnector::new(ProviderProfile::windows(), transport.clone()))
}

pub fn kubernetes_connector(transport: &Arc<ScriptedTransport>) -> Arc<ProviderConnector> {
    Arc::new(ProviderConnector::new(ProviderProfile::kubernetes(), transport.clone()))
}

pub fn aws_connector(transport: &Arc<ScriptedTransport>) -> Arc<ProviderConnector> {
    Arc::new(ProviderConnector::new(ProviderProfile::aws(), transport.clone()))
}

/// Engine over the given connectors, auditing into a [`MemorySink`]
pub fn setup_engine(
    config: EngineConfig,
    connectors: Vec<Arc<ProviderConnector>>,
) -> (RemediationEngine, Arc<MemorySink>) {
    let router = ConnectorRouter::new();
    for connector in connectors {
        router.register(connector);
    }
    let sink = Arc::new(MemorySink::new());
    let engine = RemediationEngine::new(config, Arc::new(router), sink.clone()).unwrap();
    (engine, sink)
}

// Provider output samples

pub const WIN32_SERVICE_CAPTURE: &str = r#"{"Name":"Spooler","StartMode":"Auto","State":"Running"}"#;

pub const KUBERNETES_DEPLOYMENTS: &str = r#"{"items":[
  {"kind":"Deployment","metadata":{"name":"api","namespace":"prod","labels":{"environment":"production"}},
   "spec":{"replicas":3},"status":{"availableReplicas":3}},
  {"kind":"Deployment","metadata":{"name":"worker","namespace":"staging","labels":{"environment":"staging"}},
   "spec":{"replicas":2},"status":{"availableReplicas":1}}
]}"#;

pub const KUBERNETES_EVENTS: &str = r#"{"items":[
  {"lastTimestamp":"2026-03-01T10:00:00Z","reason":"BackOff","message":"Back-off restarting failed container"},
  {"lastTimestamp":"2026-03-01T12:00:00Z","reason":"Pulled","message":"Container image pulled"}
]}"#;

pub const AWS_INSTANCES: &str = r#"{"Reservations":[{"Instances":[
  {"InstanceId":"i-0a1","State":{"Name":"running"},"Tags":[{"Key":"Name","Value":"web-1"},{"Key":"Environment","Value":"production"}]},
  {"InstanceId":"i-0b2","State":{"Name":"stopped"},"Tags":[{"Key":"Environment","Value":"development"}]}
]}]}"#;
