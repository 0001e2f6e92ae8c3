//! Audit event sinks
//!
//! Decisions, executions, rollbacks and safety violations are emitted as
//! [`AuditEvent`]s. Emission is fire-and-forget: [`EventSink::emit`] cannot
//! fail and never blocks, so the remediation path does not depend on
//! whoever is listening.

use crate::types::{DecisionId, DecisionOutcome, ExecutionResult, RiskLevel, SnapshotId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Something worth auditing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    Decision {
        decision_id: DecisionId,
        service: String,
        action_type: String,
        risk_score: f64,
        risk_level: RiskLevel,
        outcome: DecisionOutcome,
        at: DateTime<Utc>,
    },
    SafetyViolation {
        provider: String,
        /// Action target, snapshot id or checked command
        subject: String,
        detail: String,
        at: DateTime<Utc>,
    },
    SnapshotCaptured {
        provider: String,
        resource_id: String,
        snapshot_id: SnapshotId,
        at: DateTime<Utc>,
    },
    Execution {
        provider: String,
        target_resource: String,
        result: ExecutionResult,
    },
    Rollback {
        provider: String,
        snapshot_id: SnapshotId,
        result: ExecutionResult,
    },
}

impl AuditEvent {
    /// Short name used in log lines
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::Decision { .. } => "decision",
            AuditEvent::SafetyViolation { .. } => "safety_violation",
            AuditEvent::SnapshotCaptured { .. } => "snapshot_captured",
            AuditEvent::Execution { .. } => "execution",
            AuditEvent::Rollback { .. } => "rollback",
        }
    }
}

/// Receiver of audit events
pub trait EventSink: Send + Sync {
    /// Deliver an event; must not block or fail
    fn emit(&self, event: AuditEvent);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: AuditEvent) {}
}

/// Writes each event as a structured `tracing` record
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: AuditEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::info!(target: "remedy::audit", kind = event.kind(), "{}", json),
            Err(err) => tracing::warn!(target: "remedy::audit", "unserializable audit event: {}", err),
        }
    }
}

/// Keeps events in memory, mainly for tests and the CLI
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Number of retained events of the given kind
    #[must_use]
    pub fn count(&self, kind: &str) -> usize {
        self.events.lock().iter().filter(|e| e.kind() == kind).count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

/// Forwards events over a bounded channel, dropping when full
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<AuditEvent>,
    dropped: AtomicU64,
}

impl ChannelSink {
    /// Create a sink and the receiving half of its channel
    #[must_use]
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<AuditEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Events dropped because the channel was full or closed
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: AuditEvent) {
        if self.tx.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: AuditEvent) {
        (**self).emit(event);
    }
}
