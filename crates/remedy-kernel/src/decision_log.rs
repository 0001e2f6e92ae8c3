//! Decision log and execution history
//!
//! Both are append-only, fixed-capacity rings behind a `parking_lot`
//! `RwLock`: one writer at a time, any number of readers. The oldest entry
//! is evicted once capacity is reached.

use crate::ring::RingBuffer;
use crate::types::{
    ActionType, DecisionId, DecisionOutcome, ExecutionResult, PolicyId, RiskLevel,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A recorded gate decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationDecision {
    pub id: DecisionId,
    pub service: String,
    pub action_type: ActionType,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub outcome: DecisionOutcome,
    pub policy_id: Option<PolicyId>,
    pub rationale: String,
    pub timestamp: DateTime<Utc>,
}

/// Filter for [`DecisionLog::list`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecisionFilter {
    pub service: Option<String>,
    pub outcome: Option<DecisionOutcome>,
}

impl DecisionFilter {
    #[must_use]
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    #[must_use]
    pub fn outcome(mut self, outcome: DecisionOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    fn matches(&self, decision: &RemediationDecision) -> bool {
        self.service
            .as_deref()
            .map_or(true, |s| decision.service == s)
            && self.outcome.map_or(true, |o| decision.outcome == o)
    }
}

/// Aggregate view over the retained decisions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionStats {
    /// Decisions currently retained
    pub retained: usize,
    /// Decisions ever recorded
    pub total_recorded: u64,
    /// Decisions dropped by eviction
    pub evicted: u64,
    pub by_outcome: BTreeMap<DecisionOutcome, usize>,
    pub by_risk_level: BTreeMap<RiskLevel, usize>,
    /// Mean risk score of retained decisions (0 when empty)
    pub average_risk_score: f64,
}

/// Bounded, append-only decision history
#[derive(Debug)]
pub struct DecisionLog {
    inner: RwLock<RingBuffer<RemediationDecision>>,
}

impl DecisionLog {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(RingBuffer::new(capacity)),
        }
    }

    /// Append a decision, evicting the oldest when full
    pub fn record(&self, decision: RemediationDecision) {
        let mut guard = self.inner.write();
        if let Some(evicted) = guard.push(decision) {
            tracing::debug!("decision log full, evicted {}", evicted.id);
        }
    }

    #[must_use]
    pub fn get(&self, id: DecisionId) -> Option<RemediationDecision> {
        self.inner.read().find(|d| d.id == id).cloned()
    }

    /// Retained decisions matching `filter`, oldest first
    #[must_use]
    pub fn list(&self, filter: &DecisionFilter) -> Vec<RemediationDecision> {
        self.inner
            .read()
            .iter()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> DecisionStats {
        let guard = self.inner.read();
        let mut stats = DecisionStats {
            retained: guard.len(),
            total_recorded: guard.total_inserted(),
            evicted: guard.total_inserted() - guard.len() as u64,
            ..DecisionStats::default()
        };

        let mut sum = 0.0;
        for decision in guard.iter() {
            *stats.by_outcome.entry(decision.outcome).or_default() += 1;
            *stats.by_risk_level.entry(decision.risk_level).or_default() += 1;
            sum += decision.risk_score;
        }
        if !guard.is_empty() {
            stats.average_risk_score = sum / guard.len() as f64;
        }
        stats
    }
}

/// What an execution history entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    Execute,
    Rollback,
}

/// One execute or rollback call, as seen by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub kind: ExecutionKind,
    pub provider: String,
    /// Target resource for executes, snapshot id for rollbacks
    pub subject: String,
    pub decision_id: Option<DecisionId>,
    pub result: ExecutionResult,
}

/// Bounded execution history
#[derive(Debug)]
pub struct ExecutionHistory {
    inner: RwLock<RingBuffer<ExecutionRecord>>,
}

impl ExecutionHistory {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(RingBuffer::new(capacity)),
        }
    }

    pub fn record(&self, record: ExecutionRecord) {
        self.inner.write().push(record);
    }

    /// Retained records, oldest first
    #[must_use]
    pub fn list(&self) -> Vec<ExecutionRecord> {
        self.inner.read().iter().cloned().collect()
    }

    /// `(successes, failures)` among retained records
    #[must_use]
    pub fn tally(&self) -> (usize, usize) {
        let guard = self.inner.read();
        let ok = guard.iter().filter(|r| r.result.is_success()).count();
        (ok, guard.len() - ok)
    }
}
