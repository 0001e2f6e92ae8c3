//! Snapshot store
//!
//! Captured resource state is kept in a bounded ring (FIFO eviction) with an
//! optional time-to-live. Each snapshot carries the SHA-256 digest of its
//! payload; the digest is checked again before the payload is restored.

use crate::ring::RingBuffer;
use crate::types::SnapshotId;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;

/// Captured state of one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub provider: String,
    pub resource_id: String,
    /// Provider-specific kind of state, e.g. `service_config`
    pub snapshot_type: String,
    /// Opaque captured payload
    pub payload: String,
    /// Hex-encoded SHA-256 of `payload`
    pub digest: String,
    /// Action parameters the capture ran with; restore reuses them
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl Snapshot {
    /// Build a snapshot with a fresh id and computed digest
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        resource_id: impl Into<String>,
        snapshot_type: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        let payload = payload.into();
        Self {
            id: SnapshotId::new(),
            provider: provider.into(),
            resource_id: resource_id.into(),
            snapshot_type: snapshot_type.into(),
            digest: payload_digest(&payload),
            payload,
            parameters: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_parameters(mut self, parameters: BTreeMap<String, String>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Payload still matches the digest taken at capture
    #[must_use]
    pub fn verify(&self) -> bool {
        payload_digest(&self.payload) == self.digest
    }

    fn is_expired(&self, ttl: Option<Duration>, now: DateTime<Utc>) -> bool {
        match ttl.and_then(|ttl| chrono::Duration::from_std(ttl).ok()) {
            Some(ttl) => now - self.timestamp > ttl,
            None => false,
        }
    }
}

/// Hex SHA-256 of a payload
#[must_use]
pub fn payload_digest(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hex::encode(hasher.finalize())
}

/// Bounded snapshot store with optional TTL
#[derive(Debug)]
pub struct SnapshotStore {
    inner: RwLock<RingBuffer<Snapshot>>,
    ttl: Option<Duration>,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(RingBuffer::new(capacity)),
            ttl: None,
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    /// Store a snapshot, pruning expired entries first
    pub fn insert(&self, snapshot: Snapshot) -> SnapshotId {
        let id = snapshot.id.clone();
        let now = Utc::now();
        let mut guard = self.inner.write();

        let expired = guard.retain(|s| !s.is_expired(self.ttl, now));
        if expired > 0 {
            tracing::debug!("pruned {} expired snapshots", expired);
        }
        if let Some(evicted) = guard.push(snapshot) {
            tracing::debug!("snapshot store full, evicted {}", evicted.id);
        }
        id
    }

    /// Live snapshot by id; expired entries read as absent
    #[must_use]
    pub fn get(&self, id: &SnapshotId) -> Option<Snapshot> {
        let now = Utc::now();
        self.inner
            .read()
            .find(|s| &s.id == id)
            .filter(|s| !s.is_expired(self.ttl, now))
            .cloned()
    }

    /// Live snapshots of a resource, newest first
    #[must_use]
    pub fn for_resource(&self, resource_id: &str) -> Vec<Snapshot> {
        let now = Utc::now();
        self.inner
            .read()
            .iter()
            .rev()
            .filter(|s| s.resource_id == resource_id && !s.is_expired(self.ttl, now))
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_detects_tampering() {
        let mut snap = Snapshot::new("windows", "spooler", "service_config", "{\"start\":\"auto\"}");
        assert!(snap.verify());
        assert_eq!(snap.digest.len(), 64);

        snap.payload.push(' ');
        assert!(!snap.verify());
    }

    #[test]
    fn store_is_bounded() {
        let store = SnapshotStore::new(2);
        let first = store.insert(Snapshot::new("k8s", "api", "deployment", "a"));
        store.insert(Snapshot::new("k8s", "api", "deployment", "b"));
        store.insert(Snapshot::new("k8s", "api", "deployment", "c"));

        assert_eq!(store.len(), 2);
        assert!(store.get(&first).is_none());
        let payloads: Vec<_> = store
            .for_resource("api")
            .into_iter()
            .map(|s| s.payload)
            .collect();
        assert_eq!(payloads, vec!["c", "b"]);
    }

    #[test]
    fn unknown_id_is_absent() {
        let store = SnapshotStore::new(4);
        assert!(store.get(&SnapshotId::from("nonexistent")).is_none());
    }

    #[test]
    fn expired_snapshots_read_as_absent_and_are_pruned() {
        let store = SnapshotStore::new(4).with_ttl(Some(Duration::from_secs(60)));
        let mut stale = Snapshot::new("aws", "i-1", "instance", "old");
        stale.timestamp = Utc::now() - chrono::Duration::minutes(5);
        let stale_id = store.insert(stale);
        assert!(store.get(&stale_id).is_none());

        let fresh = store.insert(Snapshot::new("aws", "i-1", "instance", "new"));
        assert_eq!(store.len(), 1);
        assert!(store.get(&fresh).is_some());
    }
}
