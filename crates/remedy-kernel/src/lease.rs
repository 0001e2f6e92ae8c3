//! Per-resource leases
//!
//! Serializes snapshot, execute and rollback for the same resource key.
//! Different resources proceed in parallel.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held while a remediation owns a resource; released on drop
#[derive(Debug)]
pub struct Lease {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl Lease {
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Lease table keyed by `provider/resource`
#[derive(Debug, Default)]
pub struct LeaseTable {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LeaseTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lease key for a resource on a provider
    #[must_use]
    pub fn key(provider: &str, resource: &str) -> String {
        format!("{provider}/{resource}")
    }

    fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Wait until the resource is free, then hold it
    pub async fn acquire(&self, key: &str) -> Lease {
        let guard = self.slot(key).lock_owned().await;
        Lease {
            key: key.to_string(),
            _guard: guard,
        }
    }

    /// Take the lease only if nobody holds it
    #[must_use]
    pub fn try_acquire(&self, key: &str) -> Option<Lease> {
        self.slot(key).try_lock_owned().ok().map(|guard| Lease {
            key: key.to_string(),
            _guard: guard,
        })
    }

    /// Drop entries no one is holding or waiting on
    pub fn prune_idle(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - self.locks.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
