//! Connector router
//!
//! Maps provider names to connectors. Lookups of unregistered providers
//! fail with [`RemedyError::ConnectorUnavailable`]. Fan-out queries run
//! against every provider concurrently; one provider failing or stalling
//! only affects its own slot in the result.

use crate::api::{ActionExecutor, Connector};
use crate::call::{guarded, CallOptions};
use crate::error::RemedyError;
use crate::types::{Environment, Health, Resource};
use futures::future::join_all;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registry of provider connectors
#[derive(Default)]
pub struct ConnectorRouter {
    connectors: RwLock<BTreeMap<String, Arc<dyn Connector>>>,
}

impl std::fmt::Debug for ConnectorRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRouter")
            .field("providers", &self.providers())
            .finish()
    }
}

/// Per-provider result of a fan-out query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome<T> {
    Ok(T),
    /// The provider did not answer within the call limits
    Aborted(String),
}

impl<T> ProviderOutcome<T> {
    #[must_use]
    pub fn ok(self) -> Option<T> {
        match self {
            ProviderOutcome::Ok(value) => Some(value),
            ProviderOutcome::Aborted(_) => None,
        }
    }
}

impl ConnectorRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector under its own provider name
    ///
    /// Returns the connector previously registered under that name, if any.
    pub fn register(&self, connector: Arc<dyn Connector>) -> Option<Arc<dyn Connector>> {
        let name = connector.provider().to_string();
        tracing::info!("registered connector: {}", name);
        self.connectors.write().insert(name, connector)
    }

    /// Builder-style [`register`](Self::register)
    #[must_use]
    pub fn with(self, connector: Arc<dyn Connector>) -> Self {
        self.register(connector);
        self
    }

    /// Look up a connector
    ///
    /// # Errors
    /// Returns [`RemedyError::ConnectorUnavailable`] for unknown names.
    pub fn get(&self, provider: &str) -> Result<Arc<dyn Connector>, RemedyError> {
        self.connectors
            .read()
            .get(provider)
            .cloned()
            .ok_or_else(|| RemedyError::ConnectorUnavailable(provider.to_string()))
    }

    /// Registered provider names, sorted
    #[must_use]
    pub fn providers(&self) -> Vec<String> {
        self.connectors.read().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.connectors.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connectors.read().is_empty()
    }

    fn snapshot(&self) -> Vec<(String, Arc<dyn Connector>)> {
        self.connectors
            .read()
            .iter()
            .map(|(name, c)| (name.clone(), Arc::clone(c)))
            .collect()
    }

    /// Inventory from every provider, queried concurrently
    pub async fn fleet_inventory(
        &self,
        resource_type: Option<&str>,
        environment: Option<&Environment>,
        options: &CallOptions,
    ) -> BTreeMap<String, ProviderOutcome<Vec<Resource>>> {
        let calls = self.snapshot().into_iter().map(|(name, connector)| async move {
            let outcome = match guarded(options, connector.list_resources(resource_type, environment)).await {
                Ok(resources) => ProviderOutcome::Ok(resources),
                Err(abort) => {
                    tracing::warn!("inventory from {} aborted: {}", name, abort);
                    ProviderOutcome::Aborted(abort.to_string())
                }
            };
            (name, outcome)
        });

        join_all(calls).await.into_iter().collect()
    }

    /// Health of each resource on every provider, queried concurrently
    pub async fn health_sweep(
        &self,
        resource_ids: &[String],
        options: &CallOptions,
    ) -> BTreeMap<String, ProviderOutcome<Vec<Health>>> {
        let calls = self.snapshot().into_iter().map(|(name, connector)| async move {
            let checks = join_all(resource_ids.iter().map(|id| connector.get_health(id)));
            let outcome = match guarded(options, checks).await {
                Ok(health) => ProviderOutcome::Ok(health),
                Err(abort) => {
                    tracing::warn!("health sweep on {} aborted: {}", name, abort);
                    ProviderOutcome::Aborted(abort.to_string())
                }
            };
            (name, outcome)
        });

        join_all(calls).await.into_iter().collect()
    }
}
