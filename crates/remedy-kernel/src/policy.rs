//! Decision policies
//!
//! A policy carries the thresholds the gate applies to a risk score and an
//! optional allow-list of action types. Policies are validated once on
//! registration and never change afterwards. The registry is bounded: past
//! capacity, the oldest policy is evicted.

use crate::error::PolicyError;
use crate::ring::RingBuffer;
use crate::types::{ActionType, Environment, PolicyId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Input for registering a policy
///
/// Also the shape of a `[[policies]]` entry in the engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySpec {
    pub name: String,
    pub environment: Environment,
    #[serde(default = "default_max_risk_score")]
    pub max_risk_score: f64,
    /// Empty means every action type is allowed
    #[serde(default)]
    pub allowed_types: BTreeSet<ActionType>,
    #[serde(default = "default_require_approval_above")]
    pub require_approval_above: f64,
    #[serde(default = "default_block_above")]
    pub block_above: f64,
}

fn default_max_risk_score() -> f64 {
    1.0
}

fn default_require_approval_above() -> f64 {
    0.5
}

fn default_block_above() -> f64 {
    0.9
}

impl PolicySpec {
    #[must_use]
    pub fn new(name: impl Into<String>, environment: Environment) -> Self {
        Self {
            name: name.into(),
            environment,
            max_risk_score: default_max_risk_score(),
            allowed_types: BTreeSet::new(),
            require_approval_above: default_require_approval_above(),
            block_above: default_block_above(),
        }
    }

    #[must_use]
    pub fn with_thresholds(mut self, require_approval_above: f64, block_above: f64) -> Self {
        self.require_approval_above = require_approval_above;
        self.block_above = block_above;
        self
    }

    #[must_use]
    pub fn with_max_risk_score(mut self, max_risk_score: f64) -> Self {
        self.max_risk_score = max_risk_score;
        self
    }

    #[must_use]
    pub fn allow(mut self, action_type: ActionType) -> Self {
        self.allowed_types.insert(action_type);
        self
    }

    /// Check the threshold invariants
    ///
    /// # Errors
    /// Returns [`PolicyError`] when a threshold is outside `[0, 1]`, when
    /// `require_approval_above > block_above`, or when the name is blank.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.name.trim().is_empty() {
            return Err(PolicyError::EmptyName);
        }

        for (field, value) in [
            ("max_risk_score", self.max_risk_score),
            ("require_approval_above", self.require_approval_above),
            ("block_above", self.block_above),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PolicyError::OutOfRange { field, value });
            }
        }

        if self.require_approval_above > self.block_above {
            return Err(PolicyError::InvalidThresholds {
                require_approval_above: self.require_approval_above,
                block_above: self.block_above,
            });
        }

        Ok(())
    }
}

/// A registered, immutable policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPolicy {
    pub id: PolicyId,
    pub name: String,
    pub environment: Environment,
    pub max_risk_score: f64,
    pub allowed_types: BTreeSet<ActionType>,
    pub require_approval_above: f64,
    pub block_above: f64,
    pub created_at: DateTime<Utc>,
}

impl DecisionPolicy {
    /// Validate a spec and assign it an id
    ///
    /// # Errors
    /// See [`PolicySpec::validate`].
    pub fn from_spec(spec: PolicySpec) -> Result<Self, PolicyError> {
        spec.validate()?;
        Ok(Self {
            id: PolicyId::new(),
            name: spec.name,
            environment: spec.environment,
            max_risk_score: spec.max_risk_score,
            allowed_types: spec.allowed_types,
            require_approval_above: spec.require_approval_above,
            block_above: spec.block_above,
            created_at: Utc::now(),
        })
    }

    /// Whether the allow-list admits this action type
    #[inline]
    #[must_use]
    pub fn allows(&self, action_type: &ActionType) -> bool {
        self.allowed_types.is_empty() || self.allowed_types.contains(action_type)
    }
}

/// Bounded policy store keyed by id
#[derive(Debug)]
pub struct PolicyRegistry {
    policies: RwLock<RingBuffer<DecisionPolicy>>,
}

impl PolicyRegistry {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            policies: RwLock::new(RingBuffer::new(capacity)),
        }
    }

    /// Validate and store a policy
    ///
    /// # Errors
    /// Returns [`PolicyError`] if the spec is invalid; nothing is stored.
    pub fn register(&self, spec: PolicySpec) -> Result<DecisionPolicy, PolicyError> {
        let policy = DecisionPolicy::from_spec(spec)?;

        let evicted = self.policies.write().push(policy.clone());
        if let Some(old) = evicted {
            tracing::debug!("policy registry full, evicted {} ({})", old.id, old.name);
        }

        tracing::info!(
            "registered policy {} ({}) for {}: approval>={} block>={}",
            policy.id,
            policy.name,
            policy.environment,
            policy.require_approval_above,
            policy.block_above
        );
        Ok(policy)
    }

    #[must_use]
    pub fn get(&self, id: PolicyId) -> Option<DecisionPolicy> {
        self.policies.read().find(|p| p.id == id).cloned()
    }

    /// Look up a policy, failing with [`PolicyError::NotFound`]
    ///
    /// # Errors
    /// Returns [`PolicyError::NotFound`] if the id is unknown or evicted.
    pub fn require(&self, id: PolicyId) -> Result<DecisionPolicy, PolicyError> {
        self.get(id).ok_or(PolicyError::NotFound(id))
    }

    /// All policies, oldest first
    #[must_use]
    pub fn list(&self) -> Vec<DecisionPolicy> {
        self.policies.read().iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.policies.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.policies.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_thresholds() {
        let spec = PolicySpec::new("prod", Environment::Production).with_thresholds(0.8, 0.5);
        assert_eq!(
            spec.validate(),
            Err(PolicyError::InvalidThresholds {
                require_approval_above: 0.8,
                block_above: 0.5
            })
        );
    }

    #[test]
    fn rejects_out_of_range_and_blank_name() {
        let spec = PolicySpec::new("prod", Environment::Production).with_thresholds(0.2, 1.5);
        assert!(matches!(
            spec.validate(),
            Err(PolicyError::OutOfRange { field: "block_above", .. })
        ));

        let spec = PolicySpec::new("  ", Environment::Production);
        assert_eq!(spec.validate(), Err(PolicyError::EmptyName));

        let spec = PolicySpec::new("nan", Environment::Staging).with_max_risk_score(f64::NAN);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn registry_evicts_oldest() {
        let registry = PolicyRegistry::new(2);
        let first = registry
            .register(PolicySpec::new("a", Environment::Staging))
            .unwrap();
        registry
            .register(PolicySpec::new("b", Environment::Staging))
            .unwrap();
        registry
            .register(PolicySpec::new("c", Environment::Staging))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.get(first.id).is_none());
        assert_eq!(
            registry.require(first.id),
            Err(PolicyError::NotFound(first.id))
        );
        let names: Vec<_> = registry.list().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn invalid_spec_is_not_stored() {
        let registry = PolicyRegistry::new(4);
        assert!(registry
            .register(PolicySpec::new("bad", Environment::Production).with_thresholds(0.9, 0.1))
            .is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn empty_allow_list_allows_everything() {
        let policy =
            DecisionPolicy::from_spec(PolicySpec::new("open", Environment::Development)).unwrap();
        assert!(policy.allows(&ActionType::Patch));

        let policy = DecisionPolicy::from_spec(
            PolicySpec::new("restarts", Environment::Production).allow(ActionType::Restart),
        )
        .unwrap();
        assert!(policy.allows(&ActionType::Restart));
        assert!(!policy.allows(&ActionType::Failover));
    }

    #[test]
    fn spec_deserializes_with_defaults() {
        let spec: PolicySpec = toml::from_str(
            r#"
            name = "prod"
            environment = "production"
            allowed_types = ["restart", "Scale"]
            "#,
        )
        .unwrap();
        assert_eq!(spec.block_above, 0.9);
        assert!(spec.allowed_types.contains(&ActionType::Scale));
        assert!(spec.validate().is_ok());
    }
}
