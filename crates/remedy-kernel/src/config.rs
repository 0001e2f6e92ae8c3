//! Engine configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file is a
//! valid configuration.
//!
//! ```toml
//! decision_log_capacity = 1000
//! snapshot_ttl_secs = 3600
//! extra_blocked_patterns = ['\bkill\s+-9\s+1\b']
//!
//! [[policies]]
//! name = "prod-restarts"
//! environment = "production"
//! allowed_types = ["restart"]
//! require_approval_above = 0.4
//! block_above = 0.8
//! ```

use crate::error::ConfigError;
use crate::policy::PolicySpec;
use crate::safety::compile_pattern;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Decisions retained in the decision log
    pub decision_log_capacity: usize,
    /// Execute and rollback results retained
    pub execution_history_capacity: usize,
    /// Snapshots retained per store
    pub snapshot_capacity: usize,
    /// Policies retained in the registry
    pub policy_capacity: usize,
    /// Snapshots older than this are treated as gone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_ttl_secs: Option<u64>,
    /// Default deadline for connector calls
    pub call_timeout_ms: u64,
    /// Roll back automatically when an executed action fails
    pub auto_rollback_on_failure: bool,
    /// Patterns blocked in addition to the built-in set
    pub extra_blocked_patterns: Vec<String>,
    /// Registered when the engine starts
    pub policies: Vec<PolicySpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            decision_log_capacity: 1000,
            execution_history_capacity: 1000,
            snapshot_capacity: 500,
            policy_capacity: 256,
            snapshot_ttl_secs: None,
            call_timeout_ms: 30_000,
            auto_rollback_on_failure: true,
            extra_blocked_patterns: Vec::new(),
            policies: Vec::new(),
        }
    }
}

impl EngineConfig {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and validate a TOML file
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read, parsed or
    /// validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&raw)?;
        tracing::info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate TOML text
    ///
    /// # Errors
    /// Returns [`ConfigError`] on malformed TOML or invalid values.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] if serialization fails.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue(e.to_string()))
    }

    /// Check capacities, patterns and policy thresholds
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("decision_log_capacity", self.decision_log_capacity),
            ("execution_history_capacity", self.execution_history_capacity),
            ("snapshot_capacity", self.snapshot_capacity),
            ("policy_capacity", self.policy_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue(format!("{name} must be > 0")));
            }
        }

        if self.call_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "call_timeout_ms must be > 0".to_string(),
            ));
        }

        for pattern in &self.extra_blocked_patterns {
            compile_pattern(pattern)?;
        }

        for spec in &self.policies {
            spec.validate().map_err(|e| {
                ConfigError::InvalidValue(format!("policy '{}': {}", spec.name, e))
            })?;
        }

        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    #[inline]
    #[must_use]
    pub fn snapshot_ttl(&self) -> Option<Duration> {
        self.snapshot_ttl_secs.map(Duration::from_secs)
    }

    #[inline]
    #[must_use]
    pub fn with_decision_log_capacity(mut self, capacity: usize) -> Self {
        self.decision_log_capacity = capacity;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_execution_history_capacity(mut self, capacity: usize) -> Self {
        self.execution_history_capacity = capacity;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_snapshot_capacity(mut self, capacity: usize) -> Self {
        self.snapshot_capacity = capacity;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_policy_capacity(mut self, capacity: usize) -> Self {
        self.policy_capacity = capacity;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_snapshot_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.snapshot_ttl_secs = ttl.map(|d| d.as_secs());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_auto_rollback(mut self, enabled: bool) -> Self {
        self.auto_rollback_on_failure = enabled;
        self
    }

    #[must_use]
    pub fn with_blocked_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.extra_blocked_patterns.push(pattern.into());
        self
    }

    #[must_use]
    pub fn with_policy(mut self, spec: PolicySpec) -> Self {
        self.policies.push(spec);
        self
    }
}
