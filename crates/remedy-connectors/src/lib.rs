//! Remedy Connectors (remedy-connectors)
//!
//! Provider connectors for the remediation kernel. Each connector pairs a
//! [`ProviderProfile`] (command templates and output parsers) with a
//! [`RemoteTransport`] that delivers rendered commands.
//!
//! Built-in providers: `aws`, `kubernetes`, `windows`.

pub mod connector;
pub mod error;
pub mod profile;
pub mod template;
pub mod transport;

pub use connector::ProviderConnector;
pub use error::{RenderError, TransportError};
pub use profile::{HealthCheck, ProviderProfile};
pub use template::{CommandTemplate, Vars};
pub use transport::{RemoteCommand, RemoteOutput, RemoteTransport, Shell, ShellTransport};

use remedy_kernel::config::EngineConfig;
use remedy_kernel::error::RemedyError;
use remedy_kernel::router::ConnectorRouter;
use remedy_kernel::safety::SafetyValidator;
use remedy_kernel::snapshot::SnapshotStore;
use std::sync::Arc;

/// The built-in profiles
#[must_use]
pub fn builtin_profiles() -> Vec<ProviderProfile> {
    vec![
        ProviderProfile::aws(),
        ProviderProfile::kubernetes(),
        ProviderProfile::windows(),
    ]
}

/// Router with every built-in provider on a local shell transport
///
/// The connectors share one snapshot store sized and aged from `config` and
/// one validator carrying the configured extra patterns.
///
/// # Errors
/// Returns [`RemedyError::Config`] when an extra pattern does not compile.
pub fn standard_router(config: &EngineConfig) -> Result<ConnectorRouter, RemedyError> {
    let validator = Arc::new(SafetyValidator::with_additional_patterns(
        config.extra_blocked_patterns.iter().cloned(),
    )?);
    let store = Arc::new(SnapshotStore::new(config.snapshot_capacity).with_ttl(config.snapshot_ttl()));

    let router = ConnectorRouter::new();
    for profile in builtin_profiles() {
        let transport = Arc::new(ShellTransport::new(profile.shell));
        let connector = ProviderConnector::new(profile, transport)
            .with_validator(validator.clone())
            .with_store(store.clone());
        router.register(Arc::new(connector));
    }
    Ok(router)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_router_registers_builtins() {
        let router = standard_router(&EngineConfig::default()).unwrap();
        assert_eq!(router.providers(), vec!["aws", "kubernetes", "windows"]);
    }

    #[test]
    fn bad_extra_pattern_is_rejected() {
        let config = EngineConfig::default().with_blocked_pattern("(unclosed");
        assert!(matches!(standard_router(&config), Err(RemedyError::Config(_))));
    }
}
