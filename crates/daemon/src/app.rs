//! Assembles registries, backends, portals and endpoints from configuration.

use crate::config::{DaemonConfig, StorageKind};
use realmgate_common::{CredentialPersistence, Error, MemoryCredentials, SqliteCredentials};
use realmgate_web::{
    AuthenticatorEndpoint, Backend, LocalPortal, PortalRegistry, RealmRegistry,
};
use std::sync::Arc;
use tracing::{info, warn};

pub struct App {
    pub realms: Arc<RealmRegistry>,
    pub portals: Arc<PortalRegistry>,
    pub backends: Vec<Arc<Backend>>,
    pub endpoints: Vec<AuthenticatorEndpoint>,
    /// Configuration errors; the affected backend or endpoint does not serve
    pub errors: Vec<Error>,
}

impl App {
    pub fn build(config: &DaemonConfig) -> Self {
        let persistence: Arc<dyn CredentialPersistence> = match config.storage {
            StorageKind::Sqlite => Arc::new(SqliteCredentials::new()),
            StorageKind::Memory => Arc::new(MemoryCredentials::new()),
        };
        let realms = Arc::new(RealmRegistry::new(persistence));
        let portals = Arc::new(PortalRegistry::new());
        let mut errors = Vec::new();

        let mut backends = Vec::new();
        for backend_config in &config.backends {
            let mut backend = Backend::new(backend_config.clone());
            match backend.configure(&realms).and_then(|_| backend.validate()) {
                Ok(()) => backends.push(Arc::new(backend)),
                Err(e) => errors.push(e),
            }
        }

        for portal_config in &config.portals {
            let served: Vec<Arc<Backend>> = backends
                .iter()
                .filter(|b| portal_config.serves(b.realm()))
                .cloned()
                .collect();
            if served.is_empty() {
                warn!(portal = %portal_config.name, "portal has no configured backends");
            }
            let portal = LocalPortal::new(portal_config.name.clone(), served);
            if let Err(e) = portals.register_portal(Arc::new(portal)) {
                errors.push(e);
            }
        }

        let mut endpoints = Vec::new();
        for endpoint_config in &config.authenticators {
            let mut endpoint = AuthenticatorEndpoint::new(endpoint_config.clone());
            match endpoint.provision(&portals).and_then(|_| endpoint.validate()) {
                Ok(()) => {}
                Err(e) => errors.push(e),
            }
            endpoints.push(endpoint);
        }

        info!(
            realms = realms.len(),
            backends = backends.len(),
            endpoints = endpoints.len(),
            errors = errors.len(),
            "configuration applied"
        );
        Self {
            realms,
            portals,
            backends,
            endpoints,
            errors,
        }
    }

    /// Configuration of every serving backend, blank-line separated
    pub fn describe(&self) -> String {
        self.backends
            .iter()
            .map(|b| b.config_text())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
