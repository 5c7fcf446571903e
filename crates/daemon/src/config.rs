//! Daemon configuration

use realmgate_web::{AuthenticatorConfig, BackendConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// HTTP listen address
    pub listen: String,

    /// Where realm credentials are kept
    pub storage: StorageKind,

    pub backends: Vec<BackendConfig>,

    pub portals: Vec<PortalConfig>,

    pub authenticators: Vec<AuthenticatorConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            storage: StorageKind::default(),
            backends: vec![BackendConfig::new(
                "local",
                "local",
                "default",
                "/var/lib/realmgate/users.db",
            )],
            portals: vec![PortalConfig {
                name: "main".to_string(),
                realms: vec!["default".to_string()],
            }],
            authenticators: vec![AuthenticatorConfig::new("main", "/auth")],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// One SQLite database per realm path
    #[default]
    Sqlite,
    /// Process memory; nothing survives a restart
    Memory,
}

/// A password login portal over the backends of the listed realms
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalConfig {
    pub name: String,

    /// Realms served by this portal; empty means every configured backend
    #[serde(default)]
    pub realms: Vec<String>,
}

impl PortalConfig {
    pub fn serves(&self, realm: &str) -> bool {
        self.realms.is_empty() || self.realms.iter().any(|r| r == realm)
    }
}

impl DaemonConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}
