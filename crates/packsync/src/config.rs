//! Configuration structures for the synchronization engine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::preserve::default_preserved_prefixes;
use crate::source::SourceEndpoints;

/// Main engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Path of the persisted installation mapping
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,

    /// Optional bearer token for authenticated revision queries.
    /// Absence is legal and only affects the host's rate limits.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Network configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// Preserved-path configuration
    #[serde(default)]
    pub preserve: PreserveConfig,

    /// Remote endpoint bases for revision-tracked sources
    #[serde(default)]
    pub endpoints: SourceEndpoints,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            auth_token: None,
            network: NetworkConfig::default(),
            preserve: PreserveConfig::default(),
            endpoints: SourceEndpoints::default(),
        }
    }
}

impl SyncConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, SyncError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| SyncError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), SyncError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| SyncError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Network configuration for downloads and metadata requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Read timeout for streaming in seconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// User agent string
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl NetworkConfig {
    /// Build an HTTP client configured with these timeouts.
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .read_timeout(Duration::from_secs(self.read_timeout_secs))
            .user_agent(&self.user_agent)
            .build()
            .expect("failed to create HTTP client")
    }
}

/// Preserved-path configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreserveConfig {
    /// Relative path prefixes protected from deletion and overwrite
    #[serde(default = "default_preserved_prefixes")]
    pub paths: Vec<String>,
}

impl Default for PreserveConfig {
    fn default() -> Self {
        Self {
            paths: default_preserved_prefixes(),
        }
    }
}

// Default value functions for serde
fn default_state_file() -> PathBuf {
    PathBuf::from("packsync-state.json")
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_read_timeout() -> u64 {
    60
}

fn default_user_agent() -> String {
    format!("packsync/{}", env!("CARGO_PKG_VERSION"))
}
