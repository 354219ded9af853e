//! Configuration structures and loading logic

use crate::validation::EnvValidationOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level resolver configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Directory holding the registry JSON documents
    pub registry_dir: PathBuf,
    pub hub: HubSettings,
    /// Strategies used when validating environment variables
    pub env_validation: EnvValidationOptions,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            registry_dir: default_registry_dir(),
            hub: HubSettings::default(),
            env_validation: EnvValidationOptions::default(),
        }
    }
}

/// Remote metadata client settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HubSettings {
    pub endpoint: String,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Never touch the network
    pub offline: bool,
    /// Bearer token for gated models; never written back out
    #[serde(skip_serializing)]
    pub token: Option<String>,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            endpoint: default_hub_endpoint(),
            timeout_ms: default_hub_timeout_ms(),
            offline: false,
            token: None,
        }
    }
}

impl HubSettings {
    /// Settings that never reach the network
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Default::default()
        }
    }
}

impl ResolverConfig {
    /// Load configuration from file with environment variable overrides
    ///
    /// Without an explicit path, the user config file is used when it exists.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let path = path.or_else(user_config_path);

        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content).context("Failed to parse TOML config")?
        } else {
            Self::default()
        };

        // Environment variable overrides
        if let Ok(dir) = std::env::var("CONTAINER_CONFIG_REGISTRY_DIR") {
            config.registry_dir = PathBuf::from(dir);
        }
        if let Ok(endpoint) = std::env::var("HF_ENDPOINT") {
            config.hub.endpoint = endpoint;
        }
        if let Ok(timeout) = std::env::var("CONTAINER_CONFIG_HUB_TIMEOUT_MS") {
            config.hub.timeout_ms = timeout
                .parse()
                .context("Invalid CONTAINER_CONFIG_HUB_TIMEOUT_MS value")?;
        }
        if let Ok(offline) = std::env::var("HF_HUB_OFFLINE") {
            config.hub.offline = matches!(offline.trim(), "1" | "true" | "TRUE" | "yes");
        }
        if let Ok(token) = std::env::var("HF_TOKEN")
            && !token.trim().is_empty()
        {
            config.hub.token = Some(token);
        }

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.hub.timeout_ms == 0 {
            anyhow::bail!("Hub timeout must be greater than 0 ms");
        }
        if !self.hub.endpoint.starts_with("http://") && !self.hub.endpoint.starts_with("https://")
        {
            anyhow::bail!(
                "Hub endpoint must be an http(s) URL (got '{}')",
                self.hub.endpoint
            );
        }
        if self.registry_dir.as_os_str().is_empty() {
            anyhow::bail!("Registry directory cannot be empty");
        }

        Ok(())
    }
}

fn user_config_path() -> Option<PathBuf> {
    let path = dirs::config_dir()?.join("container-config/config.toml");
    path.exists().then_some(path)
}

// Default functions
fn default_registry_dir() -> PathBuf {
    PathBuf::from("registries")
}
fn default_hub_endpoint() -> String {
    "https://huggingface.co".to_string()
}
fn default_hub_timeout_ms() -> u64 {
    5000
}
