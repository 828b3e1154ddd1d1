//! Configuration file handling.
//!
//! This module handles loading configuration from `invenira.toml`:
//! the Activity Provider protocol paths and the shared HTTP client
//! settings. Paths are stored verbatim here; normalization (exactly one
//! leading slash, no trailing slash) happens once when the protocol
//! client is constructed.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Activity Provider protocol paths.
    #[serde(default)]
    pub provider_paths: ProviderPaths,

    /// HTTP client settings.
    #[serde(default)]
    pub http: HttpSettings,
}

/// Paths every Activity Provider serves, relative to its base URL.
///
/// The defaults are the documented protocol paths; deployments that front
/// providers behind path-rewriting proxies can override any of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderPaths {
    /// Parameter discovery (GET, returns `[{name}]`).
    #[serde(default = "default_config_params_path")]
    pub config_params: String,

    /// Configuration interface page (fetched client-side in an iframe).
    #[serde(default = "default_config_interface_path")]
    pub config_interface: String,

    /// Deploy endpoint; the activity id is appended as a path segment.
    #[serde(default = "default_deploy_path")]
    pub deploy: String,

    /// Analytics contract (GET, declared metrics).
    #[serde(default = "default_analytics_contract_path")]
    pub analytics_contract: String,

    /// Analytics retrieval (POST, per-student values).
    #[serde(default = "default_analytics_path")]
    pub analytics: String,
}

impl Default for ProviderPaths {
    fn default() -> Self {
        Self {
            config_params: default_config_params_path(),
            config_interface: default_config_interface_path(),
            deploy: default_deploy_path(),
            analytics_contract: default_analytics_contract_path(),
            analytics: default_analytics_path(),
        }
    }
}

fn default_config_params_path() -> String {
    "/config-params".to_string()
}

fn default_config_interface_path() -> String {
    "/config-interface".to_string()
}

fn default_deploy_path() -> String {
    "/deploy".to_string()
}

fn default_analytics_contract_path() -> String {
    "/analytics-contract".to_string()
}

fn default_analytics_path() -> String {
    "/analytics".to_string()
}

/// Settings for the shared HTTP client.
///
/// There is no per-call timeout: an unresponsive provider holds the
/// whole deploy or metrics operation until this global timeout fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Maximum redirects followed per request.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            max_redirects: default_max_redirects(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_max_redirects() -> usize {
    5
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new("invenira.toml");

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
