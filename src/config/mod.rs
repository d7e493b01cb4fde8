pub mod providers;

pub use providers::{resolve_oauth_config, ProviderSettings, ProvidersConfig};

use crate::oauth::{Environment, OAuthConfig, ProviderName};
use anyhow::{Context, Result};
use serde::Deserialize;

/// Complete service configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub oauth: OAuthSettings,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public URL of this service; OAuth redirect URIs are derived from it
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Where callback success/error redirects land
    #[serde(default = "default_base_url")]
    pub dashboard_url: String,
    #[serde(default = "default_cors_enabled")]
    pub cors_enabled: bool,
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_cors_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            base_url: default_base_url(),
            dashboard_url: default_base_url(),
            cors_enabled: default_cors_enabled(),
        }
    }
}

/// Connection store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "connections.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// OAuth flow tuning
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthSettings {
    /// How long an issued state stays acceptable on callback
    #[serde(default = "default_state_ttl")]
    pub state_ttl_seconds: i64,
    /// Upper bound for every provider HTTP call
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
}

fn default_state_ttl() -> i64 {
    600
}

fn default_http_timeout() -> u64 {
    20
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            state_ttl_seconds: default_state_ttl(),
            http_timeout_seconds: default_http_timeout(),
        }
    }
}

impl AppConfig {
    /// Loads `ACP_CONFIG` (if set) and applies environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var("ACP_CONFIG") {
            Ok(path) => load_config(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `ACP_*` overrides using `lookup` to read variables.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("ACP_BIND_ADDR") {
            self.server.bind_addr = v;
        }
        if let Some(v) = lookup("ACP_PORT") {
            if let Ok(port) = v.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Some(v) = lookup("ACP_BASE_URL") {
            self.server.base_url = v;
        }
        if let Some(v) = lookup("ACP_DASHBOARD_URL") {
            self.server.dashboard_url = v;
        }
        if let Some(v) = lookup("ACP_DATABASE_PATH") {
            self.storage.database_path = v;
        }

        for provider in ProviderName::ALL {
            let prefix = format!("ACP_OAUTH_{}", provider.as_str().to_uppercase());
            let client_id = lookup(&format!("{}_CLIENT_ID", prefix));
            let client_secret = lookup(&format!("{}_CLIENT_SECRET", prefix));
            let environment = lookup(&format!("{}_ENVIRONMENT", prefix)).and_then(|v| {
                match v.to_lowercase().as_str() {
                    "sandbox" => Some(Environment::Sandbox),
                    "production" => Some(Environment::Production),
                    _ => None,
                }
            });

            if client_id.is_none() && client_secret.is_none() && environment.is_none() {
                continue;
            }

            let settings = self.providers.get_or_insert(provider);
            if client_id.is_some() {
                settings.client_id = client_id;
            }
            if client_secret.is_some() {
                settings.client_secret = client_secret;
            }
            if environment.is_some() {
                settings.environment = environment;
            }
        }
    }

    /// OAuth configs for every provider with complete credentials.
    pub fn oauth_configs(&self) -> Vec<(ProviderName, OAuthConfig)> {
        ProviderName::ALL
            .into_iter()
            .filter_map(|provider| {
                let settings = self.providers.get(provider)?;
                resolve_oauth_config(provider, settings, &self.server.base_url)
                    .map(|config| (provider, config))
            })
            .collect()
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: AppConfig = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file {}", path))?;
    Ok(config)
}
