//! Provider registry - maps provider names to adapter instances.
//!
//! Built once at startup from configuration. A provider without complete
//! client credentials is simply absent.

use crate::providers::build_provider;
use crate::OAuthProvider;
use merchant_connect::config::AppConfig;
use merchant_connect::ProviderName;
use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<ProviderName, Arc<dyn OAuthProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its own name, replacing any previous one.
    pub fn register(&mut self, provider: Arc<dyn OAuthProvider>) {
        self.providers.insert(provider.name(), provider);
    }

    /// Registers an adapter for every provider with complete credentials.
    pub fn from_config(config: &AppConfig, http: Client) -> Self {
        let mut registry = Self::new();
        let configs = config.oauth_configs();

        for (name, oauth_config) in configs {
            info!(
                provider = %name,
                environment = ?oauth_config.environment,
                redirect_uri = %oauth_config.redirect_uri,
                "Registering OAuth provider"
            );
            registry.register(build_provider(name, oauth_config, http.clone()));
        }

        for name in ProviderName::ALL {
            if !registry.contains(name) {
                warn!(
                    provider = %name,
                    "OAuth provider not configured (missing client id or secret)"
                );
            }
        }

        registry
    }

    pub fn get(&self, name: ProviderName) -> Option<Arc<dyn OAuthProvider>> {
        self.providers.get(&name).cloned()
    }

    pub fn contains(&self, name: ProviderName) -> bool {
        self.providers.contains_key(&name)
    }

    /// Registered provider names, in declaration order.
    pub fn names(&self) -> Vec<ProviderName> {
        self.providers.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use merchant_connect::config::ProviderSettings;

    fn settings(id: &str, secret: &str) -> Option<ProviderSettings> {
        Some(ProviderSettings {
            client_id: Some(id.to_string()),
            client_secret: Some(secret.to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn test_from_config_registers_complete_providers() {
        let mut config = AppConfig::default();
        config.providers.square = settings("sq-id", "sq-secret");
        config.providers.wix = settings("wix-id", "wix-secret");
        config.providers.gumroad = Some(ProviderSettings {
            client_id: Some("gum-id".to_string()),
            ..Default::default()
        });

        let registry = ProviderRegistry::from_config(&config, Client::new());

        assert_eq!(registry.names(), vec![ProviderName::Square, ProviderName::Wix]);
        assert!(registry.get(ProviderName::Gumroad).is_none());
        let square = registry.get(ProviderName::Square).unwrap();
        assert_eq!(square.name(), ProviderName::Square);
        assert!(square.commerce().is_some());
    }

    #[test]
    fn test_empty_registry() {
        let registry = ProviderRegistry::from_config(&AppConfig::default(), Client::new());
        assert!(registry.is_empty());
        assert!(registry.names().is_empty());
    }
}
