//! Per-provider client settings and their resolution into [`OAuthConfig`].

use crate::oauth::{Environment, OAuthConfig, ProviderName};
use serde::Deserialize;
use std::fmt;

/// `[providers.<name>]` section. Only credentials are required; endpoints
/// and scopes fall back to the platform defaults.
#[derive(Clone, Default, Deserialize)]
pub struct ProviderSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub environment: Option<Environment>,
    pub authorization_url: Option<String>,
    pub token_url: Option<String>,
    pub api_base_url: Option<String>,
    pub scopes: Option<Vec<String>>,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("environment", &self.environment)
            .field("authorization_url", &self.authorization_url)
            .field("token_url", &self.token_url)
            .field("api_base_url", &self.api_base_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl ProviderSettings {
    fn credentials(&self) -> Option<(&str, &str)> {
        let id = self.client_id.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let secret = self
            .client_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())?;
        Some((id, secret))
    }
}

/// `[providers]` table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    pub square: Option<ProviderSettings>,
    pub gumroad: Option<ProviderSettings>,
    pub wix: Option<ProviderSettings>,
}

impl ProvidersConfig {
    pub fn get(&self, provider: ProviderName) -> Option<&ProviderSettings> {
        match provider {
            ProviderName::Square => self.square.as_ref(),
            ProviderName::Gumroad => self.gumroad.as_ref(),
            ProviderName::Wix => self.wix.as_ref(),
        }
    }

    pub fn get_or_insert(&mut self, provider: ProviderName) -> &mut ProviderSettings {
        let slot = match provider {
            ProviderName::Square => &mut self.square,
            ProviderName::Gumroad => &mut self.gumroad,
            ProviderName::Wix => &mut self.wix,
        };
        slot.get_or_insert_with(ProviderSettings::default)
    }
}

struct Defaults {
    authorization_url: String,
    token_url: String,
    api_base_url: String,
    scopes: &'static [&'static str],
}

fn platform_defaults(provider: ProviderName, environment: Environment) -> Defaults {
    match provider {
        ProviderName::Square => {
            let host = match environment {
                Environment::Sandbox => "https://connect.squareupsandbox.com",
                Environment::Production => "https://connect.squareup.com",
            };
            Defaults {
                authorization_url: format!("{}/oauth2/authorize", host),
                token_url: format!("{}/oauth2/token", host),
                api_base_url: host.to_string(),
                scopes: &[
                    "MERCHANT_PROFILE_READ",
                    "ITEMS_READ",
                    "ORDERS_READ",
                    "ORDERS_WRITE",
                    "PAYMENTS_READ",
                    "PAYMENTS_WRITE",
                ],
            }
        }
        ProviderName::Gumroad => Defaults {
            authorization_url: "https://gumroad.com/oauth/authorize".to_string(),
            token_url: "https://gumroad.com/oauth/token".to_string(),
            api_base_url: "https://api.gumroad.com".to_string(),
            scopes: &["view_profile", "view_sales"],
        },
        ProviderName::Wix => Defaults {
            authorization_url: "https://www.wix.com/oauth/authorize".to_string(),
            token_url: "https://www.wixapis.com/oauth/access".to_string(),
            api_base_url: "https://www.wixapis.com".to_string(),
            scopes: &[
                "SITE_READ",
                "SITE_WRITE",
                "STORES_READ",
                "STORES_WRITE",
                "ORDERS_READ",
                "ORDERS_WRITE",
            ],
        },
    }
}

/// Builds the client config for `provider`, or `None` when its credentials
/// are incomplete.
///
/// Square defaults to the sandbox environment; the other platforms have no
/// sandbox and default to production.
pub fn resolve_oauth_config(
    provider: ProviderName,
    settings: &ProviderSettings,
    base_url: &str,
) -> Option<OAuthConfig> {
    let (client_id, client_secret) = settings.credentials()?;

    let environment = settings.environment.unwrap_or(match provider {
        ProviderName::Square => Environment::Sandbox,
        _ => Environment::Production,
    });
    let defaults = platform_defaults(provider, environment);

    Some(OAuthConfig {
        client_id: client_id.to_string(),
        client_secret: client_secret.to_string(),
        redirect_uri: format!(
            "{}/api/oauth/callback/{}",
            base_url.trim_end_matches('/'),
            provider
        ),
        scopes: settings
            .scopes
            .clone()
            .unwrap_or_else(|| defaults.scopes.iter().map(|s| s.to_string()).collect()),
        authorization_url: settings
            .authorization_url
            .clone()
            .unwrap_or(defaults.authorization_url),
        token_url: settings.token_url.clone().unwrap_or(defaults.token_url),
        api_base_url: settings.api_base_url.clone().unwrap_or(defaults.api_base_url),
        environment,
    })
}
