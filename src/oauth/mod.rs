//! OAuth connection data model.
//!
//! Types shared by the connection store, the provider adapters and the
//! connection manager:
//!
//! - [`ProviderName`] - closed set of supported commerce platforms
//! - [`OAuthConfig`] - per-provider client configuration, fixed at startup
//! - [`OAuthTokens`] - credentials owned by exactly one connection
//! - [`OAuthUserInfo`] - identity captured when the connection is established
//! - [`OAuthProviderCapabilities`] - static provider facts, snapshotted per connection
//! - [`OAuthConnection`] - one persisted authorization between a merchant and a platform
//! - [`OAuthState`] - redirect-carried correlation value (never persisted)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod error;
pub mod state;

pub use error::OAuthError;
pub use state::{decode_state, encode_state, OAuthState};

/// Supported commerce platforms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    Square,
    Gumroad,
    Wix,
}

impl ProviderName {
    /// Every provider this build knows how to talk to.
    pub const ALL: [ProviderName; 3] = [ProviderName::Square, ProviderName::Gumroad, ProviderName::Wix];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Square => "square",
            ProviderName::Gumroad => "gumroad",
            ProviderName::Wix => "wix",
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = OAuthError;

    /// Unknown names can never have an adapter, so they are reported the same
    /// way as a known provider without credentials.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "square" => Ok(ProviderName::Square),
            "gumroad" => Ok(ProviderName::Gumroad),
            "wix" => Ok(ProviderName::Wix),
            other => Err(OAuthError::ProviderNotConfigured {
                provider: other.to_string(),
            }),
        }
    }
}

/// Provider environment tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Sandbox,
    Production,
}

/// OAuth client configuration for one provider.
///
/// Loaded once at process start and immutable afterwards.
#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Requested scopes (order carries no meaning)
    pub scopes: Vec<String>,
    /// Consent page URL
    pub authorization_url: String,
    /// Code exchange / refresh endpoint
    pub token_url: String,
    /// Base URL for identity, catalog and order calls
    pub api_base_url: String,
    pub environment: Environment,
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("authorization_url", &self.authorization_url)
            .field("token_url", &self.token_url)
            .field("api_base_url", &self.api_base_url)
            .field("environment", &self.environment)
            .finish()
    }
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Tokens issued by a provider for one connection.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    /// Absent for providers without refresh support
    pub refresh_token: Option<String>,
    /// Absolute expiry; `None` means no known expiry
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

impl OAuthTokens {
    /// Bearer tokens with only an access token set.
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            scope: None,
            token_type: default_token_type(),
        }
    }

    /// Exact-expiry comparison, no grace skew.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |expires_at| now >= expires_at)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Identity of the merchant account on the provider side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OAuthUserInfo {
    /// Provider-assigned identity id
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub platform: ProviderName,
    /// Untouched provider payload
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Static, provider-level facts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthProviderCapabilities {
    pub supports_refresh: bool,
    pub supports_revocation: bool,
    pub token_expiry_days: Option<u32>,
    pub refresh_token_expiry_days: Option<u32>,
    pub max_tokens_per_user: Option<u32>,
}

/// Lifecycle status of a stored connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    Revoked,
    Expired,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Revoked => "revoked",
            ConnectionStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "connected" => Some(ConnectionStatus::Connected),
            "revoked" => Some(ConnectionStatus::Revoked),
            "expired" => Some(ConnectionStatus::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted OAuth authorization between a merchant and a platform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OAuthConnection {
    /// Store-assigned id
    pub id: String,
    pub merchant_id: String,
    pub provider: ProviderName,
    pub status: ConnectionStatus,
    pub tokens: OAuthTokens,
    pub user_info: OAuthUserInfo,
    /// Capabilities as they were when the connection was created
    pub capabilities: OAuthProviderCapabilities,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl OAuthConnection {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}
