// OAuth data model, error taxonomy and state codec
pub mod oauth;

// Durable connection records with encrypted credentials
pub mod connections;

// Process configuration (TOML + environment)
pub mod config;

pub use oauth::{
    ConnectionStatus, Environment, OAuthConfig, OAuthConnection, OAuthError,
    OAuthProviderCapabilities, OAuthState, OAuthTokens, OAuthUserInfo, ProviderName,
};
