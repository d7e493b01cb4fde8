//! Error taxonomy for the OAuth connection lifecycle.

use super::ProviderName;
use thiserror::Error;

/// Failures surfaced by provider adapters and the connection manager.
///
/// Messages carry provider-reported detail but never token values or
/// client secrets.
#[derive(Debug, Error)]
pub enum OAuthError {
    /// No adapter registered under this name (missing credentials at startup
    /// or unknown provider).
    #[error("OAuth provider '{provider}' is not configured")]
    ProviderNotConfigured { provider: String },

    /// Caller input rejected before any flow starts.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Callback state is malformed, stale, or names another provider.
    #[error("Invalid OAuth state: {0}")]
    InvalidState(String),

    /// The provider rejected the authorization code, or the call failed.
    #[error("{provider} token exchange failed: {detail}")]
    TokenExchangeFailed { provider: ProviderName, detail: String },

    /// Callback could not be completed; wraps the underlying cause.
    #[error("Failed to complete {provider} OAuth flow: {source}")]
    CallbackFailed {
        provider: ProviderName,
        #[source]
        source: Box<OAuthError>,
    },

    /// Provider (or the stored credential) cannot refresh.
    #[error("Token refresh is not supported for {provider}")]
    RefreshUnsupported { provider: ProviderName },

    /// Refresh call failed; the stored connection is unchanged.
    #[error("{provider} token refresh failed: {detail}")]
    RefreshFailed { provider: ProviderName, detail: String },

    /// Identity endpoint returned no usable payload.
    #[error("{provider} identity lookup failed: {detail}")]
    IdentityLookupFailed { provider: ProviderName, detail: String },

    /// Catalog, order or revoke call failed.
    #[error("{provider} API request failed: {detail}")]
    ProviderApi { provider: ProviderName, detail: String },

    /// Access token expired and cannot be refreshed.
    #[error("{provider} connection requires re-authorization")]
    ReauthorizationRequired { provider: ProviderName },

    #[error("Connection '{0}' not found")]
    ConnectionNotFound(String),

    #[error("Connection store unavailable: {0}")]
    StoreUnavailable(String),
}

impl OAuthError {
    /// Stable machine-readable code for API responses and logs.
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::ProviderNotConfigured { .. } => "provider_not_configured",
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidState(_) => "invalid_state",
            OAuthError::TokenExchangeFailed { .. } => "token_exchange_failed",
            OAuthError::CallbackFailed { .. } => "oauth_callback_failed",
            OAuthError::RefreshUnsupported { .. } => "refresh_unsupported",
            OAuthError::RefreshFailed { .. } => "refresh_failed",
            OAuthError::IdentityLookupFailed { .. } => "identity_lookup_failed",
            OAuthError::ProviderApi { .. } => "provider_api_error",
            OAuthError::ReauthorizationRequired { .. } => "reauthorization_required",
            OAuthError::ConnectionNotFound(_) => "connection_not_found",
            OAuthError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

/// Store contract failures are infrastructure errors.
impl From<anyhow::Error> for OAuthError {
    fn from(err: anyhow::Error) -> Self {
        OAuthError::StoreUnavailable(format!("{:#}", err))
    }
}
