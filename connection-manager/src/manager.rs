//! Connection manager - drives the OAuth lifecycle across providers.
//!
//! Responsibilities:
//! - Resolve the adapter for a provider name
//! - Initiate (state + consent URL), complete (exchange + identity + persist)
//! - Refresh and revoke stored connections
//! - Apply the token-freshness policy for downstream consumers
//!
//! The manager holds no mutable state of its own; everything durable lives
//! in the connection store. Concurrent refreshes of one connection are not
//! serialized and the last write wins.

use crate::registry::ProviderRegistry;
use crate::OAuthProvider;
use chrono::{Duration, Utc};
use merchant_connect::connections::{ConnectionStore, NewConnection};
use merchant_connect::oauth::{decode_state, encode_state};
use merchant_connect::{
    ConnectionStatus, OAuthConnection, OAuthError, OAuthProviderCapabilities, OAuthState,
    ProviderName,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Default lifetime of an issued OAuth state.
pub const DEFAULT_STATE_TTL_SECONDS: i64 = 600;

/// A registered provider as exposed to clients.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProviderSummary {
    pub name: ProviderName,
    pub capabilities: OAuthProviderCapabilities,
    pub supports_commerce: bool,
}

pub struct ConnectionManager {
    registry: ProviderRegistry,
    store: Arc<dyn ConnectionStore>,
    state_ttl: Duration,
}

impl ConnectionManager {
    pub fn new(registry: ProviderRegistry, store: Arc<dyn ConnectionStore>) -> Self {
        Self {
            registry,
            store,
            state_ttl: Duration::seconds(DEFAULT_STATE_TTL_SECONDS),
        }
    }

    /// Overrides how long an issued state is accepted on callback.
    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    /// Returns the adapter registered for `name`.
    pub fn provider(&self, name: ProviderName) -> Result<Arc<dyn OAuthProvider>, OAuthError> {
        self.registry
            .get(name)
            .ok_or_else(|| OAuthError::ProviderNotConfigured {
                provider: name.to_string(),
            })
    }

    pub fn available_providers(&self) -> Vec<ProviderSummary> {
        self.registry
            .names()
            .into_iter()
            .filter_map(|name| self.registry.get(name))
            .map(|provider| ProviderSummary {
                name: provider.name(),
                capabilities: provider.capabilities(),
                supports_commerce: provider.commerce().is_some(),
            })
            .collect()
    }

    /// Builds the consent URL for `merchant_id`. No network call and no
    /// persistence; an abandoned flow leaves no trace.
    pub fn initiate_oauth(
        &self,
        provider: ProviderName,
        merchant_id: &str,
        return_url: Option<String>,
    ) -> Result<String, OAuthError> {
        let adapter = self.provider(provider)?;

        if merchant_id.trim().is_empty() {
            return Err(OAuthError::InvalidRequest(
                "merchant id must not be empty".to_string(),
            ));
        }

        let state = OAuthState::new(merchant_id, provider).with_return_url(return_url);
        let encoded = encode_state(&state)?;
        let url = adapter.generate_auth_url(&encoded, &[]);

        info!(
            provider = %provider,
            merchant_id = %merchant_id,
            "OAuth flow initiated"
        );
        Ok(url)
    }

    /// Completes an OAuth flow: validates the state, exchanges the code,
    /// fetches the identity and persists a new `connected` row.
    ///
    /// Nothing is written unless every step succeeds. Prior connections for
    /// the same merchant and provider are left untouched.
    pub async fn handle_callback(
        &self,
        provider: ProviderName,
        code: &str,
        state: &str,
    ) -> Result<OAuthConnection, OAuthError> {
        let adapter = self.provider(provider)?;

        let decoded = decode_state(state)?;
        if decoded.provider != provider {
            warn!(
                expected = %provider,
                actual = %decoded.provider,
                "OAuth state names a different provider"
            );
            return Err(OAuthError::InvalidState(format!(
                "state was issued for {}, callback is for {}",
                decoded.provider, provider
            )));
        }
        if decoded.is_expired_at(Utc::now(), self.state_ttl) {
            warn!(provider = %provider, merchant_id = %decoded.merchant_id, "OAuth state expired");
            return Err(OAuthError::InvalidState("state has expired".to_string()));
        }

        let wrap = |source: OAuthError| OAuthError::CallbackFailed {
            provider,
            source: Box::new(source),
        };

        debug!(provider = %provider, "Exchanging authorization code");
        let tokens = adapter
            .exchange_code_for_tokens(code, state)
            .await
            .map_err(wrap)?;

        // Tokens are dropped if the identity lookup fails
        let user_info = adapter
            .get_user_info(&tokens.access_token)
            .await
            .map_err(wrap)?;

        let connection = self.store.insert(NewConnection {
            merchant_id: decoded.merchant_id,
            provider,
            tokens,
            user_info,
            capabilities: adapter.capabilities(),
        })?;

        info!(
            provider = %provider,
            merchant_id = %connection.merchant_id,
            connection_id = %connection.id,
            has_refresh_token = connection.tokens.refresh_token.is_some(),
            "OAuth connection established"
        );
        Ok(connection)
    }

    /// Connected rows for `merchant_id`, oldest first.
    pub fn get_connections(&self, merchant_id: &str) -> Result<Vec<OAuthConnection>, OAuthError> {
        Ok(self
            .store
            .list_by_merchant(merchant_id, ConnectionStatus::Connected)?)
    }

    /// Exchanges the stored refresh token for new tokens.
    ///
    /// On failure the stored tokens are left as they were. If the access
    /// token had already expired, the row is marked `expired`.
    pub async fn refresh_connection(
        &self,
        connection_id: &str,
    ) -> Result<OAuthConnection, OAuthError> {
        let connection = self
            .store
            .get(connection_id)?
            .ok_or_else(|| OAuthError::ConnectionNotFound(connection_id.to_string()))?;
        let provider = connection.provider;

        if connection.status == ConnectionStatus::Revoked {
            return Err(OAuthError::ReauthorizationRequired { provider });
        }

        let adapter = self.provider(provider)?;
        if !adapter.capabilities().supports_refresh {
            return Err(OAuthError::RefreshUnsupported { provider });
        }
        let refresh_token = connection
            .tokens
            .refresh_token
            .as_deref()
            .ok_or(OAuthError::RefreshUnsupported { provider })?;

        match adapter.refresh_access_token(refresh_token).await {
            Ok(tokens) => {
                let updated = self
                    .store
                    .update_tokens(connection_id, &tokens, Utc::now())?
                    .ok_or_else(|| OAuthError::ConnectionNotFound(connection_id.to_string()))?;

                // New tokens are already stored; a failed status reset only
                // leaves the row expired until the next refresh.
                let updated = if updated.status == ConnectionStatus::Expired {
                    match self.store.set_status(connection_id, ConnectionStatus::Connected) {
                        Ok(_) => OAuthConnection {
                            status: ConnectionStatus::Connected,
                            ..updated
                        },
                        Err(store_err) => {
                            warn!(
                                connection_id = %connection_id,
                                error = %store_err,
                                "Failed to mark refreshed connection connected"
                            );
                            updated
                        }
                    }
                } else {
                    updated
                };

                info!(
                    provider = %provider,
                    connection_id = %connection_id,
                    expires_at = ?updated.tokens.expires_at,
                    "Connection tokens refreshed"
                );
                Ok(updated)
            }
            Err(e) => {
                error!(
                    provider = %provider,
                    connection_id = %connection_id,
                    error = %e,
                    "Token refresh failed"
                );

                if connection.tokens.is_expired() {
                    match self.store.set_status(connection_id, ConnectionStatus::Expired) {
                        Ok(_) => info!(connection_id = %connection_id, "Connection marked expired"),
                        Err(store_err) => warn!(
                            connection_id = %connection_id,
                            error = %store_err,
                            "Failed to mark connection expired"
                        ),
                    }
                }

                Err(match e {
                    OAuthError::RefreshFailed { .. } | OAuthError::RefreshUnsupported { .. } => e,
                    other => OAuthError::RefreshFailed {
                        provider,
                        detail: other.to_string(),
                    },
                })
            }
        }
    }

    /// Marks a connection revoked, after a best-effort remote revocation.
    ///
    /// Returns `Ok(false)` for an unknown id. The remote outcome never
    /// prevents the local status change.
    pub async fn revoke_connection(&self, connection_id: &str) -> Result<bool, OAuthError> {
        let Some(connection) = self.store.get(connection_id)? else {
            debug!(connection_id = %connection_id, "Revoke requested for unknown connection");
            return Ok(false);
        };
        let provider = connection.provider;

        match self.registry.get(provider) {
            Some(adapter)
                if adapter.capabilities().supports_revocation
                    && !connection.tokens.access_token.is_empty() =>
            {
                let remote = adapter.revoke_token(&connection.tokens.access_token).await;
                if !remote {
                    warn!(
                        provider = %provider,
                        connection_id = %connection_id,
                        "Remote revocation not confirmed; token may remain valid until expiry"
                    );
                }
            }
            Some(_) => {}
            None => warn!(
                provider = %provider,
                connection_id = %connection_id,
                "Provider not configured; revoking locally only"
            ),
        }

        let updated = self.store.set_status(connection_id, ConnectionStatus::Revoked)?;
        info!(provider = %provider, connection_id = %connection_id, "Connection revoked");
        Ok(updated)
    }

    /// Returns `connection` with a usable access token, refreshing it first
    /// when it has expired.
    ///
    /// # Errors
    /// `ReauthorizationRequired` when the token has expired and cannot be
    /// refreshed; refresh errors otherwise propagate.
    pub async fn ensure_fresh(
        &self,
        connection: OAuthConnection,
    ) -> Result<OAuthConnection, OAuthError> {
        if !connection.tokens.is_expired() {
            return Ok(connection);
        }

        let provider = connection.provider;
        let can_refresh = connection.tokens.refresh_token.is_some()
            && self
                .registry
                .get(provider)
                .map_or(false, |adapter| adapter.capabilities().supports_refresh);

        if !can_refresh {
            warn!(
                provider = %provider,
                connection_id = %connection.id,
                "Access token expired and cannot be refreshed"
            );
            return Err(OAuthError::ReauthorizationRequired { provider });
        }

        debug!(provider = %provider, connection_id = %connection.id, "Refreshing expired token");
        self.refresh_connection(&connection.id).await
    }
}
