//! Wix adapter. Access tokens last about a day; refresh tokens are
//! long-lived. There is no revoke endpoint.

use super::http::{authorization_url, parse_token_response, read_json};
use crate::provider::OAuthProvider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use merchant_connect::{
    OAuthConfig, OAuthError, OAuthProviderCapabilities, OAuthTokens, OAuthUserInfo, ProviderName,
};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;

const CAPABILITIES: OAuthProviderCapabilities = OAuthProviderCapabilities {
    supports_refresh: true,
    supports_revocation: true,
    token_expiry_days: Some(1),
    refresh_token_expiry_days: Some(365),
    max_tokens_per_user: Some(10),
};

pub struct WixProvider {
    config: OAuthConfig,
    http: Client,
}

impl WixProvider {
    pub fn new(config: OAuthConfig, http: Client) -> Self {
        Self { config, http }
    }

    async fn token_request(&self, body: Value) -> Result<Value> {
        let response = self
            .http
            .post(&self.config.token_url)
            .json(&body)
            .send()
            .await
            .context("Failed to send token request")?;
        read_json(response).await
    }

    async fn fetch_app(&self, access_token: &str) -> Result<Value> {
        let url = format!("{}/v1/apps/me", self.config.api_base_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to send app instance request")?;
        read_json(response).await
    }
}

#[async_trait]
impl OAuthProvider for WixProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Wix
    }

    fn capabilities(&self) -> OAuthProviderCapabilities {
        CAPABILITIES
    }

    fn generate_auth_url(&self, state: &str, extra_params: &[(&str, &str)]) -> String {
        let scope = self.config.scopes.join(" ");
        authorization_url(
            &self.config.authorization_url,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("state", state),
            ],
            extra_params,
        )
    }

    async fn exchange_code_for_tokens(
        &self,
        code: &str,
        _state: &str,
    ) -> Result<OAuthTokens, OAuthError> {
        debug!(provider = "wix", "Exchanging authorization code for tokens");

        let body = json!({
            "client_id": self.config.client_id,
            "client_secret": self.config.client_secret,
            "code": code,
            "grant_type": "authorization_code",
            "redirect_uri": self.config.redirect_uri,
        });

        self.token_request(body)
            .await
            .and_then(|data| parse_token_response(ProviderName::Wix, &data, Utc::now(), None))
            .map_err(|e| OAuthError::TokenExchangeFailed {
                provider: ProviderName::Wix,
                detail: format!("{:#}", e),
            })
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<OAuthTokens, OAuthError> {
        let body = json!({
            "client_id": self.config.client_id,
            "client_secret": self.config.client_secret,
            "refresh_token": refresh_token,
            "grant_type": "refresh_token",
        });

        self.token_request(body)
            .await
            .and_then(|data| {
                parse_token_response(ProviderName::Wix, &data, Utc::now(), Some(refresh_token))
            })
            .map_err(|e| OAuthError::RefreshFailed {
                provider: ProviderName::Wix,
                detail: format!("{:#}", e),
            })
    }

    /// Probe-based: revoked only if the token no longer resolves an app
    /// instance.
    async fn revoke_token(&self, token: &str) -> bool {
        let revoked = self.fetch_app(token).await.is_err();
        debug!(provider = "wix", revoked, "Probed token after revocation request");
        revoked
    }

    async fn get_user_info(&self, access_token: &str) -> Result<OAuthUserInfo, OAuthError> {
        let lookup_failed = |detail: String| OAuthError::IdentityLookupFailed {
            provider: ProviderName::Wix,
            detail,
        };

        let data = self
            .fetch_app(access_token)
            .await
            .map_err(|e| lookup_failed(format!("{:#}", e)))?;
        let app = data
            .get("app")
            .filter(|a| a.is_object())
            .ok_or_else(|| lookup_failed("No app information found".to_string()))?;

        let text = |key: &str| app.get(key).and_then(Value::as_str).map(str::to_string);
        let id = text("instanceId")
            .or_else(|| text("appId"))
            .ok_or_else(|| lookup_failed("App payload has no instance id".to_string()))?;

        Ok(OAuthUserInfo {
            id,
            email: text("ownerEmail"),
            name: text("appName").or_else(|| text("displayName")),
            platform: ProviderName::Wix,
            raw: app.clone(),
        })
    }
}
