//! Gumroad adapter. Gumroad issues long-lived tokens with no refresh grant
//! and has no revoke endpoint.

use super::http::{authorization_url, parse_token_response, read_json};
use crate::provider::OAuthProvider;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use merchant_connect::{
    OAuthConfig, OAuthError, OAuthProviderCapabilities, OAuthTokens, OAuthUserInfo, ProviderName,
};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

const CAPABILITIES: OAuthProviderCapabilities = OAuthProviderCapabilities {
    supports_refresh: false,
    supports_revocation: true,
    token_expiry_days: Some(30),
    refresh_token_expiry_days: None,
    max_tokens_per_user: Some(1),
};

pub struct GumroadProvider {
    config: OAuthConfig,
    http: Client,
}

impl GumroadProvider {
    pub fn new(config: OAuthConfig, http: Client) -> Self {
        Self { config, http }
    }

    async fn fetch_user(&self, access_token: &str) -> Result<Value> {
        let url = format!("{}/v2/user", self.config.api_base_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .context("Failed to send user request")?;

        let data = read_json(response).await?;
        if data.get("success").and_then(Value::as_bool) == Some(false) {
            let message = data
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error");
            return Err(anyhow!("Gumroad API error: {}", message));
        }
        Ok(data)
    }
}

#[async_trait]
impl OAuthProvider for GumroadProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Gumroad
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
        debug!(provider = "gumroad", "Exchanging authorization code for tokens");

        let form = vec![
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let result = async {
            let response = self
                .http
                .post(&self.config.token_url)
                .header("Accept", "application/json")
                .form(&form)
                .send()
                .await
                .context("Failed to send token request")?;
            let data = read_json(response).await?;
            parse_token_response(ProviderName::Gumroad, &data, Utc::now(), None)
        }
        .await;

        result.map_err(|e| OAuthError::TokenExchangeFailed {
            provider: ProviderName::Gumroad,
            detail: format!("{:#}", e),
        })
    }

    async fn refresh_access_token(&self, _refresh_token: &str) -> Result<OAuthTokens, OAuthError> {
        Err(OAuthError::RefreshUnsupported {
            provider: ProviderName::Gumroad,
        })
    }

    /// No revoke endpoint: checks the token and reports revoked only when
    /// that check fails. Advisory only.
    async fn revoke_token(&self, token: &str) -> bool {
        let revoked = self.fetch_user(token).await.is_err();
        debug!(provider = "gumroad", revoked, "Probed token after revocation request");
        revoked
    }

    async fn get_user_info(&self, access_token: &str) -> Result<OAuthUserInfo, OAuthError> {
        let lookup_failed = |detail: String| OAuthError::IdentityLookupFailed {
            provider: ProviderName::Gumroad,
            detail,
        };

        let data = self
            .fetch_user(access_token)
            .await
            .map_err(|e| lookup_failed(format!("{:#}", e)))?;
        let user = data
            .get("user")
            .filter(|u| u.is_object())
            .ok_or_else(|| lookup_failed("No user information found".to_string()))?;

        let email = user.get("email").and_then(Value::as_str).map(str::to_string);
        let id = match user.get("id").or_else(|| user.get("user_id")) {
            Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => email.clone(),
        }
        .ok_or_else(|| lookup_failed("User payload has no id or email".to_string()))?;

        Ok(OAuthUserInfo {
            id,
            name: user
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| email.clone()),
            email,
            platform: ProviderName::Gumroad,
            raw: user.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use merchant_connect::Environment;
    use mockito::{Matcher, Server};

    fn provider_for(server_url: &str) -> GumroadProvider {
        let config = OAuthConfig {
            client_id: "gum-client".to_string(),
            client_secret: "gum-secret".to_string(),
            redirect_uri: "http://localhost:3000/api/oauth/callback/gumroad".to_string(),
            scopes: vec!["view_profile".to_string(), "view_sales".to_string()],
            authorization_url: format!("{}/oauth/authorize", server_url),
            token_url: format!("{}/oauth/token", server_url),
            api_base_url: server_url.to_string(),
            environment: Environment::Production,
        };
        GumroadProvider::new(config, Client::new())
    }

    #[test]
    fn test_auth_url() {
        let provider = provider_for("https://gumroad.com");
        let url = provider.generate_auth_url("st", &[]);

        assert!(url.starts_with("https://gumroad.com/oauth/authorize?client_id=gum-client"));
        assert!(url.contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fapi%2Foauth%2Fcallback%2Fgumroad"
        ));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("scope=view_profile%20view_sales"));
        assert!(url.contains("state=st"));
        assert!(provider.commerce().is_none());
    }

    #[tokio::test]
    async fn test_exchange_code_uses_form_body() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth/token")
            .match_header("content-type", "application/x-www-form-urlencoded")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("code".into(), "auth-code".into()),
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("client_id".into(), "gum-client".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "gum-token", "token_type": "bearer", "scope": "view_profile"}"#)
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let tokens = provider
            .exchange_code_for_tokens("auth-code", "state")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(tokens.access_token, "gum-token");
        assert_eq!(tokens.expires_at, None);
        assert_eq!(tokens.refresh_token, None);
        assert_eq!(tokens.scope.as_deref(), Some("view_profile"));
    }

    #[tokio::test]
    async fn test_exchange_code_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "invalid_grant", "error_description": "The provided authorization grant is invalid"}"#)
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let err = provider
            .exchange_code_for_tokens("bad", "state")
            .await
            .unwrap_err();
        assert!(matches!(err, OAuthError::TokenExchangeFailed { provider: ProviderName::Gumroad, .. }));
        assert!(err.to_string().contains("authorization grant is invalid"));
    }

    #[tokio::test]
    async fn test_refresh_unsupported_makes_no_call() {
        let mut server = Server::new_async().await;
        let token = server
            .mock("POST", "/oauth/token")
            .expect(0)
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let err = provider.refresh_access_token("anything").await.unwrap_err();

        token.assert_async().await;
        assert!(matches!(err, OAuthError::RefreshUnsupported { provider: ProviderName::Gumroad }));
    }

    #[tokio::test]
    async fn test_get_user_info() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/user")
            .match_header("authorization", "Bearer gum-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"success": true, "user": {"user_id": "G123", "email": "seller@example.com", "name": null}}"#,
            )
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let info = provider.get_user_info("gum-token").await.unwrap();

        assert_eq!(info.id, "G123");
        assert_eq!(info.email.as_deref(), Some("seller@example.com"));
        // Name falls back to the email
        assert_eq!(info.name.as_deref(), Some("seller@example.com"));
    }

    #[tokio::test]
    async fn test_get_user_info_unsuccessful() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/user")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success": false, "message": "The access token is invalid"}"#)
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let err = provider.get_user_info("stale").await.unwrap_err();
        assert!(matches!(err, OAuthError::IdentityLookupFailed { .. }));
        assert!(err.to_string().contains("access token is invalid"));
    }

    #[tokio::test]
    async fn test_revoke_is_heuristic() {
        let mut server = Server::new_async().await;
        let _live = server
            .mock("GET", "/v2/user")
            .match_header("authorization", "Bearer live")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success": true, "user": {"user_id": "G1"}}"#)
            .create_async()
            .await;
        let _dead = server
            .mock("GET", "/v2/user")
            .match_header("authorization", "Bearer dead")
            .with_status(401)
            .with_body(r#"{"success": false, "message": "unauthorized"}"#)
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        assert!(!provider.revoke_token("live").await);
        assert!(provider.revoke_token("dead").await);
    }
}
