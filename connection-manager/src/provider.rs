use crate::commerce::{OrderRequest, OrderState, Product, ProviderOrder};
use async_trait::async_trait;
use merchant_connect::{OAuthError, OAuthProviderCapabilities, OAuthTokens, OAuthUserInfo, ProviderName};

/// Adapter interface for one commerce platform's OAuth surface.
///
/// Adapters are stateless request/response translators: configuration and
/// capabilities are fixed at construction, tokens are passed in per call,
/// and nothing is cached between calls. Expiry values in whatever form the
/// platform returns them are normalized to an absolute instant before they
/// leave the adapter.
///
/// # Lifecycle
/// 1. Manager calls `generate_auth_url(state)` and redirects the merchant
/// 2. Platform redirects back with a code
/// 3. Manager calls `exchange_code_for_tokens` then `get_user_info`
/// 4. Later calls use `refresh_access_token` / `revoke_token`
///
/// # Example
/// ```no_run
/// use async_trait::async_trait;
/// use connection_manager::OAuthProvider;
/// use merchant_connect::{OAuthError, OAuthProviderCapabilities, OAuthTokens, OAuthUserInfo, ProviderName};
///
/// struct StaticProvider;
///
/// #[async_trait]
/// impl OAuthProvider for StaticProvider {
///     fn name(&self) -> ProviderName {
///         ProviderName::Gumroad
///     }
///
///     fn capabilities(&self) -> OAuthProviderCapabilities {
///         OAuthProviderCapabilities {
///             supports_refresh: false,
///             supports_revocation: false,
///             token_expiry_days: None,
///             refresh_token_expiry_days: None,
///             max_tokens_per_user: Some(1),
///         }
///     }
///
///     fn generate_auth_url(&self, state: &str, _extra: &[(&str, &str)]) -> String {
///         format!("https://example.com/authorize?state={}", state)
///     }
///
///     async fn exchange_code_for_tokens(&self, code: &str, _state: &str) -> Result<OAuthTokens, OAuthError> {
///         Ok(OAuthTokens::bearer(format!("token-for-{}", code)))
///     }
///
///     async fn refresh_access_token(&self, _refresh_token: &str) -> Result<OAuthTokens, OAuthError> {
///         Err(OAuthError::RefreshUnsupported { provider: self.name() })
///     }
///
///     async fn revoke_token(&self, _token: &str) -> bool {
///         false
///     }
///
///     async fn get_user_info(&self, _access_token: &str) -> Result<OAuthUserInfo, OAuthError> {
///         Ok(OAuthUserInfo {
///             id: "seller_1".to_string(),
///             email: None,
///             name: None,
///             platform: self.name(),
///             raw: serde_json::Value::Null,
///         })
///     }
/// }
/// ```
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn name(&self) -> ProviderName;

    /// Static capability descriptor, snapshotted onto new connections.
    fn capabilities(&self) -> OAuthProviderCapabilities;

    /// Builds the consent page URL. No I/O.
    ///
    /// `extra_params` are appended to the query and replace any default
    /// parameter with the same key.
    fn generate_auth_url(&self, state: &str, extra_params: &[(&str, &str)]) -> String;

    /// Exchanges an authorization code for tokens.
    ///
    /// # Errors
    /// `TokenExchangeFailed` with the platform's error detail, including
    /// transport failures.
    async fn exchange_code_for_tokens(&self, code: &str, state: &str)
        -> Result<OAuthTokens, OAuthError>;

    /// Exchanges a refresh token for new tokens.
    ///
    /// # Errors
    /// - `RefreshUnsupported` without any network call when the platform has
    ///   no refresh grant
    /// - `RefreshFailed` when the call itself fails
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<OAuthTokens, OAuthError>;

    /// Best-effort revocation. Never fails: `false` means the token may
    /// still be live.
    async fn revoke_token(&self, token: &str) -> bool;

    /// Fetches the platform identity behind `access_token`.
    ///
    /// # Errors
    /// `IdentityLookupFailed` when the platform returns no usable identity.
    async fn get_user_info(&self, access_token: &str) -> Result<OAuthUserInfo, OAuthError>;

    /// Liveness check: any identity lookup failure reads as `false`.
    async fn validate_token(&self, access_token: &str) -> bool {
        self.get_user_info(access_token).await.is_ok()
    }

    /// Catalog and order operations, when the platform supports them.
    fn commerce(&self) -> Option<&dyn CommerceProvider> {
        None
    }
}

/// Optional catalog/order capability of a provider adapter.
///
/// Obtained through [`OAuthProvider::commerce`]; callers must feature-test
/// for it before use.
#[async_trait]
pub trait CommerceProvider: Send + Sync {
    async fn get_products(&self, access_token: &str) -> Result<Vec<Product>, OAuthError>;

    async fn create_order(
        &self,
        access_token: &str,
        order: &OrderRequest,
    ) -> Result<ProviderOrder, OAuthError>;

    async fn update_order_status(
        &self,
        access_token: &str,
        order_id: &str,
        version: i64,
        state: OrderState,
    ) -> Result<ProviderOrder, OAuthError>;
}
