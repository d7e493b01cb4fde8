//! Square adapter: OAuth, merchant identity, catalog and orders.

use super::http::{authorization_url, parse_token_response, read_json};
use crate::commerce::{OrderRequest, OrderState, Product, ProductVariation, ProviderOrder};
use crate::provider::{CommerceProvider, OAuthProvider};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use merchant_connect::{
    OAuthConfig, OAuthError, OAuthProviderCapabilities, OAuthTokens, OAuthUserInfo, ProviderName,
};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// Square API version pinned for every request.
pub const SQUARE_VERSION: &str = "2025-01-23";

const CAPABILITIES: OAuthProviderCapabilities = OAuthProviderCapabilities {
    supports_refresh: true,
    supports_revocation: true,
    token_expiry_days: Some(30),
    refresh_token_expiry_days: Some(365),
    max_tokens_per_user: Some(10),
};

pub struct SquareProvider {
    config: OAuthConfig,
    http: Client,
}

impl SquareProvider {
    pub fn new(config: OAuthConfig, http: Client) -> Self {
        Self { config, http }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    fn versioned(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("Square-Version", SQUARE_VERSION)
            .header("Accept", "application/json")
    }

    async fn token_request(&self, body: Value) -> Result<Value> {
        let response = self
            .versioned(self.http.post(&self.config.token_url))
            .json(&body)
            .send()
            .await
            .context("Failed to send token request")?;
        read_json(response).await
    }

    async fn api_get(&self, access_token: &str, path: &str) -> Result<Value> {
        let response = self
            .versioned(self.http.get(self.api_url(path)))
            .bearer_auth(access_token)
            .send()
            .await
            .with_context(|| format!("Failed to send GET {}", path))?;
        read_json(response).await
    }

    async fn api_send(
        &self,
        access_token: &str,
        method: reqwest::Method,
        path: &str,
        body: &Value,
    ) -> Result<Value> {
        let response = self
            .versioned(self.http.request(method.clone(), self.api_url(path)))
            .bearer_auth(access_token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send {} {}", method, path))?;
        read_json(response).await
    }

    async fn first_location_id(&self, access_token: &str) -> Result<String> {
        let data = self.api_get(access_token, "/v2/locations").await?;
        data.pointer("/locations/0/id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("No Square locations found for this merchant"))
    }

    fn api_error(&self, err: anyhow::Error) -> OAuthError {
        OAuthError::ProviderApi {
            provider: ProviderName::Square,
            detail: format!("{:#}", err),
        }
    }
}

#[async_trait]
impl OAuthProvider for SquareProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Square
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
                ("scope", scope.as_str()),
                ("state", state),
                // Don't require an existing Square session
                ("session", "false"),
            ],
            extra_params,
        )
    }

    async fn exchange_code_for_tokens(
        &self,
        code: &str,
        _state: &str,
    ) -> Result<OAuthTokens, OAuthError> {
        debug!(provider = "square", "Exchanging authorization code for tokens");

        let body = json!({
            "client_id": self.config.client_id,
            "client_secret": self.config.client_secret,
            "code": code,
            "grant_type": "authorization_code",
        });

        self.token_request(body)
            .await
            .and_then(|data| parse_token_response(ProviderName::Square, &data, Utc::now(), None))
            .map_err(|e| OAuthError::TokenExchangeFailed {
                provider: ProviderName::Square,
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
                parse_token_response(ProviderName::Square, &data, Utc::now(), Some(refresh_token))
            })
            .map_err(|e| OAuthError::RefreshFailed {
                provider: ProviderName::Square,
                detail: format!("{:#}", e),
            })
    }

    async fn revoke_token(&self, token: &str) -> bool {
        let result = async {
            let response = self
                .versioned(self.http.post(self.api_url("/oauth2/revoke")))
                .header(
                    "Authorization",
                    format!("Client {}", self.config.client_secret),
                )
                .json(&json!({
                    "client_id": self.config.client_id,
                    "access_token": token,
                }))
                .send()
                .await
                .context("Failed to send revoke request")?;
            read_json(response).await
        }
        .await;

        match result {
            Ok(data) => data.get("success").and_then(Value::as_bool).unwrap_or(true),
            Err(e) => {
                warn!(provider = "square", error = %format!("{:#}", e), "Token revocation failed");
                false
            }
        }
    }

    async fn get_user_info(&self, access_token: &str) -> Result<OAuthUserInfo, OAuthError> {
        let data = self
            .api_get(access_token, "/v2/merchants")
            .await
            .map_err(|e| OAuthError::IdentityLookupFailed {
                provider: ProviderName::Square,
                detail: format!("{:#}", e),
            })?;

        let merchant = data
            .pointer("/merchant/0")
            .filter(|m| m.is_object())
            .ok_or_else(|| OAuthError::IdentityLookupFailed {
                provider: ProviderName::Square,
                detail: "No merchant information found".to_string(),
            })?;

        let id = merchant
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| OAuthError::IdentityLookupFailed {
                provider: ProviderName::Square,
                detail: "Merchant payload has no id".to_string(),
            })?;

        Ok(OAuthUserInfo {
            id: id.to_string(),
            // Square's merchant payload carries no email
            email: None,
            name: merchant
                .get("business_name")
                .and_then(Value::as_str)
                .map(str::to_string),
            platform: ProviderName::Square,
            raw: merchant.clone(),
        })
    }

    fn commerce(&self) -> Option<&dyn CommerceProvider> {
        Some(self)
    }
}

#[async_trait]
impl CommerceProvider for SquareProvider {
    async fn get_products(&self, access_token: &str) -> Result<Vec<Product>, OAuthError> {
        let data = self
            .api_get(access_token, "/v2/catalog/list?types=ITEM")
            .await
            .map_err(|e| self.api_error(e))?;

        let products: Vec<Product> = data
            .get("objects")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(item_to_product).collect())
            .unwrap_or_default();

        debug!(provider = "square", count = products.len(), "Fetched catalog items");
        Ok(products)
    }

    async fn create_order(
        &self,
        access_token: &str,
        order: &OrderRequest,
    ) -> Result<ProviderOrder, OAuthError> {
        let location_id = match &order.location_id {
            Some(id) => id.clone(),
            None => self
                .first_location_id(access_token)
                .await
                .map_err(|e| self.api_error(e))?,
        };

        let payload = order_payload(order, &location_id, Utc::now());
        let data = self
            .api_send(access_token, reqwest::Method::POST, "/v2/orders", &payload)
            .await
            .map_err(|e| self.api_error(e))?;

        let created = order_from_response(&data).map_err(|e| self.api_error(e))?;
        info!(
            provider = "square",
            order_id = %created.id,
            location_id = %location_id,
            "Order created"
        );
        Ok(created)
    }

    async fn update_order_status(
        &self,
        access_token: &str,
        order_id: &str,
        version: i64,
        state: OrderState,
    ) -> Result<ProviderOrder, OAuthError> {
        let payload = json!({
            "order": {
                "version": version,
                "state": state.as_str(),
            }
        });
        let path = format!("/v2/orders/{}", urlencoding::encode(order_id));

        let data = self
            .api_send(access_token, reqwest::Method::PUT, &path, &payload)
            .await
            .map_err(|e| self.api_error(e))?;
        order_from_response(&data).map_err(|e| self.api_error(e))
    }
}

fn item_to_product(item: &Value) -> Option<Product> {
    let item_id = item.get("id").and_then(Value::as_str)?;
    let item_data = item.get("item_data").cloned().unwrap_or(Value::Null);
    let variations = item_data
        .get("variations")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let first = variations.first();
    let price_money = first.and_then(|v| v.pointer("/item_variation_data/price_money"));
    let text = |value: Option<&Value>| value.and_then(Value::as_str).map(str::to_string);

    Some(Product {
        id: format!("square_{}", item_id),
        name: text(item_data.get("name")).unwrap_or_else(|| "Unnamed Product".to_string()),
        description: text(item_data.get("description")).unwrap_or_default(),
        price: price_money
            .and_then(|m| m.get("amount"))
            .and_then(Value::as_i64)
            .unwrap_or(0),
        currency: text(price_money.and_then(|m| m.get("currency")))
            .map(|c| c.to_lowercase())
            .unwrap_or_else(|| "usd".to_string()),
        category: text(item_data.get("category_id"))
            .unwrap_or_else(|| "uncategorized".to_string()),
        sku: text(first.and_then(|v| v.pointer("/item_variation_data/sku")))
            .unwrap_or_else(|| item_id.to_string()),
        variations: variations
            .iter()
            .filter_map(|variation| {
                Some(ProductVariation {
                    id: variation.get("id").and_then(Value::as_str)?.to_string(),
                    name: text(variation.pointer("/item_variation_data/name")),
                    price: variation
                        .pointer("/item_variation_data/price_money/amount")
                        .and_then(Value::as_i64),
                    sku: text(variation.pointer("/item_variation_data/sku")),
                })
            })
            .collect(),
        platform: ProviderName::Square,
        raw: item.clone(),
    })
}

/// Builds an OPEN order for a payment already collected externally: custom
/// line items, tax as a total-phase service charge, a proposed pickup
/// fulfillment and payment metadata. No tenders are attached.
fn order_payload(order: &OrderRequest, location_id: &str, now: chrono::DateTime<Utc>) -> Value {
    let currency = order
        .line_items
        .first()
        .map(|item| item.currency.to_uppercase())
        .unwrap_or_else(|| "USD".to_string());
    let total_amount = order
        .total_amount
        .filter(|amount| *amount > 0)
        .unwrap_or_else(|| order.line_item_total());
    let payment_intent_id = order.payment_intent_id.as_deref().unwrap_or("external");

    let line_items: Vec<Value> = order
        .line_items
        .iter()
        .map(|item| {
            json!({
                "name": item.name,
                "quantity": item.quantity.to_string(),
                "base_price_money": {
                    "amount": item.base_amount,
                    "currency": item.currency.to_uppercase(),
                },
            })
        })
        .collect();

    let mut body = json!({
        "location_id": location_id,
        "reference_id": order
            .reference_id
            .clone()
            .unwrap_or_else(|| format!("acp_{}", now.timestamp_millis())),
        "line_items": line_items,
        "state": "OPEN",
        "fulfillments": [{
            "type": "PICKUP",
            "state": "PROPOSED",
            "pickup_details": {
                "recipient": { "display_name": "Customer" },
                "pickup_at": (now + Duration::days(1)).to_rfc3339(),
                "expires_at": (now + Duration::days(7)).to_rfc3339(),
            },
        }],
        "metadata": {
            "source": "acp_checkout",
            "payment_provider": "stripe",
            "external_payment": "true",
            "payment_intent_id": payment_intent_id,
            "stripe_payment_status": "succeeded",
            "stripe_amount": total_amount.to_string(),
        },
    });

    if let Some(tax) = order.tax_amount.filter(|tax| *tax > 0) {
        body["service_charges"] = json!([{
            "name": "Tax",
            "amount_money": { "amount": tax, "currency": currency },
            "calculation_phase": "TOTAL_PHASE",
        }]);
    }

    json!({
        "idempotency_key": order.idempotency_key,
        "order": body,
    })
}

fn order_from_response(data: &Value) -> Result<ProviderOrder> {
    let order = data
        .get("order")
        .ok_or_else(|| anyhow!("Response has no order"))?;
    let id = order
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Order has no id"))?;

    Ok(ProviderOrder {
        id: id.to_string(),
        version: order.get("version").and_then(Value::as_i64),
        state: order.get("state").and_then(Value::as_str).map(str::to_string),
        location_id: order
            .get("location_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        platform: ProviderName::Square,
        raw: order.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commerce::OrderLineItem;
    use merchant_connect::Environment;
    use mockito::{Matcher, Server};

    fn provider_for(server_url: &str) -> SquareProvider {
        let config = OAuthConfig {
            client_id: "sq0idp-test".to_string(),
            client_secret: "sq0csp-secret".to_string(),
            redirect_uri: "http://localhost:3000/api/oauth/callback/square".to_string(),
            scopes: vec!["MERCHANT_PROFILE_READ".to_string(), "ITEMS_READ".to_string()],
            authorization_url: format!("{}/oauth2/authorize", server_url),
            token_url: format!("{}/oauth2/token", server_url),
            api_base_url: server_url.to_string(),
            environment: Environment::Sandbox,
        };
        SquareProvider::new(config, Client::new())
    }

    fn sample_order(location_id: Option<&str>) -> OrderRequest {
        OrderRequest {
            idempotency_key: "idem-1".to_string(),
            line_items: vec![OrderLineItem {
                id: "square_ITEM1".to_string(),
                name: "Coffee".to_string(),
                quantity: 2,
                base_amount: 450,
                currency: "usd".to_string(),
            }],
            location_id: location_id.map(str::to_string),
            reference_id: Some("cs_123".to_string()),
            payment_intent_id: Some("pi_123".to_string()),
            total_amount: None,
            tax_amount: Some(80),
        }
    }

    #[test]
    fn test_auth_url() {
        let provider = provider_for("https://connect.squareupsandbox.com");
        let url = provider.generate_auth_url("state123", &[]);

        assert!(url.starts_with("https://connect.squareupsandbox.com/oauth2/authorize?"));
        assert!(url.contains("client_id=sq0idp-test"));
        assert!(url.contains("scope=MERCHANT_PROFILE_READ%20ITEMS_READ"));
        assert!(url.contains("state=state123"));
        assert!(url.contains("session=false"));

        let url = provider.generate_auth_url("state123", &[("session", "true"), ("locale", "en-US")]);
        assert!(url.contains("session=true"));
        assert!(!url.contains("session=false"));
        assert!(url.contains("locale=en-US"));
    }

    #[test]
    fn test_capabilities() {
        let provider = provider_for("http://localhost");
        let caps = provider.capabilities();
        assert!(caps.supports_refresh);
        assert!(caps.supports_revocation);
        assert_eq!(caps.token_expiry_days, Some(30));
        assert!(provider.commerce().is_some());
    }

    #[tokio::test]
    async fn test_exchange_code() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/token")
            .match_header("square-version", SQUARE_VERSION)
            .match_body(Matcher::PartialJson(json!({
                "client_id": "sq0idp-test",
                "code": "auth-code",
                "grant_type": "authorization_code",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "access_token": "EAAAl-access",
                    "token_type": "bearer",
                    "expires_at": "2026-12-01T00:00:00Z",
                    "merchant_id": "MLX1",
                    "refresh_token": "EQAAl-refresh"
                }"#,
            )
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let tokens = provider
            .exchange_code_for_tokens("auth-code", "state")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(tokens.access_token, "EAAAl-access");
        assert_eq!(tokens.refresh_token.as_deref(), Some("EQAAl-refresh"));
        assert_eq!(
            tokens.expires_at.map(|t| t.to_rfc3339()),
            Some("2026-12-01T00:00:00+00:00".to_string())
        );
    }

    #[tokio::test]
    async fn test_exchange_code_error_detail() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth2/token")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"errors": [{"category": "AUTHENTICATION_ERROR", "code": "UNAUTHORIZED", "detail": "Authorization code is already redeemed"}]}"#,
            )
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let err = provider
            .exchange_code_for_tokens("used-code", "state")
            .await
            .unwrap_err();

        assert!(matches!(err, OAuthError::TokenExchangeFailed { provider: ProviderName::Square, .. }));
        assert!(err.to_string().contains("Authorization code is already redeemed"));
        assert!(!err.to_string().contains("sq0csp-secret"));
    }

    #[tokio::test]
    async fn test_refresh_keeps_refresh_token() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth2/token")
            .match_body(Matcher::PartialJson(json!({
                "grant_type": "refresh_token",
                "refresh_token": "EQAAl-refresh",
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "EAAAl-new", "expires_at": 1798761600}"#)
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let tokens = provider.refresh_access_token("EQAAl-refresh").await.unwrap();

        assert_eq!(tokens.access_token, "EAAAl-new");
        assert_eq!(tokens.refresh_token.as_deref(), Some("EQAAl-refresh"));
        assert_eq!(tokens.expires_at.map(|t| t.timestamp()), Some(1798761600));
    }

    #[tokio::test]
    async fn test_refresh_failure() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth2/token")
            .with_status(500)
            .with_body("upstream unavailable")
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let err = provider.refresh_access_token("EQAAl-refresh").await.unwrap_err();
        assert!(matches!(err, OAuthError::RefreshFailed { .. }));
        assert!(err.to_string().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn test_revoke() {
        let mut server = Server::new_async().await;
        let ok = server
            .mock("POST", "/oauth2/revoke")
            .match_header("authorization", "Client sq0csp-secret")
            .match_body(Matcher::PartialJson(json!({"access_token": "EAAAl-access"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success": true}"#)
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        assert!(provider.revoke_token("EAAAl-access").await);
        ok.assert_async().await;

        let _denied = server
            .mock("POST", "/oauth2/revoke")
            .match_body(Matcher::PartialJson(json!({"access_token": "bad"})))
            .with_status(401)
            .with_body(r#"{"errors": [{"detail": "Not authorized"}]}"#)
            .create_async()
            .await;
        assert!(!provider.revoke_token("bad").await);
    }

    #[tokio::test]
    async fn test_get_user_info() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/merchants")
            .match_header("authorization", "Bearer EAAAl-access")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"merchant": [{"id": "MLX1", "business_name": "Test Co", "country": "US"}]}"#,
            )
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let info = provider.get_user_info("EAAAl-access").await.unwrap();

        assert_eq!(info.id, "MLX1");
        assert_eq!(info.name.as_deref(), Some("Test Co"));
        assert_eq!(info.platform, ProviderName::Square);
        assert_eq!(info.raw["country"], "US");
        assert!(provider.validate_token("EAAAl-access").await);
    }

    #[tokio::test]
    async fn test_get_user_info_empty() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/merchants")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"merchant": []}"#)
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let err = provider.get_user_info("tok").await.unwrap_err();
        assert!(matches!(err, OAuthError::IdentityLookupFailed { .. }));
        assert!(!provider.validate_token("tok").await);
    }

    #[tokio::test]
    async fn test_get_products() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/v2/catalog/list?types=ITEM")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "objects": [
                        {
                            "type": "ITEM",
                            "id": "ITEM1",
                            "item_data": {
                                "name": "Coffee",
                                "description": "Single origin",
                                "category_id": "CAT1",
                                "variations": [
                                    {
                                        "id": "VAR1",
                                        "item_variation_data": {
                                            "name": "Small",
                                            "sku": "COF-S",
                                            "price_money": {"amount": 450, "currency": "USD"}
                                        }
                                    },
                                    {
                                        "id": "VAR2",
                                        "item_variation_data": {"name": "Large"}
                                    }
                                ]
                            }
                        },
                        {"type": "ITEM", "id": "ITEM2"}
                    ]
                }"#,
            )
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let commerce = provider.commerce().unwrap();
        let products = commerce.get_products("tok").await.unwrap();

        assert_eq!(products.len(), 2);
        let coffee = &products[0];
        assert_eq!(coffee.id, "square_ITEM1");
        assert_eq!(coffee.price, 450);
        assert_eq!(coffee.currency, "usd");
        assert_eq!(coffee.sku, "COF-S");
        assert_eq!(coffee.category, "CAT1");
        assert_eq!(coffee.variations.len(), 2);
        assert_eq!(coffee.variations[1].price, None);

        let bare = &products[1];
        assert_eq!(bare.name, "Unnamed Product");
        assert_eq!(bare.price, 0);
        assert_eq!(bare.sku, "ITEM2");
        assert_eq!(bare.category, "uncategorized");
    }

    #[tokio::test]
    async fn test_create_order_resolves_location() {
        let mut server = Server::new_async().await;
        let locations = server
            .mock("GET", "/v2/locations")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"locations": [{"id": "LOC1"}, {"id": "LOC2"}]}"#)
            .create_async()
            .await;
        let create = server
            .mock("POST", "/v2/orders")
            .match_body(Matcher::PartialJson(json!({
                "idempotency_key": "idem-1",
                "order": {
                    "location_id": "LOC1",
                    "reference_id": "cs_123",
                    "state": "OPEN",
                    "line_items": [{
                        "name": "Coffee",
                        "quantity": "2",
                        "base_price_money": {"amount": 450, "currency": "USD"}
                    }],
                    "service_charges": [{
                        "name": "Tax",
                        "amount_money": {"amount": 80, "currency": "USD"},
                        "calculation_phase": "TOTAL_PHASE"
                    }],
                    "metadata": {
                        "payment_intent_id": "pi_123",
                        "stripe_amount": "900"
                    }
                }
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"order": {"id": "ORD1", "version": 1, "state": "OPEN", "location_id": "LOC1"}}"#)
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let order = provider
            .create_order("tok", &sample_order(None))
            .await
            .unwrap();

        locations.assert_async().await;
        create.assert_async().await;
        assert_eq!(order.id, "ORD1");
        assert_eq!(order.version, Some(1));
        assert_eq!(order.location_id.as_deref(), Some("LOC1"));
    }

    #[tokio::test]
    async fn test_create_order_without_locations() {
        let mut server = Server::new_async().await;
        let _locations = server
            .mock("GET", "/v2/locations")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"locations": []}"#)
            .create_async()
            .await;
        let create = server
            .mock("POST", "/v2/orders")
            .expect(0)
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let err = provider
            .create_order("tok", &sample_order(None))
            .await
            .unwrap_err();

        create.assert_async().await;
        assert!(matches!(err, OAuthError::ProviderApi { .. }));
        assert!(err.to_string().contains("No Square locations"));
    }

    #[tokio::test]
    async fn test_update_order_status() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("PUT", "/v2/orders/ORD1")
            .match_body(Matcher::Json(json!({"order": {"version": 1, "state": "COMPLETED"}})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"order": {"id": "ORD1", "version": 2, "state": "COMPLETED"}}"#)
            .create_async()
            .await;

        let provider = provider_for(&server.url());
        let order = provider
            .update_order_status("tok", "ORD1", 1, OrderState::Completed)
            .await
            .unwrap();
        assert_eq!(order.version, Some(2));
        assert_eq!(order.state.as_deref(), Some("COMPLETED"));
    }

    #[test]
    fn test_order_payload_defaults() {
        let mut order = sample_order(Some("LOC9"));
        order.reference_id = None;
        order.tax_amount = None;
        order.total_amount = Some(1000);
        let now = Utc::now();

        let payload = order_payload(&order, "LOC9", now);
        assert_eq!(
            payload["order"]["reference_id"],
            format!("acp_{}", now.timestamp_millis())
        );
        assert!(payload["order"].get("service_charges").is_none());
        assert_eq!(payload["order"]["metadata"]["stripe_amount"], "1000");
        assert_eq!(payload["order"]["fulfillments"][0]["type"], "PICKUP");
    }
}
