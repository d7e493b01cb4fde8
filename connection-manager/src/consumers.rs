//! Downstream consumers of stored connections.
//!
//! Both the product feed and order submission apply the token-freshness
//! policy before any provider data call: an expired token is refreshed when
//! the provider allows it, otherwise the connection needs re-authorization.

use crate::commerce::{OrderRequest, Product, ProviderOrder};
use crate::manager::ConnectionManager;
use merchant_connect::{OAuthError, ProviderName};
use serde::Serialize;
use tracing::{debug, info, warn};

/// A connection that contributed nothing to the feed.
#[derive(Clone, Debug, Serialize)]
pub struct SkippedConnection {
    pub connection_id: String,
    pub provider: ProviderName,
    /// Machine code of the failure, see `OAuthError::code`
    pub reason: String,
}

/// Aggregated catalog across a merchant's connections.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ProductFeed {
    pub merchant_id: String,
    pub products: Vec<Product>,
    pub skipped: Vec<SkippedConnection>,
}

/// Collects products from every connected, commerce-capable connection.
///
/// A failing connection is logged and skipped; only a store failure fails
/// the whole feed.
pub async fn build_product_feed(
    manager: &ConnectionManager,
    merchant_id: &str,
) -> Result<ProductFeed, OAuthError> {
    let connections = manager.get_connections(merchant_id)?;
    let mut feed = ProductFeed {
        merchant_id: merchant_id.to_string(),
        ..Default::default()
    };

    for connection in connections {
        let provider = connection.provider;
        let connection_id = connection.id.clone();

        let Ok(adapter) = manager.provider(provider) else {
            debug!(provider = %provider, connection_id = %connection_id, "Provider not configured, skipping");
            continue;
        };
        let Some(commerce) = adapter.commerce() else {
            continue;
        };

        let result = match manager.ensure_fresh(connection).await {
            Ok(fresh) => commerce.get_products(&fresh.tokens.access_token).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(products) => {
                debug!(
                    provider = %provider,
                    connection_id = %connection_id,
                    count = products.len(),
                    "Fetched products"
                );
                feed.products.extend(products);
            }
            Err(e) => {
                warn!(
                    provider = %provider,
                    connection_id = %connection_id,
                    error = %e,
                    "Skipping connection in product feed"
                );
                feed.skipped.push(SkippedConnection {
                    connection_id,
                    provider,
                    reason: e.code().to_string(),
                });
            }
        }
    }

    info!(
        merchant_id = %merchant_id,
        products = feed.products.len(),
        skipped = feed.skipped.len(),
        "Product feed built"
    );
    Ok(feed)
}

/// Creates an order on the merchant's most recent active connection for
/// `provider`.
///
/// # Errors
/// - `ConnectionNotFound` if the merchant has no active connection there
/// - `ProviderApi` if the provider has no order support
/// - `ReauthorizationRequired` or refresh errors from the freshness check
pub async fn submit_order(
    manager: &ConnectionManager,
    merchant_id: &str,
    provider: ProviderName,
    order: &OrderRequest,
) -> Result<ProviderOrder, OAuthError> {
    let adapter = manager.provider(provider)?;
    let commerce = adapter.commerce().ok_or_else(|| OAuthError::ProviderApi {
        provider,
        detail: "provider does not support order creation".to_string(),
    })?;

    // Rows come oldest first; the newest one is the active connection
    let connection = manager
        .get_connections(merchant_id)?
        .into_iter()
        .filter(|c| c.provider == provider)
        .last()
        .ok_or_else(|| {
            OAuthError::ConnectionNotFound(format!("{} connection for merchant {}", provider, merchant_id))
        })?;

    let connection = manager.ensure_fresh(connection).await?;
    let created = commerce
        .create_order(&connection.tokens.access_token, order)
        .await?;

    info!(
        provider = %provider,
        merchant_id = %merchant_id,
        connection_id = %connection.id,
        order_id = %created.id,
        "Order submitted"
    );
    Ok(created)
}
