//! Normalized catalog and order types shared by every commerce-capable
//! provider.

use merchant_connect::ProviderName;
use serde::{Deserialize, Serialize};

/// A catalog item in provider-neutral form. Prices are in minor units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Provider-prefixed id (e.g. `square_<item id>`)
    pub id: String,
    pub name: String,
    pub description: String,
    pub price: i64,
    /// Lowercase ISO 4217 code
    pub currency: String,
    pub category: String,
    pub sku: String,
    pub variations: Vec<ProductVariation>,
    pub platform: ProviderName,
    #[serde(default)]
    pub raw: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductVariation {
    pub id: String,
    pub name: Option<String>,
    pub price: Option<i64>,
    pub sku: Option<String>,
}

/// An order to be recorded on the merchant's platform after payment was
/// collected elsewhere.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub idempotency_key: String,
    pub line_items: Vec<OrderLineItem>,
    /// Provider location; the first location is used when absent
    pub location_id: Option<String>,
    pub reference_id: Option<String>,
    /// External payment reference recorded in order metadata
    pub payment_intent_id: Option<String>,
    /// Amount actually charged; defaults to the line item sum
    pub total_amount: Option<i64>,
    pub tax_amount: Option<i64>,
}

impl OrderRequest {
    /// Sum of `base_amount * quantity` over all line items.
    pub fn line_item_total(&self) -> i64 {
        self.line_items
            .iter()
            .map(|item| item.base_amount * i64::from(item.quantity))
            .sum()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub id: String,
    pub name: String,
    pub quantity: u32,
    /// Unit price in minor units
    pub base_amount: i64,
    pub currency: String,
}

/// Order lifecycle states accepted by `update_order_status`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderState {
    Open,
    Completed,
    Canceled,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::Open => "OPEN",
            OrderState::Completed => "COMPLETED",
            OrderState::Canceled => "CANCELED",
        }
    }
}

/// An order as recorded by the provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProviderOrder {
    pub id: String,
    /// Optimistic concurrency version, required for updates
    pub version: Option<i64>,
    pub state: Option<String>,
    pub location_id: Option<String>,
    pub platform: ProviderName,
    #[serde(default)]
    pub raw: serde_json::Value,
}
