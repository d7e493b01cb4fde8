pub mod gumroad;
pub mod http;
pub mod square;
pub mod wix;

pub use gumroad::GumroadProvider;
pub use http::build_http_client;
pub use square::SquareProvider;
pub use wix::WixProvider;

use crate::OAuthProvider;
use merchant_connect::{OAuthConfig, ProviderName};
use reqwest::Client;
use std::sync::Arc;

/// Instantiates the adapter for `provider`.
pub fn build_provider(
    provider: ProviderName,
    config: OAuthConfig,
    http: Client,
) -> Arc<dyn OAuthProvider> {
    match provider {
        ProviderName::Square => Arc::new(SquareProvider::new(config, http)),
        ProviderName::Gumroad => Arc::new(GumroadProvider::new(config, http)),
        ProviderName::Wix => Arc::new(WixProvider::new(config, http)),
    }
}
