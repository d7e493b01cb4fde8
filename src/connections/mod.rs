//! Durable OAuth connection records.
//!
//! The connection manager is the only writer; the store is a passive ledger
//! with lookup by id and by merchant id. Rows are never deleted: revocation
//! and expiry are status transitions.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │       ConnectionStore (trait)            │
//! │  - insert / get / list_by_merchant       │
//! │  - update_tokens / set_status            │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//!    (seal credentials)   (open credentials)
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       CredentialCipher                   │
//! │  - AES-256-GCM, fresh nonce per write    │
//! └─────────────────────────────────────────┘
//!          ↓                    ↑
//! ┌─────────────────────────────────────────┐
//! │       SQLite (oauth_connections)         │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use merchant_connect::connections::{ConnectionStore, NewConnection, SqliteConnectionStore};
//! use merchant_connect::oauth::{OAuthProviderCapabilities, OAuthTokens, OAuthUserInfo, ProviderName};
//!
//! # fn main() -> anyhow::Result<()> {
//! let key = std::env::var("ACP_ENCRYPTION_KEY")?;
//! let store = SqliteConnectionStore::new("connections.db", &key)?;
//!
//! let connection = store.insert(NewConnection {
//!     merchant_id: "merchant_1".to_string(),
//!     provider: ProviderName::Gumroad,
//!     tokens: OAuthTokens::bearer("access-token"),
//!     user_info: OAuthUserInfo {
//!         id: "seller_1".to_string(),
//!         email: None,
//!         name: Some("Test Co".to_string()),
//!         platform: ProviderName::Gumroad,
//!         raw: serde_json::Value::Null,
//!     },
//!     capabilities: OAuthProviderCapabilities {
//!         supports_refresh: false,
//!         supports_revocation: true,
//!         token_expiry_days: Some(30),
//!         refresh_token_expiry_days: None,
//!         max_tokens_per_user: Some(1),
//!     },
//! })?;
//!
//! let active = store.list_by_merchant("merchant_1", merchant_connect::ConnectionStatus::Connected)?;
//! assert_eq!(active[0].id, connection.id);
//! # Ok(())
//! # }
//! ```

use crate::oauth::{
    ConnectionStatus, OAuthConnection, OAuthProviderCapabilities, OAuthTokens, OAuthUserInfo,
    ProviderName,
};
use anyhow::Result;
use chrono::{DateTime, Utc};

mod encryption;
mod storage;

pub use encryption::{CredentialCipher, SealedBlob};
pub use storage::SqliteConnectionStore;

/// Data for a connection about to be created.
#[derive(Clone, Debug)]
pub struct NewConnection {
    pub merchant_id: String,
    pub provider: ProviderName,
    pub tokens: OAuthTokens,
    pub user_info: OAuthUserInfo,
    pub capabilities: OAuthProviderCapabilities,
}

/// Read/write contract for connection persistence.
///
/// Absence is reported as `Ok(None)` / `Ok(false)` / an empty list; `Err` is
/// reserved for store-level failures.
pub trait ConnectionStore: Send + Sync {
    /// Persists a new row with status `connected` and returns it with its
    /// store-assigned id and timestamps.
    fn insert(&self, connection: NewConnection) -> Result<OAuthConnection>;

    fn get(&self, id: &str) -> Result<Option<OAuthConnection>>;

    /// All rows for `merchant_id` with the given status, oldest first.
    fn list_by_merchant(
        &self,
        merchant_id: &str,
        status: ConnectionStatus,
    ) -> Result<Vec<OAuthConnection>>;

    /// Overwrites the stored tokens and bumps `last_used_at`.
    /// Returns `Ok(None)` if the row does not exist.
    fn update_tokens(
        &self,
        id: &str,
        tokens: &OAuthTokens,
        last_used_at: DateTime<Utc>,
    ) -> Result<Option<OAuthConnection>>;

    /// Returns `Ok(false)` if the row does not exist.
    fn set_status(&self, id: &str, status: ConnectionStatus) -> Result<bool>;
}
