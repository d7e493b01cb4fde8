//! Connection Manager - OAuth connection lifecycle for merchant commerce platforms.
//!
//! Establishes, persists, refreshes and revokes Square, Gumroad and Wix
//! credentials on behalf of a merchant, and exposes the connected catalogs to
//! downstream consumers.
//!
//! # Architecture
//!
//! ```text
//!   Dashboard "Connect"            Provider consent page
//!          ↓                                ↓
//! ┌─────────────────────────────────────────────────┐
//! │       HTTP API (axum)                            │
//! │  - initiate / callback redirects                 │
//! │  - connections, refresh, providers, feed         │
//! └─────────────────────────────────────────────────┘
//!          ↓
//! ┌─────────────────────────────────────────────────┐
//! │       Connection Manager                         │
//! │  - State codec + TTL check                       │
//! │  - Exchange, identity, persist                   │
//! │  - Refresh / revoke / freshness policy           │
//! └─────────────────────────────────────────────────┘
//!          ↓                          ↓
//!   Provider registry           Connection store
//!   (Square, Gumroad, Wix)      (SQLite, encrypted)
//! ```
//!
//! # Core Types
//!
//! - [`OAuthProvider`] - Trait every platform adapter implements
//! - [`CommerceProvider`] - Optional catalog/order capability
//! - [`ProviderRegistry`] - Adapters built once from configuration
//! - [`ConnectionManager`] - Orchestrates the OAuth flow

pub mod api;
pub mod commerce;
pub mod consumers;
pub mod manager;
pub mod provider;
pub mod providers;
pub mod registry;

pub use manager::ConnectionManager;
pub use provider::{CommerceProvider, OAuthProvider};
pub use registry::ProviderRegistry;
