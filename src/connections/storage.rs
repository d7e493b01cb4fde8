//! SQLite-backed connection store.
//!
//! Credentials are sealed as one JSON blob per row; identity and capability
//! snapshots are stored as plain JSON.

use super::{encryption::CredentialCipher, ConnectionStore, NewConnection, SealedBlob};
use crate::oauth::{ConnectionStatus, OAuthConnection, OAuthTokens, ProviderName};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::warn;
use uuid::Uuid;

const SELECT_COLUMNS: &str = "id, merchant_id, provider, status, credentials, credentials_nonce, \
     user_info, capabilities, created_at, updated_at, last_used_at";

/// Persisted credential layout (camelCase keys, ISO-8601 expiry).
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredCredentials {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_at: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

impl From<&OAuthTokens> for StoredCredentials {
    fn from(tokens: &OAuthTokens) -> Self {
        Self {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_at: tokens.expires_at.map(format_timestamp),
            scope: tokens.scope.clone(),
            token_type: Some(tokens.token_type.clone()),
        }
    }
}

impl StoredCredentials {
    fn into_tokens(self, connection_id: &str) -> OAuthTokens {
        let expires_at = self.expires_at.and_then(|raw| match parse_timestamp(&raw) {
            Ok(dt) => Some(dt),
            Err(e) => {
                warn!(
                    connection_id = %connection_id,
                    error = %e,
                    "Unparsable stored expiry, treating as no expiry"
                );
                None
            }
        });

        OAuthTokens {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            scope: self.scope,
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
        }
    }
}

/// Columns as read from SQLite, before decryption and parsing.
struct RawRow {
    id: String,
    merchant_id: String,
    provider: String,
    status: String,
    credentials: String,
    credentials_nonce: String,
    user_info: String,
    capabilities: String,
    created_at: String,
    updated_at: String,
    last_used_at: Option<String>,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            merchant_id: row.get(1)?,
            provider: row.get(2)?,
            status: row.get(3)?,
            credentials: row.get(4)?,
            credentials_nonce: row.get(5)?,
            user_info: row.get(6)?,
            capabilities: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            last_used_at: row.get(10)?,
        })
    }
}

/// Connection store backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE oauth_connections (
///     id                TEXT PRIMARY KEY,   -- UUIDv7
///     merchant_id       TEXT NOT NULL,
///     provider          TEXT NOT NULL,      -- square | gumroad | wix
///     status            TEXT NOT NULL,      -- connected | revoked | expired
///     credentials       TEXT NOT NULL,      -- Encrypted JSON blob
///     credentials_nonce TEXT NOT NULL,
///     user_info         TEXT NOT NULL,      -- JSON
///     capabilities      TEXT NOT NULL,      -- JSON
///     created_at        TEXT NOT NULL,      -- RFC 3339
///     updated_at        TEXT NOT NULL,
///     last_used_at      TEXT
/// );
/// ```
///
/// No uniqueness on (merchant_id, provider): historical connections coexist
/// and callers filter by status.
pub struct SqliteConnectionStore {
    conn: Mutex<Connection>,
    cipher: CredentialCipher,
}

impl SqliteConnectionStore {
    /// Creates or opens a store.
    ///
    /// # Arguments
    /// * `db_path` - Path to SQLite database file (`:memory:` for tests)
    /// * `encryption_key` - Base64-encoded 32-byte master key
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let cipher =
            CredentialCipher::from_base64_key(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open database")?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS oauth_connections (
                id                TEXT PRIMARY KEY,
                merchant_id       TEXT NOT NULL,
                provider          TEXT NOT NULL,
                status            TEXT NOT NULL,
                credentials       TEXT NOT NULL,
                credentials_nonce TEXT NOT NULL,
                user_info         TEXT NOT NULL,
                capabilities      TEXT NOT NULL,
                created_at        TEXT NOT NULL,
                updated_at        TEXT NOT NULL,
                last_used_at      TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_connections_merchant_status
                ON oauth_connections(merchant_id, status);
            "#,
        )
        .context("Failed to create oauth_connections table")?;

        Ok(Self {
            conn: Mutex::new(conn),
            cipher,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Connection store mutex poisoned"))
    }

    fn seal_tokens(&self, tokens: &OAuthTokens) -> Result<SealedBlob> {
        let json = serde_json::to_vec(&StoredCredentials::from(tokens))
            .context("Failed to serialize credentials")?;
        self.cipher
            .seal(&json)
            .context("Failed to encrypt credentials")
    }

    fn decode_row(&self, raw: RawRow) -> Result<OAuthConnection> {
        let id = raw.id;

        let sealed = SealedBlob {
            ciphertext: raw.credentials,
            nonce: raw.credentials_nonce,
        };
        let plaintext = self
            .cipher
            .open(&sealed)
            .with_context(|| format!("Failed to decrypt credentials for connection {}", id))?;
        let stored: StoredCredentials = serde_json::from_slice(&plaintext)
            .with_context(|| format!("Corrupt credentials blob for connection {}", id))?;

        let provider: ProviderName = raw
            .provider
            .parse()
            .map_err(|_| anyhow!("Unknown provider '{}' on connection {}", raw.provider, id))?;
        let status = ConnectionStatus::parse(&raw.status)
            .ok_or_else(|| anyhow!("Unknown status '{}' on connection {}", raw.status, id))?;

        Ok(OAuthConnection {
            merchant_id: raw.merchant_id,
            provider,
            status,
            tokens: stored.into_tokens(&id),
            user_info: serde_json::from_str(&raw.user_info)
                .with_context(|| format!("Corrupt user_info for connection {}", id))?,
            capabilities: serde_json::from_str(&raw.capabilities)
                .with_context(|| format!("Corrupt capabilities for connection {}", id))?,
            created_at: parse_timestamp(&raw.created_at)?,
            updated_at: parse_timestamp(&raw.updated_at)?,
            last_used_at: raw
                .last_used_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
            id,
        })
    }
}

impl ConnectionStore for SqliteConnectionStore {
    fn insert(&self, new: NewConnection) -> Result<OAuthConnection> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now();
        let sealed = self.seal_tokens(&new.tokens)?;
        let user_info =
            serde_json::to_string(&new.user_info).context("Failed to serialize user_info")?;
        let capabilities =
            serde_json::to_string(&new.capabilities).context("Failed to serialize capabilities")?;

        self.lock()?
            .execute(
                r#"
                INSERT INTO oauth_connections (
                    id, merchant_id, provider, status,
                    credentials, credentials_nonce,
                    user_info, capabilities,
                    created_at, updated_at, last_used_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL)
                "#,
                params![
                    id,
                    new.merchant_id,
                    new.provider.as_str(),
                    ConnectionStatus::Connected.as_str(),
                    sealed.ciphertext,
                    sealed.nonce,
                    user_info,
                    capabilities,
                    format_timestamp(now),
                    format_timestamp(now),
                ],
            )
            .context("Failed to insert connection")?;

        Ok(OAuthConnection {
            id,
            merchant_id: new.merchant_id,
            provider: new.provider,
            status: ConnectionStatus::Connected,
            tokens: new.tokens,
            user_info: new.user_info,
            capabilities: new.capabilities,
            created_at: now,
            updated_at: now,
            last_used_at: None,
        })
    }

    fn get(&self, id: &str) -> Result<Option<OAuthConnection>> {
        let raw = {
            let conn = self.lock()?;
            conn.query_row(
                &format!("SELECT {} FROM oauth_connections WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                RawRow::from_row,
            )
            .optional()
            .context("Failed to load connection")?
        };

        raw.map(|raw| self.decode_row(raw)).transpose()
    }

    fn list_by_merchant(
        &self,
        merchant_id: &str,
        status: ConnectionStatus,
    ) -> Result<Vec<OAuthConnection>> {
        let raws = {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM oauth_connections \
                     WHERE merchant_id = ?1 AND status = ?2 \
                     ORDER BY created_at ASC, id ASC",
                    SELECT_COLUMNS
                ))
                .context("Failed to prepare query")?;

            let rows = stmt
                .query_map(params![merchant_id, status.as_str()], RawRow::from_row)
                .context("Failed to execute query")?
                .collect::<rusqlite::Result<Vec<RawRow>>>()
                .context("Failed to read results")?;
            rows
        };

        raws.into_iter().map(|raw| self.decode_row(raw)).collect()
    }

    fn update_tokens(
        &self,
        id: &str,
        tokens: &OAuthTokens,
        last_used_at: DateTime<Utc>,
    ) -> Result<Option<OAuthConnection>> {
        let sealed = self.seal_tokens(tokens)?;

        let rows_affected = self
            .lock()?
            .execute(
                r#"
                UPDATE oauth_connections
                SET credentials = ?2,
                    credentials_nonce = ?3,
                    last_used_at = ?4,
                    updated_at = ?5
                WHERE id = ?1
                "#,
                params![
                    id,
                    sealed.ciphertext,
                    sealed.nonce,
                    format_timestamp(last_used_at),
                    format_timestamp(Utc::now()),
                ],
            )
            .context("Failed to update connection tokens")?;

        if rows_affected == 0 {
            return Ok(None);
        }
        self.get(id)
    }

    fn set_status(&self, id: &str, status: ConnectionStatus) -> Result<bool> {
        let rows_affected = self
            .lock()?
            .execute(
                "UPDATE oauth_connections SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status.as_str(), format_timestamp(Utc::now())],
            )
            .context("Failed to update connection status")?;

        Ok(rows_affected > 0)
    }
}

/// Fixed-width RFC 3339 so text ordering matches time ordering and values
/// round-trip exactly.
fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp '{}'", raw))
}
