//! OAuth state codec.
//!
//! The state value correlates a provider callback with the request that
//! initiated it. It is carried only in the redirect URL and never persisted:
//! the state is serialized to JSON and encoded as unpadded base64url so it can
//! be embedded in a query string without escaping.
//!
//! The encoding is not signed. A forged state can only name a merchant; the
//! connection it leads to still requires a valid authorization code issued
//! by the provider.

use super::{OAuthError, ProviderName};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Redirect-carried OAuth state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OAuthState {
    pub merchant_id: String,
    pub provider: ProviderName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_url: Option<String>,
    /// Ordered so the serialized form is canonical
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Issue time in unix milliseconds
    pub issued_at: i64,
}

impl OAuthState {
    /// Creates a state stamped with the current time.
    pub fn new(merchant_id: impl Into<String>, provider: ProviderName) -> Self {
        Self {
            merchant_id: merchant_id.into(),
            provider,
            return_url: None,
            metadata: BTreeMap::new(),
            issued_at: Utc::now().timestamp_millis(),
        }
    }

    pub fn with_return_url(mut self, return_url: Option<String>) -> Self {
        self.return_url = return_url;
        self
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.issued_at)
    }

    /// True when the state was issued longer than `ttl` ago.
    ///
    /// A timestamp from the future (clock skew between instances) is not
    /// treated as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match self.issued_at() {
            Some(issued_at) => now - issued_at > ttl,
            None => true,
        }
    }
}

/// Encodes a state into a URL-safe token.
pub fn encode_state(state: &OAuthState) -> Result<String, OAuthError> {
    let json = serde_json::to_vec(state)
        .map_err(|e| OAuthError::InvalidState(format!("failed to serialize state: {}", e)))?;
    Ok(BASE64URL.encode(json))
}

/// Decodes a token produced by [`encode_state`].
///
/// Every malformed input (bad alphabet, truncation, non-JSON payload, missing
/// fields, unknown provider) fails with [`OAuthError::InvalidState`].
pub fn decode_state(token: &str) -> Result<OAuthState, OAuthError> {
    let bytes = BASE64URL
        .decode(token.trim())
        .map_err(|e| OAuthError::InvalidState(format!("state is not valid base64url: {}", e)))?;

    let state: OAuthState = serde_json::from_slice(&bytes)
        .map_err(|e| OAuthError::InvalidState(format!("state payload is malformed: {}", e)))?;

    if state.merchant_id.trim().is_empty() {
        return Err(OAuthError::InvalidState(
            "state carries an empty merchant id".to_string(),
        ));
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> OAuthState {
        let mut state = OAuthState::new("merchant_42", ProviderName::Square)
            .with_return_url(Some("https://shop.example.com/settings?tab=1".to_string()));
        state
            .metadata
            .insert("source".to_string(), serde_json::json!("dashboard"));
        state
    }

    #[test]
    fn test_round_trip() {
        let states = vec![
            sample_state(),
            OAuthState::new("m", ProviderName::Gumroad),
            OAuthState::new("merchant with spaces & ünïcode", ProviderName::Wix),
        ];

        for state in states {
            let token = encode_state(&state).unwrap();
            assert_eq!(decode_state(&token).unwrap(), state);
        }
    }

    #[test]
    fn test_encoding_is_url_safe() {
        let token = encode_state(&sample_state()).unwrap();
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert!(!token.contains('='));
    }

    #[test]
    fn test_encoding_is_canonical() {
        let mut a = OAuthState::new("merchant_1", ProviderName::Wix);
        a.issued_at = 1_700_000_000_000;
        let mut b = a.clone();

        a.metadata.insert("x".to_string(), serde_json::json!(1));
        a.metadata.insert("y".to_string(), serde_json::json!(2));
        b.metadata.insert("y".to_string(), serde_json::json!(2));
        b.metadata.insert("x".to_string(), serde_json::json!(1));

        assert_eq!(encode_state(&a).unwrap(), encode_state(&b).unwrap());
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let valid = encode_state(&sample_state()).unwrap();
        let truncated = &valid[..valid.len() / 2];
        let not_json = BASE64URL.encode(b"hello world");
        let wrong_shape = BASE64URL.encode(br#"{"merchant_id": 5}"#);
        let unknown_provider = BASE64URL
            .encode(br#"{"merchant_id":"m1","provider":"shopify","issued_at":0}"#);
        let empty_merchant =
            BASE64URL.encode(br#"{"merchant_id":" ","provider":"wix","issued_at":0}"#);

        let inputs = [
            "",
            "!!!not base64!!!",
            truncated,
            not_json.as_str(),
            wrong_shape.as_str(),
            unknown_provider.as_str(),
            empty_merchant.as_str(),
            "eyJ",
        ];

        for input in inputs {
            let err = decode_state(input).unwrap_err();
            assert!(
                matches!(err, OAuthError::InvalidState(_)),
                "expected InvalidState for {:?}, got {:?}",
                input,
                err
            );
        }
    }

    #[test]
    fn test_state_expiry() {
        let now = Utc::now();
        let ttl = Duration::seconds(600);

        let fresh = OAuthState::new("m1", ProviderName::Square);
        assert!(!fresh.is_expired_at(now, ttl));

        let mut stale = fresh.clone();
        stale.issued_at = (now - Duration::seconds(601)).timestamp_millis();
        assert!(stale.is_expired_at(now, ttl));

        let mut future = fresh;
        future.issued_at = (now + Duration::seconds(30)).timestamp_millis();
        assert!(!future.is_expired_at(now, ttl));
    }
}
