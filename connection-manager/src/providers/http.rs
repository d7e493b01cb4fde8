//! Request plumbing shared by the provider adapters.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use merchant_connect::{OAuthTokens, ProviderName};
use reqwest::Client;
use serde_json::Value;
use tracing::warn;

pub const USER_AGENT: &str = "merchant-connect/1.0";

/// Longest slice of a non-JSON error body kept in error messages.
const MAX_ERROR_BODY: usize = 200;

/// Builds the client shared by every adapter.
pub fn build_http_client(timeout: std::time::Duration) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Appends `defaults` and `extra` as a query string to `base`.
///
/// An `extra` key replaces the default with the same key.
pub(crate) fn authorization_url<'a>(
    base: &str,
    defaults: &[(&'a str, &'a str)],
    extra: &[(&'a str, &'a str)],
) -> String {
    let mut params = defaults.to_vec();
    for &(key, value) in extra {
        match params.iter_mut().find(|(k, _)| *k == key) {
            Some(param) => param.1 = value,
            None => params.push((key, value)),
        }
    }

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base, separator, query)
}

/// Extracts a provider-reported error message from a JSON body.
///
/// Recognizes Square's `errors[0].detail` and the OAuth-standard
/// `error_description` / `error` fields.
pub(crate) fn error_detail(body: &Value) -> Option<String> {
    if let Some(detail) = body.pointer("/errors/0/detail").and_then(Value::as_str) {
        return Some(detail.to_string());
    }
    if let Some(description) = body.get("error_description").and_then(Value::as_str) {
        return Some(description.to_string());
    }
    match body.get("error") {
        Some(Value::String(error)) => Some(error.clone()),
        Some(Value::Object(error)) => error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Reads a response as JSON, failing on non-2xx statuses and on 2xx bodies
/// that carry an error payload.
pub(crate) async fn read_json(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let body = response
        .text()
        .await
        .context("Failed to read response body")?;
    let json: Option<Value> = serde_json::from_str(&body).ok();

    if !status.is_success() {
        let detail = json
            .as_ref()
            .and_then(error_detail)
            .unwrap_or_else(|| truncate(&body));
        return Err(anyhow!("HTTP {}: {}", status.as_u16(), detail));
    }

    let json = json.ok_or_else(|| anyhow!("Response body is not valid JSON"))?;
    if let Some(detail) = error_detail(&json) {
        return Err(anyhow!(detail));
    }
    Ok(json)
}

fn truncate(body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return "empty response body".to_string();
    }
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Converts a token endpoint response into [`OAuthTokens`].
///
/// Expiry is read from `expires_at` (unix seconds or ISO-8601) when present,
/// otherwise from `expires_in` (seconds from `now`). An unparsable expiry is
/// logged and treated as unknown. When the response omits a refresh token,
/// `previous_refresh_token` is kept.
pub(crate) fn parse_token_response(
    provider: ProviderName,
    data: &Value,
    now: DateTime<Utc>,
    previous_refresh_token: Option<&str>,
) -> Result<OAuthTokens> {
    let access_token = data
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| anyhow!("Token response has no access_token"))?;

    let refresh_token = data
        .get("refresh_token")
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .or(previous_refresh_token)
        .map(str::to_string);

    let expires_at = match (data.get("expires_at"), data.get("expires_in")) {
        (Some(value), _) if !value.is_null() => absolute_expiry(provider, value),
        (_, Some(value)) if !value.is_null() => relative_expiry(provider, value, now),
        _ => None,
    };

    let scope = match data.get("scope") {
        Some(Value::String(scope)) => Some(scope.clone()),
        Some(Value::Array(scopes)) => Some(
            scopes
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(" "),
        ),
        _ => None,
    };

    let token_type = data
        .get("token_type")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .unwrap_or("Bearer")
        .to_string();

    Ok(OAuthTokens {
        access_token: access_token.to_string(),
        refresh_token,
        expires_at,
        scope,
        token_type,
    })
}

fn absolute_expiry(provider: ProviderName, value: &Value) -> Option<DateTime<Utc>> {
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                s.parse::<i64>()
                    .ok()
                    .and_then(|secs| DateTime::from_timestamp(secs, 0))
            }),
        _ => None,
    };

    if parsed.is_none() {
        warn!(provider = %provider, value = %value, "Unparsable expires_at, treating expiry as unknown");
    }
    parsed
}

fn relative_expiry(provider: ProviderName, value: &Value, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let seconds = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    // Out-of-range lifetimes fall through to the unknown-expiry branch
    let expires_at = match seconds {
        Some(0) => return None,
        Some(secs) if secs > 0 => {
            Duration::try_seconds(secs).and_then(|lifetime| now.checked_add_signed(lifetime))
        }
        _ => None,
    };

    match expires_at {
        Some(expires_at) => Some(expires_at),
        None => {
            warn!(provider = %provider, value = %value, "Unparsable expires_in, treating expiry as unknown");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_authorization_url() {
        let url = authorization_url(
            "https://example.com/oauth/authorize",
            &[("client_id", "app id"), ("scope", "read write"), ("state", "abc")],
            &[("scope", "read"), ("prompt", "consent")],
        );

        assert_eq!(
            url,
            "https://example.com/oauth/authorize?client_id=app%20id&scope=read&state=abc&prompt=consent"
        );

        let url = authorization_url("https://example.com/auth?tenant=1", &[("state", "x")], &[]);
        assert_eq!(url, "https://example.com/auth?tenant=1&state=x");
    }

    #[test]
    fn test_error_detail_shapes() {
        assert_eq!(
            error_detail(&json!({"errors": [{"category": "AUTHENTICATION_ERROR", "detail": "Bad code"}]})),
            Some("Bad code".to_string())
        );
        assert_eq!(
            error_detail(&json!({"error": "invalid_grant", "error_description": "Code expired"})),
            Some("Code expired".to_string())
        );
        assert_eq!(
            error_detail(&json!({"error": "invalid_client"})),
            Some("invalid_client".to_string())
        );
        assert_eq!(
            error_detail(&json!({"error": {"message": "Not allowed"}})),
            Some("Not allowed".to_string())
        );
        assert_eq!(error_detail(&json!({"access_token": "tok"})), None);
    }

    #[test]
    fn test_expires_in_is_relative() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let tokens = parse_token_response(
            ProviderName::Wix,
            &json!({"access_token": "tok_abc", "expires_in": 3600}),
            now,
            None,
        )
        .unwrap();

        assert_eq!(tokens.access_token, "tok_abc");
        assert_eq!(tokens.expires_at, Some(now + Duration::seconds(3600)));
        assert_eq!(tokens.token_type, "Bearer");
        assert!(tokens.refresh_token.is_none());
    }

    #[test]
    fn test_expires_at_forms() {
        let now = Utc::now();
        let expected = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        for value in [
            json!("2026-03-01T12:00:00Z"),
            json!(expected.timestamp()),
            json!(expected.timestamp().to_string()),
        ] {
            let tokens = parse_token_response(
                ProviderName::Square,
                &json!({"access_token": "tok", "expires_at": value}),
                now,
                None,
            )
            .unwrap();
            assert_eq!(tokens.expires_at, Some(expected), "for {}", value);
        }
    }

    #[test]
    fn test_unparsable_expiry_is_unknown() {
        let now = Utc::now();
        for data in [
            json!({"access_token": "tok", "expires_at": "next tuesday"}),
            json!({"access_token": "tok", "expires_in": "soon"}),
            json!({"access_token": "tok", "expires_in": -5}),
            json!({"access_token": "tok", "expires_in": 0}),
            json!({"access_token": "tok", "expires_at": null}),
            json!({"access_token": "tok", "expires_in": 10_000_000_000_000i64}),
            json!({"access_token": "tok", "expires_in": 1e18}),
            json!({"access_token": "tok", "expires_in": "9000000000000000000"}),
        ] {
            let tokens = parse_token_response(ProviderName::Gumroad, &data, now, None).unwrap();
            assert_eq!(tokens.expires_at, None, "for {}", data);
        }
    }

    #[test]
    fn test_refresh_token_carry_over() {
        let now = Utc::now();
        let kept = parse_token_response(
            ProviderName::Wix,
            &json!({"access_token": "new"}),
            now,
            Some("old-refresh"),
        )
        .unwrap();
        assert_eq!(kept.refresh_token.as_deref(), Some("old-refresh"));

        let replaced = parse_token_response(
            ProviderName::Wix,
            &json!({"access_token": "new", "refresh_token": "new-refresh"}),
            now,
            Some("old-refresh"),
        )
        .unwrap();
        assert_eq!(replaced.refresh_token.as_deref(), Some("new-refresh"));
    }

    #[test]
    fn test_missing_access_token() {
        let err = parse_token_response(
            ProviderName::Square,
            &json!({"token_type": "bearer"}),
            Utc::now(),
            None,
        )
        .unwrap_err();
        assert!(err.to_string().contains("access_token"));
    }

    #[test]
    fn test_scope_array_is_joined() {
        let tokens = parse_token_response(
            ProviderName::Wix,
            &json!({"access_token": "tok", "scope": ["SITE_READ", "STORES_READ"], "token_type": "bearer"}),
            Utc::now(),
            None,
        )
        .unwrap();
        assert_eq!(tokens.scope.as_deref(), Some("SITE_READ STORES_READ"));
        assert_eq!(tokens.token_type, "bearer");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("  "), "empty response body");
        let long = "x".repeat(500);
        assert_eq!(truncate(&long).len(), MAX_ERROR_BODY + 3);
    }
}
