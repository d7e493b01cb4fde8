//! HTTP API for the OAuth connection lifecycle.
//!
//! Routes:
//! - `GET /api/oauth/initiate/:provider` - redirect to the provider consent page
//! - `GET /api/oauth/callback/:provider` - complete the flow, redirect to the dashboard
//! - `GET /api/oauth/connections?merchant_id=` - list active connections
//! - `DELETE /api/oauth/connections?connection_id=` - revoke a connection
//! - `POST /api/oauth/refresh/:connection_id` - refresh stored tokens
//! - `GET /api/oauth/providers` - configured providers and their capabilities
//! - `GET /api/feed/:merchant_id` - aggregated product feed
//!
//! Connection responses never include token values.

use crate::consumers::{build_product_feed, ProductFeed};
use crate::manager::{ConnectionManager, ProviderSummary};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use merchant_connect::{
    ConnectionStatus, OAuthConnection, OAuthError, OAuthProviderCapabilities, OAuthUserInfo,
    ProviderName,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared state for the OAuth API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub manager: Arc<ConnectionManager>,
    /// Where the callback sends the browser afterwards
    pub dashboard_url: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
}

/// Application error types for the JSON endpoints
enum AppError {
    BadRequest(String),
    NotFound(String),
    ServerError(String),
    Domain(OAuthError),
}

impl From<OAuthError> for AppError {
    fn from(err: OAuthError) -> Self {
        AppError::Domain(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, code) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::ServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, None),
            AppError::Domain(err) => {
                let status = match err {
                    OAuthError::ProviderNotConfigured { .. }
                    | OAuthError::InvalidRequest(_)
                    | OAuthError::InvalidState(_) => StatusCode::BAD_REQUEST,
                    OAuthError::ConnectionNotFound(_) => StatusCode::NOT_FOUND,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.to_string(), Some(err.code()))
            }
        };

        (status, Json(ErrorResponse { error, code })).into_response()
    }
}

/// Connection as returned to clients: tokens reduced to metadata.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ConnectionView {
    pub id: String,
    pub merchant_id: String,
    pub provider: ProviderName,
    pub status: ConnectionStatus,
    pub user_info: OAuthUserInfo,
    pub capabilities: OAuthProviderCapabilities,
    pub expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub token_type: String,
    pub has_refresh_token: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<OAuthConnection> for ConnectionView {
    fn from(c: OAuthConnection) -> Self {
        Self {
            has_refresh_token: c.tokens.refresh_token.is_some(),
            expires_at: c.tokens.expires_at,
            scope: c.tokens.scope,
            token_type: c.tokens.token_type,
            id: c.id,
            merchant_id: c.merchant_id,
            provider: c.provider,
            status: c.status,
            user_info: c.user_info,
            capabilities: c.capabilities,
            created_at: c.created_at,
            updated_at: c.updated_at,
            last_used_at: c.last_used_at,
        }
    }
}

#[derive(Deserialize)]
pub struct InitiateQuery {
    merchant_id: Option<String>,
    return_url: Option<String>,
}

/// OAuth callback query parameters
#[derive(Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Deserialize)]
pub struct ConnectionsQuery {
    merchant_id: Option<String>,
    connection_id: Option<String>,
}

#[derive(Serialize)]
pub struct ListConnectionsResponse {
    pub connections: Vec<ConnectionView>,
}

#[derive(Serialize)]
pub struct RevokeResponse {
    pub success: bool,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub connection: ConnectionView,
}

#[derive(Serialize)]
pub struct ProvidersResponse {
    pub providers: Vec<ProviderSummary>,
}

/// Create OAuth API router
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/oauth/initiate/:provider", get(initiate))
        .route("/api/oauth/callback/:provider", get(callback))
        .route(
            "/api/oauth/connections",
            get(list_connections).delete(revoke_connection),
        )
        .route("/api/oauth/refresh/:connection_id", post(refresh_connection))
        .route("/api/oauth/providers", get(list_providers))
        .route("/api/feed/:merchant_id", get(product_feed))
        .with_state(Arc::new(state))
}

/// 302 Found with a `Location` header.
fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ApiState {
    fn dashboard(&self) -> &str {
        self.dashboard_url.trim_end_matches('/')
    }

    fn error_redirect(&self, message: &str) -> Response {
        found(format!(
            "{}/auth/error?error={}",
            self.dashboard(),
            urlencoding::encode(message)
        ))
    }

    fn success_redirect(&self, connection: &OAuthConnection) -> Response {
        found(format!(
            "{}/dashboard/connections?success=true&provider={}&connection_id={}",
            self.dashboard(),
            connection.provider,
            urlencoding::encode(&connection.id)
        ))
    }
}

/// User-facing callback message. Detail stays in the server log.
fn callback_error_message(err: &OAuthError) -> &'static str {
    match err {
        OAuthError::ProviderNotConfigured { .. } => "Unsupported provider",
        OAuthError::InvalidState(_) => "Invalid or expired authorization link. Please try again.",
        _ => "Failed to connect your account. Please try again.",
    }
}

/// GET /api/oauth/initiate/:provider
async fn initiate(
    State(state): State<Arc<ApiState>>,
    Path(provider): Path<String>,
    Query(query): Query<InitiateQuery>,
) -> Result<Response, AppError> {
    let provider: ProviderName = provider.parse()?;
    let merchant_id = non_empty(query.merchant_id)
        .ok_or_else(|| AppError::BadRequest("merchant_id is required".to_string()))?;

    let url = state
        .manager
        .initiate_oauth(provider, &merchant_id, non_empty(query.return_url))?;

    debug!(provider = %provider, merchant_id = %merchant_id, "Redirecting to OAuth provider");
    Ok(found(url))
}

/// GET /api/oauth/callback/:provider
///
/// Always answers with a redirect to the dashboard.
async fn callback(
    State(state): State<Arc<ApiState>>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    if let Some(error) = query.error {
        let description = query.error_description.unwrap_or_else(|| error.clone());
        warn!(
            provider = %provider,
            error = %error,
            description = %description,
            "OAuth authorization declined"
        );
        return state.error_redirect(&description);
    }

    let (Some(code), Some(oauth_state)) = (non_empty(query.code), non_empty(query.state)) else {
        warn!(provider = %provider, "OAuth callback missing code or state");
        return state.error_redirect("Missing authorization code or state");
    };

    let provider: ProviderName = match provider.parse() {
        Ok(p) => p,
        Err(e) => {
            warn!(provider = %provider, "OAuth callback for unknown provider");
            return state.error_redirect(callback_error_message(&e));
        }
    };

    match state
        .manager
        .handle_callback(provider, &code, &oauth_state)
        .await
    {
        Ok(connection) => state.success_redirect(&connection),
        Err(e) => {
            error!(
                provider = %provider,
                error = %e,
                code = e.code(),
                "OAuth callback failed"
            );
            state.error_redirect(callback_error_message(&e))
        }
    }
}

/// GET /api/oauth/connections?merchant_id=
async fn list_connections(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ConnectionsQuery>,
) -> Result<Json<ListConnectionsResponse>, AppError> {
    let merchant_id = non_empty(query.merchant_id)
        .ok_or_else(|| AppError::BadRequest("merchant_id is required".to_string()))?;

    let connections = state
        .manager
        .get_connections(&merchant_id)?
        .into_iter()
        .map(ConnectionView::from)
        .collect();

    Ok(Json(ListConnectionsResponse { connections }))
}

/// DELETE /api/oauth/connections?connection_id=
async fn revoke_connection(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ConnectionsQuery>,
) -> Result<Json<RevokeResponse>, AppError> {
    let connection_id = non_empty(query.connection_id)
        .ok_or_else(|| AppError::BadRequest("connection_id is required".to_string()))?;

    let success = state.manager.revoke_connection(&connection_id).await?;
    Ok(Json(RevokeResponse { success }))
}

/// POST /api/oauth/refresh/:connection_id
async fn refresh_connection(
    State(state): State<Arc<ApiState>>,
    Path(connection_id): Path<String>,
) -> Result<Json<RefreshResponse>, AppError> {
    let connection = state
        .manager
        .refresh_connection(&connection_id)
        .await
        .map_err(|e| match e {
            OAuthError::ConnectionNotFound(_) => AppError::NotFound(e.to_string()),
            other => {
                error!(connection_id = %connection_id, error = %other, "Refresh request failed");
                AppError::ServerError(other.to_string())
            }
        })?;

    info!(connection_id = %connection_id, "Connection refreshed via API");
    Ok(Json(RefreshResponse {
        connection: connection.into(),
    }))
}

/// GET /api/oauth/providers
async fn list_providers(State(state): State<Arc<ApiState>>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        providers: state.manager.available_providers(),
    })
}

/// GET /api/feed/:merchant_id
async fn product_feed(
    State(state): State<Arc<ApiState>>,
    Path(merchant_id): Path<String>,
) -> Result<Json<ProductFeed>, AppError> {
    let feed = build_product_feed(&state.manager, &merchant_id).await?;
    Ok(Json(feed))
}
