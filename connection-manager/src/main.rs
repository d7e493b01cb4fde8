use anyhow::{Context, Result};
use chrono::Duration as ChronoDuration;
use connection_manager::api::{create_router, ApiState};
use connection_manager::providers::build_http_client;
use connection_manager::{ConnectionManager, ProviderRegistry};
use merchant_connect::config::AppConfig;
use merchant_connect::connections::SqliteConnectionStore;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "connection_manager=info,merchant_connect=info".into()),
        )
        .init();

    info!("Connection Manager starting...");

    let config = AppConfig::load().context("Failed to load configuration")?;

    let encryption_key = std::env::var("ACP_ENCRYPTION_KEY")
        .context("ACP_ENCRYPTION_KEY is required (base64-encoded 32-byte key)")?;

    info!(
        bind_addr = %config.server.bind_addr,
        port = config.server.port,
        base_url = %config.server.base_url,
        database_path = %config.storage.database_path,
        "Configuration loaded"
    );

    let store = Arc::new(
        SqliteConnectionStore::new(&config.storage.database_path, &encryption_key)
            .context("Failed to initialize connection store")?,
    );
    info!("Connection store initialized");

    let http = build_http_client(Duration::from_secs(config.oauth.http_timeout_seconds))?;
    let registry = ProviderRegistry::from_config(&config, http);
    if registry.is_empty() {
        warn!("No OAuth providers configured; every connect request will be rejected");
    }

    let manager = Arc::new(
        ConnectionManager::new(registry, store)
            .with_state_ttl(ChronoDuration::seconds(config.oauth.state_ttl_seconds)),
    );

    let mut router = create_router(ApiState {
        manager,
        dashboard_url: config.server.dashboard_url.clone(),
    });
    if config.server.cors_enabled {
        router = router.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", config.server.bind_addr, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(addr = %addr, "Connection API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "Connection API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    info!("Connection manager stopped");

    Ok(())
}
