//! HTTP server bootstrap for the wallet auth gateway.
//!
//! This module wires together:
//! - configuration
//! - telemetry
//! - the shared [`WalletAuthGateway`]
//! - the Axum router

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::{GatewayConfig, WalletAuthGateway};
use crate::telemetry::{init_telemetry, shutdown_telemetry, TelemetryConfig};

/// Default per-wallet request budget per minute.
pub const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 60;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server listen address.
    pub listen_addr: SocketAddr,
    /// `AUTH_MODE=disabled` lets protected routes through without credentials.
    pub require_auth: bool,
    /// Per-wallet budget for protected routes.
    pub rate_limit_per_minute: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid listen address {host}:{port}: {e}"))?;

        let auth_mode = std::env::var("AUTH_MODE").unwrap_or_else(|_| "required".to_string());

        let rate_limit_per_minute = std::env::var("RATE_LIMIT_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_RATE_LIMIT_PER_MINUTE);

        Ok(Self {
            listen_addr,
            require_auth: auth_mode.trim() != "disabled",
            rate_limit_per_minute,
        })
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<WalletAuthGateway>,
    pub require_auth: bool,
    pub rate_limit_per_minute: u32,
}

impl AppState {
    pub fn new(gateway: Arc<WalletAuthGateway>) -> Self {
        Self {
            gateway,
            require_auth: true,
            rate_limit_per_minute: DEFAULT_RATE_LIMIT_PER_MINUTE,
        }
    }
}

/// Start the HTTP server.
pub async fn run() -> anyhow::Result<()> {
    init_telemetry(&TelemetryConfig::from_env())
        .map_err(|e| anyhow::anyhow!("failed to initialise telemetry: {e}"))?;

    info!("Starting Wallet Auth Gateway v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    let gateway_config = GatewayConfig::from_env();

    info!("Configuration loaded");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Rate limit: {}/min per wallet", config.rate_limit_per_minute);
    info!(
        "  Signature window: {}ms (domain {:?})",
        gateway_config.signature_max_age_ms, gateway_config.challenge_domain
    );

    if !config.require_auth {
        warn!("AUTH_MODE=disabled; protected routes accept unauthenticated requests");
    }
    if gateway_config.jwt_secret.is_none() {
        info!("JWT_SECRET not set; bearer tokens are rejected, signature auth only");
    }

    let gateway = Arc::new(
        WalletAuthGateway::from_config(&gateway_config)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?,
    );

    let state = AppState {
        gateway,
        require_auth: config.require_auth,
        rate_limit_per_minute: config.rate_limit_per_minute,
    };

    let app = build_router(state);

    info!("Starting HTTP server on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    info!("Wallet Auth Gateway is ready to accept connections");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_telemetry();
    Ok(())
}

/// Build the full application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .nest("/api", crate::api::router(&state))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Health check endpoint.
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "service": "wallet-auth-gateway",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
