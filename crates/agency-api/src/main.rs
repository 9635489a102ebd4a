//! # agency-api binary
//!
//! Storage: PostgreSQL when `DATABASE_URL` is set, in-memory otherwise.
//! Gateway: enabled when the `GATEWAY_*` variables are present.

use std::sync::Arc;

use agency_api::state::{AppConfig, AppState};
use agency_gateway::{GatewayClient, GatewayConfig};
use agency_store::{MemoryStore, PgStore, StoreHandle};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env();

    let store: StoreHandle = match PgStore::from_env().await.map_err(|e| {
        tracing::error!("database initialization failed: {e}");
        e
    })? {
        Some(pg) => Arc::new(pg),
        None => Arc::new(MemoryStore::new()),
    };
    tracing::info!(engine = store.engine(), "storage ready");

    let gateway = match GatewayConfig::from_env() {
        Ok(gateway_config) => {
            tracing::info!(?gateway_config, "payment gateway configured");
            Some(GatewayClient::new(gateway_config)?)
        }
        Err(e) => {
            tracing::warn!(
                "payment gateway not configured: {e}. Token and callback endpoints will return 503."
            );
            None
        }
    };

    let port = config.port;
    let app = agency_api::app(AppState::with_store(config, store, gateway))?;

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("agency API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
