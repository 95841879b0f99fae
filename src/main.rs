use anyhow::{Context, Result};
use eventhub::api::{create_router, AppState};
use eventhub::config::{load_config, AppConfig};
use eventhub::store::Store;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "eventhub=info,tower_http=info".into()),
        )
        .init();

    info!("eventhub starting...");

    let config_path =
        std::env::var("EVENTHUB_CONFIG").unwrap_or_else(|_| "eventhub.toml".to_string());
    let mut config = if Path::new(&config_path).exists() {
        load_config(&config_path)
            .with_context(|| format!("Failed to load config from {}", config_path))?
    } else {
        warn!(path = %config_path, "Config file not found, using defaults");
        AppConfig::default()
    };
    config.apply_env();

    let addr = config
        .server
        .bind_addr()
        .context("Invalid server host/port")?;

    info!(
        database = %config.database.path,
        code_max_attempts = config.events.code_max_attempts,
        enforce_host_identity = config.api.enforce_host_identity,
        "Configuration loaded"
    );

    let store = Arc::new(
        Store::new(&config.database.path).context("Failed to initialize entity store")?,
    );
    info!("Entity store initialized");

    let router = create_router(AppState::from_config(store, &config));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "HTTP API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("eventhub stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl_c signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
