//! # rsm-api — Binary Entry Point
//!
//! Starts the Axum HTTP server. Configuration comes from the environment
//! (see `config.rs`); without `DATABASE_URL` the service runs in memory.

use metrics_exporter_prometheus::PrometheusBuilder;
use rsm_api::config::{AppConfig, LogFormat};
use rsm_api::state::AppState;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    let db_pool = match &config.database_url {
        Some(url) => {
            let pool = rsm_api::db::init_pool(url).await.map_err(|e| {
                tracing::error!("database initialization failed: {e}");
                e
            })?;
            tracing::info!("database connected, migrations applied");
            Some(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; records are kept in memory only");
            None
        }
    };

    let port = config.port;
    let mut state = AppState::with_config(config, db_pool);
    if state.config.metrics_enabled {
        let handle = PrometheusBuilder::new().install_recorder()?;
        state = state.with_metrics(handle);
    }

    state.hydrate_from_db().await.map_err(|e| {
        tracing::error!("database hydration failed: {e}");
        e
    })?;

    let app = rsm_api::app(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("RSM API listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
