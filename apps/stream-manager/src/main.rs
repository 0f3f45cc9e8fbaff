//! Stream Manager Binary
//!
//! Starts the subscription manager against a stream backend.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin stream-manager
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `STREAM_BACKEND_URL`: Base URL of the stream backend
//!
//! ## Optional
//! - `STREAM_MANAGER_STATE_PATH`: Persisted state file (default: stream-manager-state.json)
//! - `STREAM_MANAGER_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `STREAM_MANAGER_REQUEST_TIMEOUT_MS`: Backend request timeout (default: 10000)
//! - `STREAM_MANAGER_STATUS_POLL_MS`: Status poll interval (default: 5000)
//! - `STREAM_MANAGER_RECONCILE_INTERVAL_SECS`: Reconcile period, 0 disables (default: 0)
//! - `STREAM_MANAGER_RECONNECT_DELAY_INITIAL_MS`: First auto-reconnect delay (default: 1000)
//! - `STREAM_MANAGER_RECONNECT_DELAY_MAX_SECS`: Auto-reconnect delay cap (default: 60)
//! - `STREAM_MANAGER_RECONNECT_DELAY_MULTIPLIER`: Backoff growth factor (default: 2.0)
//! - `STREAM_MANAGER_MAX_RECONNECT_ATTEMPTS`: 0 = unlimited (default: 0)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: stream-manager)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use stream_manager::infrastructure::health::{HealthServer, HealthServerState};
use stream_manager::infrastructure::telemetry;
use stream_manager::{
    FileKeyValueStore, HttpStreamBackend, KeyValueStore, ManagerConfig, StreamBackend,
    StreamManager, init_metrics, polling_status_feed,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Stream Manager");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = ManagerConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let store: Arc<dyn KeyValueStore> = Arc::new(
        FileKeyValueStore::open(&config.state_path).context("failed to open state file")?,
    );
    let backend: Arc<dyn StreamBackend> = Arc::new(
        HttpStreamBackend::new(&config.backend.http()).context("failed to build backend client")?,
    );

    let manager = Arc::new(StreamManager::new(
        Arc::clone(&backend),
        store,
        config.manager_settings(),
    ));

    let feed = polling_status_feed(backend, config.backend.status_poll_interval);
    manager.init(feed).await;

    // Spawn health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&manager),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    let health_task = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!("Stream manager ready");

    await_shutdown(shutdown_token).await;

    manager.shutdown().await;
    if let Err(e) = health_task.await {
        tracing::warn!(error = %e, "Health server task failed");
    }

    tracing::info!("Stream manager stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &ManagerConfig) {
    tracing::info!(
        backend_url = %config.backend.url,
        state_path = %config.state_path.display(),
        health_port = config.server.health_port,
        status_poll_ms = u64::try_from(config.backend.status_poll_interval.as_millis()).unwrap_or(u64::MAX),
        reconcile_secs = config.reconcile_interval.map(|d| d.as_secs()),
        "Configuration loaded"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
