mod config;
mod errors;
mod metrics;
mod model;
mod poller;
mod recorder;
mod render;
mod rest;
mod validate;

use axum::{http::StatusCode, routing::get, Router};
use config::Config;
use poller::DashboardState;
use recorder::Recorder;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();

    info!("Starting sensor dashboard");
    info!("Sensor URL: {}", config.sensor_url);
    info!("HTTP server: {}", config.http_addr);
    info!("CSV file: {}", config.csv_path.display());
    info!("Poll interval: {:?}", config.poll_interval);

    if let Err(e) = metrics::init_metrics() {
        error!("Failed to register metrics: {}", e);
        std::process::exit(1);
    }

    let recorder = match Recorder::open(&config.csv_path, config.persist_mode) {
        Ok(recorder) => recorder,
        Err(e) => {
            error!("Failed to load {}: {}", config.csv_path.display(), e);
            std::process::exit(1);
        }
    };
    let state = Arc::new(RwLock::new(DashboardState::new(recorder)));

    let client = match poller::build_client(config.request_timeout) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        }
    };

    // A pending refresh absorbs further clicks until the poller picks it up
    let (refresh_tx, refresh_rx) = mpsc::channel(1);

    let poller_state = state.clone();
    let sensor_url = config.sensor_url.clone();
    let poll_interval = config.poll_interval;
    let poller_handle = tokio::spawn(async move {
        poller::run_poller(client, sensor_url, poll_interval, poller_state, refresh_rx).await;
    });

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(rest::AppState {
            shared: state,
            refresh_tx,
            refresh_secs: config.poll_interval.as_secs(),
        }));

    let listener = tokio::net::TcpListener::bind(&config.http_addr)
        .await
        .unwrap_or_else(|e| {
            error!("Failed to bind to {}: {}", config.http_addr, e);
            std::process::exit(1);
        });

    info!("Dashboard listening on http://{}", config.http_addr);

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap_or_else(|e| {
            error!("HTTP server error: {}", e);
        });
    });

    tokio::select! {
        _ = poller_handle => {
            error!("Poller task terminated");
        }
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    metrics::gather_metrics().map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}
