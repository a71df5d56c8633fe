mod telemetry;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use clap::Parser;
use rand::Rng;
use std::sync::{Arc, Mutex};
use telemetry::Bme680;
use tracing::{debug, error, info, warn};

/// HTTP stand-in for the ESP32 sensor node
#[derive(Debug, Parser)]
#[command(name = "simulator", version)]
struct Args {
    /// Address to serve readings on
    #[arg(long, env = "SIM_ADDR", default_value = "0.0.0.0:8081")]
    addr: String,

    /// Share of requests answered with HTTP 500
    #[arg(long, env = "SIM_FAILURE_RATE", default_value_t = 0.0)]
    failure_rate: f64,
}

#[derive(Clone)]
struct SimState {
    sensor: Arc<Mutex<Bme680>>,
    failure_rate: f64,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    let failure_rate = if args.failure_rate.is_finite() {
        args.failure_rate.clamp(0.0, 1.0)
    } else {
        0.0
    };
    if failure_rate != args.failure_rate {
        warn!("Failure rate {} clamped to {}", args.failure_rate, failure_rate);
    }

    info!("Starting sensor simulator");
    info!("Serving on {}, failure rate {:.0}%", args.addr, failure_rate * 100.0);

    let state = SimState {
        sensor: Arc::new(Mutex::new(Bme680::default())),
        failure_rate,
    };
    let app = Router::new().route("/", get(reading)).with_state(state);

    let listener = match tokio::net::TcpListener::bind(&args.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", args.addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app).await {
        error!("HTTP server error: {}", e);
    }
}

async fn reading(State(state): State<SimState>) -> Response {
    let mut rng = rand::thread_rng();

    if rng.gen_bool(state.failure_rate) {
        warn!("Simulating sensor failure");
        return (StatusCode::INTERNAL_SERVER_ERROR, "sensor read failed").into_response();
    }

    let telemetry = state
        .sensor
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .sample(&mut rng);
    debug!(
        "Serving {:.2} °C, {:.2} hPa, {:.2} ppm, {:.2} %",
        telemetry.temperature, telemetry.pressure, telemetry.gas, telemetry.humidity
    );

    Json(telemetry).into_response()
}
