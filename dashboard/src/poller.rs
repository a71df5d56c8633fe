use crate::errors::{Error, Result};
use crate::metrics::{POLLS_TOTAL, POLL_FAILURES_TOTAL, POLL_LATENCY_SECONDS};
use crate::model::{Reading, SensorPayload};
use crate::recorder::Recorder;
use crate::validate::validate;
use chrono::{DateTime, Local};
use reqwest::{Client, StatusCode};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// State shared between the poller (only writer) and the web server
#[derive(Debug)]
pub struct DashboardState {
    pub recorder: Recorder,
    /// Warning from the most recent tick, cleared by the next success
    pub last_error: Option<String>,
    pub last_poll: Option<DateTime<Local>>,
}

impl DashboardState {
    pub fn new(recorder: Recorder) -> Self {
        Self {
            recorder,
            last_error: None,
            last_poll: None,
        }
    }
}

pub type SharedState = Arc<RwLock<DashboardState>>;

pub fn build_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Fetches one reading from the sensor. Anything but HTTP 200 with a
/// valid JSON body is an error.
pub async fn fetch_reading(client: &Client, url: &str) -> Result<Reading> {
    let response = client.get(url).send().await?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(Error::Status(status.as_u16()));
    }

    let body = response.bytes().await?;
    let payload = serde_json::from_slice::<SensorPayload>(&body)?;
    validate(&payload)?;

    Ok(Reading::from_payload(payload, Local::now()))
}

/// One poll tick: fetch, then record. Returns whether a row was added.
///
/// The poller is the only writer, so the file write runs on the blocking
/// pool without the state lock and the row is committed afterwards.
pub async fn poll_once(client: &Client, url: &str, state: &SharedState) -> bool {
    POLLS_TOTAL.inc();

    let start = Instant::now();
    let fetched = fetch_reading(client, url).await;
    POLL_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());

    let reading = match fetched {
        Ok(reading) => reading,
        Err(e) => {
            POLL_FAILURES_TOTAL.inc();
            warn!("Error fetching live readings: {}", e);
            let mut guard = state.write().await;
            guard.last_poll = Some(Local::now());
            guard.last_error = Some(format!("Error fetching live readings: {}", e));
            return false;
        }
    };

    debug!(
        "Reading {}: {:.2} °C, {:.2} hPa, {:.2} ppm, {:.2} %",
        reading.timestamp, reading.temperature, reading.pressure, reading.gas, reading.humidity
    );

    let pending = state.read().await.recorder.prepare(&reading);
    let written = tokio::task::spawn_blocking(move || pending.write())
        .await
        .unwrap_or_else(|e| Err(Error::Io(io::Error::new(io::ErrorKind::Other, e))));

    let mut guard = state.write().await;
    guard.last_poll = Some(Local::now());
    match guard.recorder.finish(reading, written) {
        Ok(()) => {
            guard.last_error = None;
            true
        }
        Err(e) => {
            guard.last_error = Some(format!("Error saving live readings: {}", e));
            false
        }
    }
}

/// Polls on a fixed interval until the refresh channel closes.
/// Every message on `refresh_rx` triggers an extra tick right away.
pub async fn run_poller(
    client: Client,
    url: String,
    period: Duration,
    state: SharedState,
    mut refresh_rx: mpsc::Receiver<()>,
) {
    info!("Starting poller for {} every {:?}", url, period);

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                poll_once(&client, &url, &state).await;
            }

            request = refresh_rx.recv() => {
                match request {
                    Some(()) => {
                        debug!("Manual refresh requested");
                        poll_once(&client, &url, &state).await;
                        ticker.reset();
                    }
                    None => {
                        info!("Refresh channel closed");
                        break;
                    }
                }
            }
        }
    }

    info!("Poller stopped");
}
