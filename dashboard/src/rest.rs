use crate::model::{Quantity, ReadingsResponse, TIMESTAMP_FORMAT};
use crate::poller::SharedState;
use crate::render::{render_dashboard, DashboardView};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};

#[derive(Debug, Clone)]
pub struct AppState {
    pub shared: SharedState,
    pub refresh_tx: mpsc::Sender<()>,
    pub refresh_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    quantity: Option<Quantity>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/refresh", post(refresh))
        .route("/download", get(download_csv))
        .route("/api/v1/readings", get(get_readings))
        .with_state(state)
}

async fn dashboard(
    State(state): State<AppState>,
    Query(params): Query<DashboardQuery>,
) -> Html<String> {
    let guard = state.shared.read().await;
    let view = DashboardView {
        readings: guard.recorder.readings(),
        quantity: params.quantity.unwrap_or_default(),
        last_error: guard.last_error.as_deref(),
        refresh_secs: state.refresh_secs,
    };
    Html(render_dashboard(&view))
}

async fn refresh(
    State(state): State<AppState>,
    Query(params): Query<DashboardQuery>,
) -> Redirect {
    match state.refresh_tx.try_send(()) {
        Ok(()) => debug!("Refresh queued"),
        Err(TrySendError::Full(())) => debug!("Refresh already pending"),
        Err(TrySendError::Closed(())) => warn!("Poller is not running, refresh ignored"),
    }

    let quantity = params.quantity.unwrap_or_default();
    Redirect::to(&format!("/?quantity={}", quantity))
}

async fn download_csv(State(state): State<AppState>) -> Result<Response, AppError> {
    let body = state.shared.read().await.recorder.to_csv()?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"live_sensor_readings.csv\"",
            ),
        ],
        body,
    )
        .into_response())
}

async fn get_readings(State(state): State<AppState>) -> Json<ReadingsResponse> {
    let guard = state.shared.read().await;
    let data = guard.recorder.readings().to_vec();

    Json(ReadingsResponse {
        total: data.len(),
        latest: guard.recorder.latest().cloned(),
        last_error: guard.last_error.clone(),
        last_poll: guard.last_poll.map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
        data,
    })
}

struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("API error: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Internal server error: {}", self.0),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
