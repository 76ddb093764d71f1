//! JSON-over-HTTP surface.
//!
//! `POST /predict` takes a request envelope and answers with the response
//! envelope; `POST /feedback` takes a feedback envelope and answers with an
//! empty ack; `GET /ready` reports the readiness monitor's verdict for
//! orchestration probes. The `x-deployment` header selects the deployment;
//! without it the default identity is used.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tracing::info;

use crate::envelope::{FeedbackEnvelope, RequestEnvelope, ResponseEnvelope};
use crate::errors::EngineError;
use crate::resolver::DEFAULT_IDENTITY;

use super::AppState;

/// Header selecting the deployment to execute against.
pub const DEPLOYMENT_HEADER: &str = "x-deployment";

/// Build the API router over shared state.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/feedback", post(feedback))
        .route("/ready", get(ready))
        .with_state(state)
}

/// Serve the router until the listener fails.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "http surface listening");
    }
    axum::serve(listener, router(state)).await
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let body = self.to_body();
        let status =
            StatusCode::from_u16(body.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

async fn predict(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<ResponseEnvelope>, EngineError> {
    let envelope: RequestEnvelope = parse_body(&body)?;
    let tree = state.resolver.resolve(identity(&headers)).await?;
    let response = state.engine.execute(&tree, envelope).await?;
    Ok(Json(response))
}

async fn feedback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, EngineError> {
    let envelope: FeedbackEnvelope = parse_body(&body)?;
    let tree = state.resolver.resolve(identity(&headers)).await?;
    state.engine.send_feedback(&tree, envelope).await?;
    Ok(Json(json!({})))
}

async fn ready(State(state): State<AppState>) -> Response {
    let report = state.readiness.report();
    let status = if report.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report)).into_response()
}

/// Parse an envelope body ourselves so malformed input maps to the
/// taxonomy's `InvalidRequest` instead of a framework rejection.
fn parse_body<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, EngineError> {
    serde_json::from_str(body).map_err(|e| EngineError::InvalidRequest(e.to_string()))
}

fn identity(headers: &HeaderMap) -> &str {
    headers
        .get(DEPLOYMENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_IDENTITY)
}
