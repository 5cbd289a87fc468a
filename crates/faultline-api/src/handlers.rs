//! HTTP request handlers.
//!
//! The analyze endpoint implements the wire contract of the analyzer:
//! a batch of alarm events and an optional window id in, the analysis
//! result out. Empty batches are a 400, oracle and sink failures a 500,
//! always as `{ "error": <reason> }` with a single terse reason string.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};
use uuid::Uuid;

use faultline_core::model::{AlarmEvent, AnalysisResult};
use faultline_core::Error;

use crate::ApiState;

/// Request to analyze one alarm batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    /// Window identity; blank gets an `auto-<unix_seconds>` id
    #[serde(default)]
    pub window_id: String,
    #[serde(default)]
    pub events: Vec<AlarmEvent>,
}

/// Response carrying the effective window id and the analysis result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub window_id: String,
    pub result: AnalysisResult,
}

/// Error body shared by all failure responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Default a blank window id deterministically from the wall clock
pub(crate) fn effective_window_id(window_id: &str) -> String {
    let trimmed = window_id.trim();
    if trimmed.is_empty() {
        format!("auto-{}", Utc::now().timestamp())
    } else {
        trimmed.to_string()
    }
}

/// POST /api/v1/rca/analyze
#[instrument(skip(state, request), fields(request_id = %Uuid::new_v4()))]
pub async fn analyze(
    State(state): State<Arc<ApiState>>,
    Json(request): Json<AnalyzeRequest>,
) -> impl IntoResponse {
    if request.events.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "events payload is empty" })),
        )
            .into_response();
    }

    let window_id = effective_window_id(&request.window_id);
    info!(
        window_id = %window_id,
        events = request.events.len(),
        "analyze request accepted"
    );

    let cancel = CancellationToken::new();
    match state
        .analyzer
        .analyze(&window_id, &request.events, &cancel)
        .await
    {
        Ok(result) => {
            metrics::counter!("faultline_analyses_total").increment(1);
            (
                StatusCode::OK,
                Json(AnalyzeResponse { window_id, result }),
            )
                .into_response()
        }
        Err(err @ Error::EmptyBatch) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: err.to_string(),
            }),
        )
            .into_response(),
        Err(err) => {
            error!(window_id = %window_id, error = %err, "analysis failed");
            metrics::counter!("faultline_analysis_failures_total").increment(1);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: err.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// GET /api/v1/rca/config
#[instrument(skip(state))]
pub async fn rca_config(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "analyzer": state.analyzer.config(),
            "prompt": state.analyzer.prompt_options(),
        })),
    )
}

/// GET /api/v1/rca/stats
#[instrument(skip(state))]
pub async fn rca_stats(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let stats = state.analyzer.stats().await;
    (StatusCode::OK, Json(stats))
}

/// GET /health
pub async fn health(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "version": state.version,
        })),
    )
}

/// GET /health/live
pub async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "alive" })))
}

/// GET /health/ready
pub async fn readiness(State(_state): State<Arc<ApiState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ready" })))
}
