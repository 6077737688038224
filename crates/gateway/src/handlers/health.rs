//! Health check handlers

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub backend: CheckResult,
    pub sessions: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: sahay_common::VERSION.to_string(),
    })
}

/// Readiness probe - ready while new sessions can still be opened
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let backend_check = CheckResult {
        status: "up".to_string(),
        detail: Some(state.controller.model_name().to_string()),
    };

    let active = state.sessions.len().await;
    let capacity = state.sessions.capacity();
    let sessions_check = CheckResult {
        status: if active < capacity { "up" } else { "full" }.to_string(),
        detail: Some(format!("{}/{}", active, capacity)),
    };

    let all_ready = sessions_check.status == "up";
    let status = if all_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            status: if all_ready { "ready" } else { "not_ready" }.to_string(),
            checks: HealthChecks {
                backend: backend_check,
                sessions: sessions_check,
            },
        }),
    )
}

/// Prometheus scrape endpoint
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
