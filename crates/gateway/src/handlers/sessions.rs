//! Session management handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::AppState;
use sahay_common::{errors::Result, session::SessionSnapshot};

/// Create session response
#[derive(Serialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
    pub created_at: String,
    pub idle_timeout_secs: u64,
}

/// Session state response
#[derive(Serialize)]
pub struct SessionResponse {
    pub session_id: Uuid,
    pub created_at: String,
    pub last_active_at: String,
    pub state: SessionSnapshot,
}

/// Create a new session
pub async fn create_session(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<CreateSessionResponse>)> {
    let (session_id, created_at) = state.sessions.create().await?;

    tracing::info!(session_id = %session_id, "Session created");

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id,
            created_at: created_at.to_rfc3339(),
            idle_timeout_secs: state.sessions.idle_timeout().as_secs(),
        }),
    ))
}

/// Get session state; waits for a pending action to finish
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionResponse>> {
    let session = state.sessions.get(session_id).await?;
    let entry = session.lock().await;

    Ok(Json(SessionResponse {
        session_id,
        created_at: entry.created_at.to_rfc3339(),
        last_active_at: entry.last_active_at.to_rfc3339(),
        state: entry.state.snapshot(),
    }))
}

/// End a session and drop everything it holds
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.sessions.remove(session_id).await?;

    tracing::info!(session_id = %session_id, "Session closed");

    Ok(StatusCode::NO_CONTENT)
}
