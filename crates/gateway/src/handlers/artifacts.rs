//! Summary and clause explanation handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use super::TextRequest;
use crate::AppState;
use sahay_common::{errors::Result, session::Artifact};

/// A freshly generated artifact
#[derive(Serialize)]
pub struct ArtifactResponse {
    pub session_id: Uuid,
    pub artifact: Artifact,
}

/// Explain a pasted clause in plain language
pub async fn explain(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<TextRequest>,
) -> Result<Json<ArtifactResponse>> {
    let snippet = request.validated()?;

    let mut entry = state.sessions.begin_action(session_id, "explanation").await?;
    let text = state.controller.explain(&mut entry.state, &snippet).await?;

    Ok(Json(ArtifactResponse {
        session_id,
        artifact: entry
            .state
            .explanation()
            .cloned()
            .unwrap_or_else(|| Artifact::new(text)),
    }))
}

/// Summarize the session's document
pub async fn summarize(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ArtifactResponse>> {
    let mut entry = state.sessions.begin_action(session_id, "summary").await?;
    let text = state.controller.summarize(&mut entry.state).await?;

    Ok(Json(ArtifactResponse {
        session_id,
        artifact: entry
            .state
            .summary()
            .cloned()
            .unwrap_or_else(|| Artifact::new(text)),
    }))
}
