//! Assistant and negotiation chat handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use super::TextRequest;
use crate::AppState;
use sahay_common::{
    errors::Result,
    session::{ChatKind, ChatSnapshot},
};

/// Reply plus the conversation as it now stands
#[derive(Serialize)]
pub struct ChatResponse {
    pub session_id: Uuid,
    pub chat: ChatKind,
    pub reply: String,
    pub conversation: ChatSnapshot,
}

/// Opened negotiation
#[derive(Serialize)]
pub struct ClauseResponse {
    pub session_id: Uuid,
    pub clause: String,
    pub conversation: ChatSnapshot,
}

/// Ask the assistant a question about the document
pub async fn ask_assistant(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<TextRequest>,
) -> Result<Json<ChatResponse>> {
    let question = request.validated()?;

    let mut entry = state.sessions.begin_action(session_id, "assistant").await?;
    let reply = state
        .controller
        .ask_assistant(&mut entry.state, &question)
        .await?;

    Ok(Json(ChatResponse {
        session_id,
        chat: ChatKind::Assistant,
        conversation: ChatSnapshot::from(entry.state.chat(ChatKind::Assistant)),
        reply,
    }))
}

/// Re-issue the assistant call for an unanswered question
pub async fn retry_assistant(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ChatResponse>> {
    retry(state, session_id, ChatKind::Assistant).await
}

/// Find the clause to negotiate over and open the negotiation chat
pub async fn find_clause(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ClauseResponse>> {
    let mut entry = state.sessions.begin_action(session_id, "negotiation").await?;
    let clause = state.controller.find_risky_clause(&mut entry.state).await?;

    Ok(Json(ClauseResponse {
        session_id,
        clause,
        conversation: ChatSnapshot::from(entry.state.chat(ChatKind::Negotiation)),
    }))
}

/// Reply to the negotiation counterpart
pub async fn negotiate(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<TextRequest>,
) -> Result<Json<ChatResponse>> {
    let utterance = request.validated()?;

    let mut entry = state.sessions.begin_action(session_id, "negotiation").await?;
    let reply = state
        .controller
        .negotiate(&mut entry.state, &utterance)
        .await?;

    Ok(Json(ChatResponse {
        session_id,
        chat: ChatKind::Negotiation,
        conversation: ChatSnapshot::from(entry.state.chat(ChatKind::Negotiation)),
        reply,
    }))
}

/// Re-issue the negotiation call for an unanswered reply
pub async fn retry_negotiation(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ChatResponse>> {
    retry(state, session_id, ChatKind::Negotiation).await
}

async fn retry(state: AppState, session_id: Uuid, kind: ChatKind) -> Result<Json<ChatResponse>> {
    let mut entry = state.sessions.begin_action(session_id, kind.as_str()).await?;
    let reply = state.controller.retry(&mut entry.state, kind).await?;

    tracing::debug!(session_id = %session_id, chat = kind.as_str(), "Retried chat reply");

    Ok(Json(ChatResponse {
        session_id,
        chat: kind,
        conversation: ChatSnapshot::from(entry.state.chat(kind)),
        reply,
    }))
}
