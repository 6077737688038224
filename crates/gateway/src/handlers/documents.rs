//! Document upload handlers

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::AppState;
use sahay_common::{
    document::{Document, DocumentUpload},
    errors::{AppError, Result},
};

/// Optional header carrying the uploaded file's name
pub const FILE_NAME_HEADER: &str = "x-file-name";

const ACCEPTED_CONTENT_TYPES: &[&str] = &["application/pdf", "application/octet-stream"];

/// Response after a document was processed
#[derive(Serialize)]
pub struct DocumentResponse {
    pub session_id: Uuid,
    pub document: Document,
}

/// Full extracted text of the session's document
#[derive(Serialize)]
pub struct DocumentTextResponse {
    pub digest: String,
    pub file_name: Option<String>,
    pub page_count: usize,
    pub text: String,
}

/// Upload a PDF; replaces the session's document and clears everything
/// derived from the previous one
pub async fn upload_document(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DocumentResponse>> {
    check_content_type(&headers)?;

    let limit = state.config.server.max_upload_bytes;
    if body.len() > limit {
        return Err(AppError::PayloadTooLarge {
            size: body.len(),
            limit,
        });
    }
    if body.is_empty() {
        return Err(AppError::Validation {
            message: "request body must contain a PDF".to_string(),
            field: Some("body".to_string()),
        });
    }

    let mut upload = DocumentUpload::new(body.to_vec());
    if let Some(name) = headers
        .get(FILE_NAME_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|name| !name.is_empty())
    {
        upload = upload.with_file_name(name);
    }

    let mut entry = state.sessions.begin_action(session_id, "document").await?;
    let document = state
        .controller
        .process_document(&mut entry.state, upload)
        .await?;

    tracing::info!(
        session_id = %session_id,
        pages = document.page_count,
        "Document loaded"
    );

    Ok(Json(DocumentResponse {
        session_id,
        document,
    }))
}

/// Get the full text of the session's document
pub async fn get_document(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<DocumentTextResponse>> {
    let session = state.sessions.get(session_id).await?;
    let entry = session.lock().await;

    let document = entry.state.document().ok_or(AppError::NoDocument)?;

    Ok(Json(DocumentTextResponse {
        digest: document.digest.clone(),
        file_name: document.file_name.clone(),
        page_count: document.page_count,
        text: document.text.clone(),
    }))
}

fn check_content_type(headers: &HeaderMap) -> Result<()> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if ACCEPTED_CONTENT_TYPES.contains(&media_type.as_str()) {
        Ok(())
    } else {
        Err(AppError::UnsupportedMediaType {
            content_type: content_type.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(content_type: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers
    }

    #[test]
    fn test_accepts_pdf_content_types() {
        assert!(check_content_type(&headers_with("application/pdf")).is_ok());
        assert!(check_content_type(&headers_with("Application/PDF; charset=binary")).is_ok());
        assert!(check_content_type(&headers_with("application/octet-stream")).is_ok());
    }

    #[test]
    fn test_rejects_other_content_types() {
        let err = check_content_type(&headers_with("text/plain")).unwrap_err();
        assert!(matches!(err, AppError::UnsupportedMediaType { .. }));
        assert!(check_content_type(&HeaderMap::new()).is_err());
    }
}
