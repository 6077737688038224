//! Ingestion error types

use sahay_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("file is not a PDF")]
    NotPdf,

    #[error("PDF is encrypted")]
    Encrypted,

    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),

    #[error("no text content extracted from {page_count} page(s)")]
    NoText { page_count: usize },
}

impl From<IngestionError> for AppError {
    fn from(e: IngestionError) -> Self {
        AppError::Extraction {
            message: e.to_string(),
        }
    }
}
