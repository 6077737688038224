//! Document model and the text extraction seam
//!
//! The engine never parses PDFs itself. It consumes any [`TextExtractor`]
//! and keeps the resulting text plus a little provenance metadata.

use crate::errors::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Trait for turning an uploaded file into plain text
pub trait TextExtractor: Send + Sync {
    /// Extract UTF-8 text from the raw bytes of an upload
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedText>;

    /// Short name used in logs
    fn name(&self) -> &str;
}

/// Output of a successful extraction
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: usize,
    /// Pages that yielded no text and were skipped
    pub skipped_pages: Vec<u32>,
}

/// A file submitted for processing
#[derive(Debug, Clone)]
pub struct DocumentUpload {
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
}

impl DocumentUpload {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Hex SHA-256 of the uploaded bytes
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        hex::encode(hasher.finalize())
    }
}

/// The document currently loaded in a session
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    #[serde(skip)]
    pub text: String,
    pub digest: String,
    pub page_count: usize,
    pub byte_len: usize,
    pub char_count: usize,
    pub file_name: Option<String>,
    pub loaded_at: DateTime<Utc>,
}

impl Document {
    pub fn from_extraction(upload: &DocumentUpload, extracted: ExtractedText) -> Self {
        Self {
            char_count: extracted.text.chars().count(),
            text: extracted.text,
            digest: upload.digest(),
            page_count: extracted.page_count,
            byte_len: upload.bytes.len(),
            file_name: upload.file_name.clone(),
            loaded_at: Utc::now(),
        }
    }
}
