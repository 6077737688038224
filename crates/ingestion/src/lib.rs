//! Sahay Ingestion
//!
//! Turns uploaded PDF bytes into the plain text the session engine works on.
//! Plugs into the engine through [`sahay_common::TextExtractor`].

pub mod errors;
pub mod pdf;

pub use errors::IngestionError;
pub use pdf::{extract_text_from_pdf, PdfTextExtractor};
