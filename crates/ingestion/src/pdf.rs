//! PDF text extraction module
//!
//! Extracts text content from uploaded PDF bytes using lopdf.

use crate::errors::IngestionError;
use lopdf::content::Content;
use lopdf::Object;
use regex_lite::Regex;
use sahay_common::document::{ExtractedText, TextExtractor};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// How far into the upload the `%PDF-` header may appear
const HEADER_SEARCH_WINDOW: usize = 1024;

/// [`TextExtractor`] backed by lopdf
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, bytes: &[u8]) -> sahay_common::Result<ExtractedText> {
        Ok(extract_text_from_pdf(bytes)?)
    }

    fn name(&self) -> &str {
        "lopdf"
    }
}

/// Extract text content from PDF bytes
pub fn extract_text_from_pdf(bytes: &[u8]) -> Result<ExtractedText, IngestionError> {
    if !has_pdf_header(bytes) {
        return Err(IngestionError::NotPdf);
    }

    let doc = lopdf::Document::load_mem(bytes)?;
    if doc.is_encrypted() {
        return Err(IngestionError::Encrypted);
    }

    let pages = doc.get_pages();
    let page_count = pages.len();

    debug!(page_count, "Extracting text from PDF");

    let mut text = String::new();
    let mut skipped_pages = Vec::new();

    for (&page_num, &page_id) in pages.iter() {
        let page_text = match doc.extract_text(&[page_num]) {
            Ok(page_text) if !page_text.trim().is_empty() => page_text,
            Ok(_) => scan_page_operators(&doc, page_id),
            Err(e) => {
                debug!(page = page_num, error = %e, "lopdf text decoding failed, scanning operators");
                scan_page_operators(&doc, page_id)
            }
        };

        if page_text.trim().is_empty() {
            warn!(page = page_num, "No text on page, skipping");
            skipped_pages.push(page_num);
            continue;
        }

        text.push_str(&page_text);
        text.push('\n');
    }

    let cleaned = clean_text(&text);
    if cleaned.is_empty() {
        return Err(IngestionError::NoText { page_count });
    }

    debug!(
        original_len = text.len(),
        cleaned_len = cleaned.len(),
        skipped = skipped_pages.len(),
        "Text extraction complete"
    );

    Ok(ExtractedText {
        text: cleaned,
        page_count,
        skipped_pages,
    })
}

fn has_pdf_header(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(HEADER_SEARCH_WINDOW)];
    window.windows(5).any(|w| w == b"%PDF-")
}

/// Fallback: pull string operands out of the page's text-showing operators
fn scan_page_operators(doc: &lopdf::Document, page_id: lopdf::ObjectId) -> String {
    let content = match doc
        .get_page_content(page_id)
        .and_then(|data| Content::decode(&data))
    {
        Ok(content) => content,
        Err(e) => {
            debug!(error = %e, "Could not decode page content stream");
            return String::new();
        }
    };

    let mut text = String::new();
    for operation in &content.operations {
        match operation.operator.as_str() {
            "Tj" | "'" | "\"" => {
                if let Some(Object::String(bytes, _)) = operation.operands.last() {
                    text.push_str(&decode_pdf_string(bytes));
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operation.operands.first() {
                    for item in items {
                        if let Object::String(bytes, _) = item {
                            text.push_str(&decode_pdf_string(bytes));
                        }
                    }
                }
            }
            "ET" | "T*" => text.push('\n'),
            _ => {}
        }
    }

    text
}

/// Decode a PDF string operand: UTF-16BE when it carries a BOM, Latin-1 otherwise
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }

    bytes.iter().map(|&b| b as char).collect()
}

fn inline_whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t\x{A0}\x{FEFF}]+").expect("valid whitespace pattern"))
}

fn blank_line_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").expect("valid blank line pattern"))
}

/// Clean extracted text: collapse spacing within lines, keep paragraph breaks
fn clean_text(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");

    let lines: Vec<String> = normalized
        .lines()
        .map(|line| inline_whitespace().replace_all(line, " ").trim().to_string())
        .collect();

    blank_line_runs()
        .replace_all(lines.join("\n").trim(), "\n\n")
        .into_owned()
}
