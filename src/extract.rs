//! Text-extraction seam.
//!
//! Real PDF parsing belongs to an external collaborator; the core only
//! consumes extracted text plus metadata. The built-in extractor accepts
//! UTF-8 payloads (with form-feed page breaks) so the upload path works
//! end to end, and tests substitute their own.

use async_trait::async_trait;
use thiserror::Error;

/// Output of the extraction collaborator.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: i32,
    pub char_count: i64,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    /// Payload is not something this extractor understands.
    #[error("unsupported upload: {0}")]
    Unsupported(String),
}

/// Turns uploaded bytes into extracted text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, file_name: &str, bytes: &[u8]) -> Result<ExtractedText, ExtractError>;
}

/// UTF-8 passthrough extractor. Pages are delimited by form feeds; a
/// payload with none counts as a single page.
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, file_name: &str, bytes: &[u8]) -> Result<ExtractedText, ExtractError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| {
                ExtractError::Unsupported(format!(
                    "'{file_name}' is not UTF-8 text; run it through the PDF extraction service"
                ))
            })?
            .to_string();

        let page_count = text.matches('\u{0C}').count() as i32 + 1;
        let char_count = text.chars().count() as i64;

        Ok(ExtractedText {
            text,
            page_count,
            char_count,
        })
    }
}
