//! Text-extraction backends
//!
//! Each backend is one strategy for pulling text out of PDF bytes. They are
//! tried in priority order by [`crate::ExtractionEngine`]:
//!
//! 1. [`PdfExtractBackend`] - layout-aware extraction via `pdf-extract`
//! 2. [`LopdfTextBackend`] - `lopdf` text extraction with font encodings
//! 3. [`ContentStreamBackend`] - raw walk over page content streams

mod content_stream;
mod lopdf_text;
mod pdf_extract;

pub use content_stream::ContentStreamBackend;
pub use lopdf_text::LopdfTextBackend;
pub use pdf_extract::PdfExtractBackend;

use shared_types::BackendKind;
use thiserror::Error;

/// Raw output of a single backend, before normalisation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOutput {
    pub text: String,
    pub page_count: usize,
    /// Per-page problems that did not stop the backend
    pub notes: Vec<String>,
}

impl BackendOutput {
    pub fn new(text: String, page_count: usize) -> Self {
        Self {
            text,
            page_count,
            notes: Vec::new(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Invalid PDF: {0}")]
    InvalidPdf(String),

    #[error("Password-protected PDF")]
    Encrypted,

    #[error("Document has no pages")]
    NoPages,

    #[error("{0}")]
    Failed(String),
}

/// One text-extraction strategy
pub trait TextBackend: Send + Sync {
    /// Which backend this is, reported in [`shared_types::ExtractionResult`]
    fn kind(&self) -> BackendKind;

    /// Extract text from the document bytes
    fn extract(&self, bytes: &[u8]) -> Result<BackendOutput, BackendError>;
}

/// The production chain, highest priority first
pub fn default_backends() -> Vec<Box<dyn TextBackend>> {
    vec![
        Box::new(PdfExtractBackend),
        Box::new(LopdfTextBackend),
        Box::new(ContentStreamBackend),
    ]
}

/// Count pages in text that uses form feeds as page separators
pub(crate) fn count_form_feed_pages(text: &str) -> usize {
    let pages = text
        .split('\x0C')
        .filter(|page| !page.trim().is_empty())
        .count();
    pages.max(1)
}

/// Map lopdf load failures onto backend errors
pub(crate) fn load_document(bytes: &[u8]) -> Result<lopdf::Document, BackendError> {
    let doc =
        lopdf::Document::load_mem(bytes).map_err(|e| BackendError::InvalidPdf(e.to_string()))?;
    if doc.is_encrypted() {
        return Err(BackendError::Encrypted);
    }
    Ok(doc)
}
