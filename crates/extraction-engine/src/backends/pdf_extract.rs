use ::pdf_extract::extract_text_from_mem;
use shared_types::BackendKind;

use super::{count_form_feed_pages, BackendError, BackendOutput, TextBackend};

/// Layout-aware extraction through the `pdf-extract` crate.
///
/// Produces the best column alignment on the report PDFs, so it runs first.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractBackend;

impl TextBackend for PdfExtractBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::PdfExtract
    }

    fn extract(&self, bytes: &[u8]) -> Result<BackendOutput, BackendError> {
        let text = extract_text_from_mem(bytes).map_err(|e| {
            let message = e.to_string();
            let lowered = message.to_lowercase();

            if lowered.contains("encrypted") || lowered.contains("password") {
                BackendError::Encrypted
            } else if lowered.contains("invalid")
                || lowered.contains("malformed")
                || lowered.contains("corrupt")
            {
                BackendError::InvalidPdf(message)
            } else {
                BackendError::Failed(message)
            }
        })?;

        let page_count = count_form_feed_pages(&text);
        // Form feeds only separate pages; downstream parsing is line based
        let text = text.replace('\x0C', "\n");

        Ok(BackendOutput::new(text, page_count))
    }
}
