use shared_types::BackendKind;
use tracing::debug;

use super::{load_document, BackendError, BackendOutput, TextBackend};

/// Page-by-page extraction with `lopdf`, decoding strings through each
/// page's font encodings.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfTextBackend;

impl TextBackend for LopdfTextBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::LopdfText
    }

    fn extract(&self, bytes: &[u8]) -> Result<BackendOutput, BackendError> {
        let doc = load_document(bytes)?;
        let pages = doc.get_pages();
        if pages.is_empty() {
            return Err(BackendError::NoPages);
        }

        let mut texts = Vec::with_capacity(pages.len());
        let mut notes = Vec::new();

        for page_number in pages.keys() {
            match doc.extract_text(&[*page_number]) {
                Ok(text) => texts.push(text),
                Err(e) => {
                    debug!(page = page_number, error = %e, "lopdf could not read page");
                    notes.push(format!("page {}: {}", page_number, e));
                }
            }
        }

        if texts.is_empty() {
            return Err(BackendError::Failed(format!(
                "no readable pages ({})",
                notes.join("; ")
            )));
        }

        Ok(BackendOutput {
            text: texts.join("\n"),
            page_count: pages.len(),
            notes,
        })
    }
}
