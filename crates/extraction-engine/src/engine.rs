use std::panic::{catch_unwind, AssertUnwindSafe};

use shared_types::{ExtractionResult, RawDocument};
use tracing::{debug, info, warn};

use crate::backends::{default_backends, BackendError, TextBackend};
use crate::normalize::{meaningful_len, normalize_text};
use crate::ExtractionError;

/// Trimmed character count below which a backend's output is considered empty
pub const DEFAULT_MIN_CHARS: usize = 50;

/// Ordered fallback over text backends.
///
/// Backends run strictly in order and the first adequate result wins; later
/// backends are never invoked once one succeeds.
pub struct ExtractionEngine {
    backends: Vec<Box<dyn TextBackend>>,
    min_chars: usize,
}

impl Default for ExtractionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtractionEngine {
    pub fn new() -> Self {
        Self::with_backends(default_backends())
    }

    pub fn with_backends(backends: Vec<Box<dyn TextBackend>>) -> Self {
        Self {
            backends,
            min_chars: DEFAULT_MIN_CHARS,
        }
    }

    pub fn with_min_chars(mut self, min_chars: usize) -> Self {
        self.min_chars = min_chars;
        self
    }

    pub fn min_chars(&self) -> usize {
        self.min_chars
    }

    pub fn backend_kinds(&self) -> Vec<shared_types::BackendKind> {
        self.backends.iter().map(|b| b.kind()).collect()
    }

    pub fn extract_document(&self, document: &RawDocument) -> Result<ExtractionResult, ExtractionError> {
        self.extract(document.bytes())
    }

    /// Run the chain over `bytes`.
    ///
    /// Every failed or inadequate attempt leaves a warning naming the backend.
    /// Those warnings travel with the successful result, or with the error when
    /// nothing produced enough text.
    pub fn extract(&self, bytes: &[u8]) -> Result<ExtractionResult, ExtractionError> {
        if self.backends.is_empty() {
            return Err(ExtractionError::NoBackends);
        }

        let mut warnings = Vec::new();

        for backend in &self.backends {
            let kind = backend.kind();
            debug!(backend = %kind, bytes = bytes.len(), "trying extraction backend");

            let attempt = catch_unwind(AssertUnwindSafe(|| backend.extract(bytes)))
                .unwrap_or_else(|payload| Err(BackendError::Failed(panic_message(payload))));

            let output = match attempt {
                Ok(output) => output,
                Err(e) => {
                    warn!(backend = %kind, error = %e, "extraction backend failed");
                    warnings.push(format!("{}: {}", kind, e));
                    continue;
                }
            };

            for note in &output.notes {
                warnings.push(format!("{}: {}", kind, note));
            }

            let text = normalize_text(&output.text);
            let chars = meaningful_len(&text);
            if chars < self.min_chars {
                warn!(backend = %kind, chars, min = self.min_chars, "extraction output inadequate");
                warnings.push(format!(
                    "{}: only {} characters extracted (minimum {})",
                    kind, chars, self.min_chars
                ));
                continue;
            }

            info!(backend = %kind, chars, pages = output.page_count, "text extracted");
            return Ok(ExtractionResult::new(
                text,
                kind,
                output.page_count,
                warnings,
            ));
        }

        Err(ExtractionError::ExtractionFailed {
            attempted: self.backends.len(),
            warnings,
        })
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("backend panicked: {}", detail)
}
