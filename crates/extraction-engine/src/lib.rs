//! Multi-backend PDF text extraction
//!
//! The engine walks an ordered list of backends and stops at the first one
//! whose output clears the adequacy threshold. Backend failures (including
//! panics inside third-party PDF code) become warnings; only when every
//! backend has been tried without an adequate result does the call fail.
//!
//! # Example
//! ```no_run
//! use extraction_engine::ExtractionEngine;
//!
//! # fn example(pdf_bytes: &[u8]) -> Result<(), extraction_engine::ExtractionError> {
//! let engine = ExtractionEngine::new();
//! let result = engine.extract(pdf_bytes)?;
//! println!("{} pages via {}", result.page_count(), result.backend_used());
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod engine;
pub mod normalize;

pub use backends::{BackendError, BackendOutput, TextBackend};
pub use engine::{ExtractionEngine, DEFAULT_MIN_CHARS};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("Text extraction failed after {attempted} backend(s): {}", .warnings.join("; "))]
    ExtractionFailed {
        attempted: usize,
        warnings: Vec<String>,
    },

    #[error("No extraction backends configured")]
    NoBackends,
}
