//! Shared data model for the report intake workspace
//!
//! Every crate in the workspace speaks these types: the raw document and its
//! extraction result, the structured record produced by the parsers, and the
//! forwarding contract used to hand finished output to a caller-chosen endpoint.

pub mod forward;
pub mod types;

pub use forward::{
    AuthMaterial, DeliveryReceipt, ForwardError, ForwardResponse, ForwardTarget, Forwarder,
};
pub use types::{
    BackendKind, DocumentType, ExtractionResult, FieldKind, FieldValue, RawDocument, RecordItem,
    StructuredRecord, UnresolvedFields, UnsupportedDocumentType,
};
