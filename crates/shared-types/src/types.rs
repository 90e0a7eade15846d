use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The two report classes the parsers understand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Daily new business / underwriting activity report
    Underwriting,
    /// Daily return drafts report
    Returns,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Underwriting => "underwriting",
            DocumentType::Returns => "returns",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported document type: {0}")]
pub struct UnsupportedDocumentType(pub String);

impl FromStr for DocumentType {
    type Err = UnsupportedDocumentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "underwriting" => Ok(DocumentType::Underwriting),
            "returns" | "return" => Ok(DocumentType::Returns),
            other => Err(UnsupportedDocumentType(other.to_string())),
        }
    }
}

/// Immutable document payload tagged with its report class
#[derive(Debug, Clone)]
pub struct RawDocument {
    bytes: Vec<u8>,
    document_type: DocumentType,
}

impl RawDocument {
    pub fn new(bytes: Vec<u8>, document_type: DocumentType) -> Self {
        Self {
            bytes,
            document_type,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }
}

/// Identifies the text-extraction backend that produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// `pdf-extract` crate, full layout-aware extraction
    PdfExtract,
    /// `lopdf` structured text extraction using font encodings
    LopdfText,
    /// Raw walk over page content streams
    ContentStream,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::PdfExtract => "pdf-extract",
            BackendKind::LopdfText => "lopdf-text",
            BackendKind::ContentStream => "content-stream",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text extracted from one document, plus which backend produced it.
///
/// Built once per extraction call and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    text: String,
    backend_used: BackendKind,
    page_count: usize,
    warnings: Vec<String>,
}

impl ExtractionResult {
    pub fn new(
        text: String,
        backend_used: BackendKind,
        page_count: usize,
        warnings: Vec<String>,
    ) -> Self {
        Self {
            text,
            backend_used,
            page_count,
            warnings,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn backend_used(&self) -> BackendKind {
        self.backend_used
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Non-fatal notices, in the order the backends were attempted
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// First `max_chars` characters of the text, for diagnostics
    pub fn text_sample(&self, max_chars: usize) -> String {
        self.text.chars().take(max_chars).collect()
    }
}

/// Declared type of a canonical field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    Number,
    Date,
}

/// A resolved, typed field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Date(NaiveDate),
    Text(String),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Number(_) => FieldKind::Number,
            FieldValue::Date(_) => FieldKind::Date,
            FieldValue::Text(_) => FieldKind::Text,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }
}

/// One repeated line item (a policy row, a returned draft) inside a record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordItem {
    fields: BTreeMap<String, Option<FieldValue>>,
}

impl RecordItem {
    pub fn new(fields: BTreeMap<String, Option<FieldValue>>) -> Self {
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).and_then(|v| v.as_ref())
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    pub fn fields(&self) -> &BTreeMap<String, Option<FieldValue>> {
        &self.fields
    }

    pub fn set(&mut self, name: impl Into<String>, value: Option<FieldValue>) {
        self.fields.insert(name.into(), value);
    }
}

/// Required fields that did not resolve while building a record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unresolved required fields: {}", .0.join(", "))]
pub struct UnresolvedFields(pub Vec<String>);

/// Canonical record produced from one report.
///
/// A record only exists when every required field resolved to a typed value;
/// [`StructuredRecord::try_new`] is the single way in and enforces that.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredRecord {
    document_type: DocumentType,
    fields: BTreeMap<String, Option<FieldValue>>,
    required_fields: Vec<String>,
    items: Vec<RecordItem>,
}

impl StructuredRecord {
    pub fn try_new(
        document_type: DocumentType,
        fields: BTreeMap<String, Option<FieldValue>>,
        required_fields: Vec<String>,
        items: Vec<RecordItem>,
    ) -> Result<Self, UnresolvedFields> {
        let missing: Vec<String> = required_fields
            .iter()
            .filter(|name| !matches!(fields.get(name.as_str()), Some(Some(_))))
            .cloned()
            .collect();

        if !missing.is_empty() {
            return Err(UnresolvedFields(missing));
        }

        Ok(Self {
            document_type,
            fields,
            required_fields,
            items,
        })
    }

    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).and_then(|v| v.as_ref())
    }

    pub fn fields(&self) -> &BTreeMap<String, Option<FieldValue>> {
        &self.fields
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    pub fn items(&self) -> &[RecordItem] {
        &self.items
    }

    /// Items whose `field` equals `value`, e.g. returned pre-notes by section
    pub fn items_where<'a>(
        &'a self,
        field: &'a str,
        value: &'a str,
    ) -> impl Iterator<Item = &'a RecordItem> + 'a {
        self.items
            .iter()
            .filter(move |item| item.text(field) == Some(value))
    }
}
