//! Report extraction handlers
//!
//! - `GET /health`
//! - `POST /extract` (underwriting)
//! - `POST /returns`
//! - `POST /extract/:document_type`

use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use report_parser::returns::{RETURNED_PRE_NOTES, SECTION_KEY};
use report_parser::REPORT_DATE_FIELD;
use serde::Serialize;
use serde_json::{json, Value};
use shared_types::{DocumentType, ExtractionResult, ForwardResponse, RecordItem, StructuredRecord};
use tracing::info;

use crate::error::ApiError;
use crate::form::UploadForm;
use crate::state::AppState;

/// Characters of raw text echoed when a sample is requested
pub const TEXT_SAMPLE_CHARS: usize = 1500;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub staged_uploads: usize,
}

/// Handler: GET /health
pub async fn handle_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "report-api",
        version: env!("CARGO_PKG_VERSION"),
        staged_uploads: state.uploads.len().await,
    })
}

/// Handler: POST /extract
pub async fn handle_extract_underwriting(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    extract_report(state, DocumentType::Underwriting, multipart).await
}

/// Handler: POST /returns
pub async fn handle_extract_returns(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    extract_report(state, DocumentType::Returns, multipart).await
}

/// Handler: POST /extract/:document_type
pub async fn handle_extract_typed(
    State(state): State<Arc<AppState>>,
    Path(document_type): Path<String>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let document_type: DocumentType = document_type.parse()?;
    extract_report(state, document_type, multipart).await
}

async fn extract_report(
    state: Arc<AppState>,
    document_type: DocumentType,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let mut form = UploadForm::read(&mut multipart, state.config.max_upload_bytes()).await?;

    let upload = form
        .take_file(&["pdf", "file"])
        .ok_or_else(|| ApiError::InvalidRequest("No file provided. Use field name 'pdf'".into()))?;
    if !upload.has_extension("pdf") {
        return Err(ApiError::InvalidRequest("Please send a .pdf file".into()));
    }

    let label = form
        .text("document_type")
        .unwrap_or(document_type.as_str())
        .to_string();
    let file = upload.meta("application/pdf");
    info!(%document_type, file = %upload.file_name, bytes = upload.bytes.len(), "extraction requested");

    let worker = Arc::clone(&state);
    let (extraction, record) = tokio::task::spawn_blocking(move || {
        let extraction = worker.engine.extract(&upload.bytes)?;
        let record = worker.parser.parse(&extraction, document_type)?;
        Ok::<_, ApiError>((extraction, record))
    })
    .await??;

    let report = ReportBody::new(&record);

    let forwarded = match state.config.forward_target(
        &[form.text("forward_url")],
        &[(form.text("bearer"), form.text("basic"))],
    ) {
        Some(target) => {
            let payload = report.forward_payload(&label, form.custom_data());
            let result = state.forwarder.deliver(&target, &payload).await;
            Some(ForwardResponse::from(&result))
        }
        None => None,
    };

    let mut body = json!({
        "ok": true,
        "report_type": document_type,
        "document_type": label,
        "report_date": report.report_date,
        "count": report.count,
        "file": file,
        "items": report.items,
        "extraction": extraction_meta(&extraction),
        "forwarded": forwarded,
    });
    if form.flag("return_text_sample") {
        body["text_sample"] = json!(extraction.text_sample(TEXT_SAMPLE_CHARS));
        body["text_len"] = json!(extraction.text().chars().count());
    }

    Ok(Json(body))
}

fn extraction_meta(extraction: &ExtractionResult) -> Value {
    json!({
        "backend": extraction.backend_used(),
        "page_count": extraction.page_count(),
        "warnings": extraction.warnings(),
    })
}

/// Response and forward shapes of one parsed report
struct ReportBody {
    document_type: DocumentType,
    report_date: Value,
    count: Value,
    items: Value,
}

impl ReportBody {
    fn new(record: &StructuredRecord) -> Self {
        let report_date = json!(record.get(REPORT_DATE_FIELD));

        match record.document_type() {
            DocumentType::Underwriting => Self {
                document_type: DocumentType::Underwriting,
                report_date,
                count: json!(record.items().len()),
                items: json!(record.items()),
            },
            DocumentType::Returns => {
                // Items seen before any section header count as returned items
                let (pre_notes, returned): (Vec<&RecordItem>, Vec<&RecordItem>) = record
                    .items()
                    .iter()
                    .partition(|item| item.text(SECTION_KEY) == Some(RETURNED_PRE_NOTES));
                Self {
                    document_type: DocumentType::Returns,
                    report_date,
                    count: json!({
                        "returned_items": returned.len(),
                        "returned_pre_notes": pre_notes.len(),
                        "total": record.items().len(),
                    }),
                    items: json!({
                        "returned_items": returned,
                        "returned_pre_notes": pre_notes,
                    }),
                }
            }
        }
    }

    fn forward_payload(&self, label: &str, custom_data: Option<Value>) -> Value {
        let mut payload = json!({
            "report_type": self.document_type,
            "document_type": label,
            "report_date": self.report_date,
            "count": self.count,
            "custom_data": custom_data,
        });
        match self.document_type {
            DocumentType::Underwriting => payload["items"] = self.items.clone(),
            DocumentType::Returns => {
                payload["returned_items"] = self.items["returned_items"].clone();
                payload["returned_pre_notes"] = self.items["returned_pre_notes"].clone();
            }
        }
        payload
    }
}
