//! CSV preview/confirm handlers
//!
//! A preview diffs the uploaded CSV against a baseline and stages it under a
//! token. Nothing leaves the process until the token is confirmed, and a token
//! can be confirmed once.

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    Json,
};
use chrono::{DateTime, Utc};
use csv_diff::{diff, CompareOptions, CsvSnapshot, DiffEntry, DiffSummary, DiffWarning, KeyColumns};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_types::ForwardResponse;
use tracing::info;
use upload_cache::UploadToken;

use crate::error::ApiError;
use crate::form::{custom_data_from_json, Upload, UploadForm};
use crate::state::{AppState, Baseline, StagedUpload};

pub const FIRST_FILE_MESSAGE: &str =
    "This is the first file. There is no previous file to compare against.";
pub const PREVIEW_MESSAGE: &str =
    "Comparison preview generated successfully. Use the token to confirm the upload.";
pub const CONFIRMED_EVENT: &str = "csv_confirmed";

#[derive(Serialize)]
pub struct PreviewResponse {
    pub ok: bool,
    pub token: UploadToken,
    pub message: &'static str,
    pub expires_at: DateTime<Utc>,
    pub file: Value,
    pub baseline_file: Option<String>,
    pub key_columns: Vec<String>,
    pub summary: DiffSummary,
    pub changes: Vec<DiffEntry>,
    pub warnings: Vec<DiffWarning>,
}

/// Handler: POST /compare/preview
pub async fn handle_preview(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<PreviewResponse>, ApiError> {
    let mut form = UploadForm::read(&mut multipart, state.config.max_upload_bytes()).await?;

    let upload = form
        .take_file(&["csv_file", "file"])
        .ok_or_else(|| ApiError::InvalidRequest("No file provided. Use field name 'csv_file'".into()))?;
    let candidate = load_csv(&upload)?;

    let baseline = match form.take_file(&["baseline_file"]) {
        Some(file) => Some(Baseline {
            snapshot: load_csv(&file)?,
            file_name: file.file_name,
        }),
        None => state.baseline.read().await.clone(),
    };

    let keys = KeyColumns::parse(form.text("key_columns"));
    let options = CompareOptions {
        numeric_columns: form
            .text("numeric_columns")
            .map(|cols| {
                cols.split(',')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
        ..CompareOptions::default()
    };

    let empty = CsvSnapshot::empty();
    let baseline_snapshot = baseline.as_ref().map(|b| &b.snapshot).unwrap_or(&empty);
    let report = diff(baseline_snapshot, &candidate, &keys, &options)?;

    let file = upload.meta("text/csv");
    let staged = StagedUpload {
        file: file.clone(),
        file_name: upload.file_name.clone(),
        snapshot: candidate,
        summary: report.summary,
        changes: report.entries.clone(),
        custom_data: form.custom_data(),
        forward_url: form.text("forward_url").map(str::to_string),
        bearer: form.text("bearer").map(str::to_string),
        basic: form.text("basic").map(str::to_string),
    };
    let receipt = state.uploads.preview(staged).await;

    info!(
        token = %receipt.token,
        file = %upload.file_name,
        added = report.summary.added,
        removed = report.summary.removed,
        modified = report.summary.modified,
        "csv preview staged"
    );

    Ok(Json(PreviewResponse {
        ok: true,
        token: receipt.token,
        message: if baseline.is_some() {
            PREVIEW_MESSAGE
        } else {
            FIRST_FILE_MESSAGE
        },
        expires_at: receipt.expires_at,
        file,
        baseline_file: baseline.map(|b| b.file_name),
        key_columns: report.key_columns,
        summary: report.summary,
        changes: report.entries,
        warnings: report.warnings,
    }))
}

fn load_csv(upload: &Upload) -> Result<CsvSnapshot, ApiError> {
    if !upload.has_extension("csv") {
        return Err(ApiError::InvalidRequest("Please send a .csv file".into()));
    }
    Ok(CsvSnapshot::from_bytes(&upload.bytes)?)
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub upload_token: String,
    #[serde(default)]
    pub custom_data: Value,
    pub forward_url: Option<String>,
    pub bearer: Option<String>,
    pub basic: Option<String>,
}

#[derive(Serialize)]
pub struct ConfirmResponse {
    pub ok: bool,
    pub message: String,
    pub token: UploadToken,
    pub summary: DiffSummary,
    pub delivery: Option<ForwardResponse>,
}

/// Handler: POST /compare/confirm
pub async fn handle_confirm(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConfirmRequest>,
) -> Result<Json<ConfirmResponse>, ApiError> {
    let token: UploadToken = req.upload_token.parse()?;
    let request_custom_data = custom_data_from_json(req.custom_data);

    let outcome = state
        .uploads
        .confirm_and_deliver(&token, state.forwarder.as_ref(), |receipt, staged| {
            let target = state.config.forward_target(
                &[req.forward_url.as_deref(), staged.forward_url.as_deref()],
                &[
                    (req.bearer.as_deref(), req.basic.as_deref()),
                    (staged.bearer.as_deref(), staged.basic.as_deref()),
                ],
            )?;
            let payload = json!({
                "event": CONFIRMED_EVENT,
                "upload_token": receipt.token,
                "file": staged.file,
                "summary": staged.summary,
                "changes": staged.changes,
                "custom_data": request_custom_data.clone().or_else(|| staged.custom_data.clone()),
                "confirmed_at": Utc::now(),
            });
            Some((target, payload))
        })
        .await?;

    let staged = outcome.payload;
    let rows = staged.snapshot.len();
    *state.baseline.write().await = Some(Baseline {
        file_name: staged.file_name.clone(),
        snapshot: staged.snapshot,
    });
    info!(%token, file = %staged.file_name, rows, "csv confirmed; baseline replaced");

    let message = match &outcome.delivery {
        Some(delivery) if !delivery.is_success() => {
            "File confirmed; forwarding failed, see delivery".to_string()
        }
        Some(_) => "File confirmed and forwarded.".to_string(),
        None => "File confirmed.".to_string(),
    };

    Ok(Json(ConfirmResponse {
        ok: true,
        message,
        token,
        summary: staged.summary,
        delivery: outcome.delivery,
    }))
}
