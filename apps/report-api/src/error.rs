//! Error types for the report API

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use csv_diff::DiffError;
use extraction_engine::ExtractionError;
use report_parser::ParseError;
use serde::Serialize;
use shared_types::UnsupportedDocumentType;
use thiserror::Error;
use upload_cache::CacheError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    UnsupportedDocumentType(#[from] UnsupportedDocumentType),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Csv(#[from] DiffError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    ok: bool,
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    unresolved_fields: Option<Vec<String>>,
}

impl ApiError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Extraction(ExtractionError::NoBackends) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
            ApiError::Extraction(_) => (StatusCode::UNPROCESSABLE_ENTITY, "EXTRACTION_FAILED"),
            ApiError::UnsupportedDocumentType(_) => {
                (StatusCode::BAD_REQUEST, "UNSUPPORTED_DOCUMENT_TYPE")
            }
            ApiError::Parse(_) => (StatusCode::UNPROCESSABLE_ENTITY, "PARSE_ERROR"),
            ApiError::Csv(_) => (StatusCode::BAD_REQUEST, "INVALID_CSV_SCHEMA"),
            ApiError::Cache(CacheError::TokenNotFound) => (StatusCode::NOT_FOUND, "TOKEN_NOT_FOUND"),
            ApiError::Cache(CacheError::TokenExpired) => (StatusCode::GONE, "TOKEN_EXPIRED"),
            ApiError::Cache(CacheError::AlreadyConfirmed) => {
                (StatusCode::CONFLICT, "ALREADY_CONFIRMED")
            }
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            ApiError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        if status.is_server_error() {
            tracing::error!(code, error = %self, "request failed");
        } else {
            tracing::debug!(code, error = %self, "request rejected");
        }

        let unresolved_fields = match &self {
            ApiError::Parse(e) => Some(e.unresolved.clone()),
            _ => None,
        };

        let body = ErrorResponse {
            ok: false,
            error: self.to_string(),
            code,
            unresolved_fields,
        };

        (status, Json(body)).into_response()
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("extraction task failed: {}", err))
    }
}

impl From<axum::extract::multipart::MultipartError> for ApiError {
    fn from(err: axum::extract::multipart::MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(format!("Request body too large: {}", err.body_text()))
        } else {
            ApiError::InvalidRequest(format!("Failed to read upload: {}", err.body_text()))
        }
    }
}
