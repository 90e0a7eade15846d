//! Forwarding contract
//!
//! The core never talks HTTP itself. Finished records and confirmed uploads are
//! handed to a [`Forwarder`], and whatever it reports is surfaced next to the
//! result without ever undoing it.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of response body characters kept in a [`ForwardResponse`]
pub const RESPONSE_BODY_LIMIT: usize = 400;

/// Credentials attached to a forwarded request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "scheme", content = "value")]
pub enum AuthMaterial {
    Bearer(String),
    /// Either a `user:password` pair or an already base64-encoded credential
    Basic(String),
}

impl AuthMaterial {
    /// Pick bearer over basic, ignoring blank values
    pub fn from_parts(bearer: Option<&str>, basic: Option<&str>) -> Option<Self> {
        fn clean(v: Option<&str>) -> Option<&str> {
            v.map(str::trim).filter(|v| !v.is_empty())
        }

        if let Some(token) = clean(bearer) {
            return Some(AuthMaterial::Bearer(token.to_string()));
        }
        clean(basic).map(|b| AuthMaterial::Basic(b.to_string()))
    }

    /// Value for the `Authorization` header
    pub fn header_value(&self) -> String {
        match self {
            AuthMaterial::Bearer(token) => format!("Bearer {}", token),
            AuthMaterial::Basic(credential) if credential.contains(':') => {
                format!("Basic {}", BASE64.encode(credential.as_bytes()))
            }
            AuthMaterial::Basic(credential) => format!("Basic {}", credential),
        }
    }
}

/// Where (and as whom) a payload should be delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardTarget {
    pub url: String,
    #[serde(skip_serializing)]
    pub auth: Option<AuthMaterial>,
}

impl ForwardTarget {
    pub fn new(url: impl Into<String>, auth: Option<AuthMaterial>) -> Self {
        Self {
            url: url.into().trim().to_string(),
            auth,
        }
    }
}

/// Successful delivery as seen by the remote endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub status_code: u16,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForwardError {
    #[error("Invalid forward destination: {0}")]
    InvalidTarget(String),

    #[error("Forward request failed: {0}")]
    Transport(String),

    #[error("Destination rejected payload with status {status}")]
    Rejected { status: u16, body: String },
}

/// Serializable summary of one delivery attempt, echoed back to callers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ForwardResponse {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl From<&Result<DeliveryReceipt, ForwardError>> for ForwardResponse {
    fn from(result: &Result<DeliveryReceipt, ForwardError>) -> Self {
        match result {
            Ok(receipt) => ForwardResponse {
                status_code: Some(receipt.status_code),
                body: Some(truncate(&receipt.body)),
                error: None,
            },
            Err(ForwardError::Rejected { status, body }) => ForwardResponse {
                status_code: Some(*status),
                body: Some(truncate(body)),
                error: Some(format!("destination responded with status {}", status)),
            },
            Err(other) => ForwardResponse {
                status_code: None,
                body: None,
                error: Some(other.to_string()),
            },
        }
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(RESPONSE_BODY_LIMIT).collect()
}

/// Delivers finished output to a caller-specified endpoint.
///
/// Implementations must not retry; the caller decides what a failure means.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn deliver(
        &self,
        target: &ForwardTarget,
        payload: &serde_json::Value,
    ) -> Result<DeliveryReceipt, ForwardError>;
}
