//! HTTP delivery of finished results

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use shared_types::{DeliveryReceipt, ForwardError, ForwardTarget, Forwarder};
use tracing::{debug, info};

/// Posts JSON payloads with `reqwest`. One attempt per call.
pub struct HttpForwarder {
    client: reqwest::Client,
}

impl HttpForwarder {
    pub fn new(timeout: Duration) -> Result<Self, ForwardError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("report-api/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ForwardError::Transport(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

fn check_url(url: &str) -> Result<(), ForwardError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| ForwardError::InvalidTarget(format!("{}: {}", url, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ForwardError::InvalidTarget(format!(
            "unsupported scheme '{}' in {}",
            other, url
        ))),
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn deliver(
        &self,
        target: &ForwardTarget,
        payload: &serde_json::Value,
    ) -> Result<DeliveryReceipt, ForwardError> {
        check_url(&target.url)?;

        let mut request = self
            .client
            .post(&target.url)
            .header(CONTENT_TYPE, "application/json")
            .json(payload);
        if let Some(auth) = &target.auth {
            request = request.header(AUTHORIZATION, auth.header_value());
        }

        debug!(url = %target.url, authenticated = target.auth.is_some(), "forwarding payload");
        let response = request
            .send()
            .await
            .map_err(|e| ForwardError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        // An unreadable body is still a delivered request
        let body = response.text().await.unwrap_or_default();
        info!(url = %target.url, status, "payload forwarded");

        if (200..300).contains(&status) {
            Ok(DeliveryReceipt {
                status_code: status,
                body,
            })
        } else {
            Err(ForwardError::Rejected { status, body })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_scheme_check() {
        assert!(check_url("https://hooks.example.com/intake").is_ok());
        assert!(matches!(
            check_url("ftp://example.com/file"),
            Err(ForwardError::InvalidTarget(_))
        ));
        assert!(matches!(
            check_url("not a url"),
            Err(ForwardError::InvalidTarget(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_target_is_not_sent() {
        let forwarder = HttpForwarder::new(Duration::from_secs(1)).unwrap();
        let target = ForwardTarget::new("mailto:ops@example.com", None);

        let result = forwarder.deliver(&target, &serde_json::json!({})).await;
        assert!(matches!(result, Err(ForwardError::InvalidTarget(_))));
    }
}
