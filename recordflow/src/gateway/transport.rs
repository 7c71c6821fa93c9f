//! HTTP transport used by the live gateway.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Raw response of a single POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl TransportResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the response has a 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure to obtain any response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The request did not complete within the stage timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The connection could not be established.
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other request failure.
    #[error("request failed: {0}")]
    Request(String),
}

/// Sends a JSON body to a URL.
///
/// One call is one network attempt; retries live in the gateway.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// POSTs `body` as JSON to `url`, giving up after `timeout`.
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError>;
}

/// [`Transport`] backed by a shared `reqwest` client.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl ReqwestTransport {
    /// Creates a transport with a default client.
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;
        Ok(Self { client })
    }

    /// Creates a transport around an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(&e, timeout))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| classify(&e, timeout))?;

        Ok(TransportResponse { status, body })
    }
}

#[cfg(feature = "http")]
fn classify(err: &reqwest::Error, timeout: Duration) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(timeout)
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Request(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_success_range() {
        assert!(TransportResponse::new(200, "").is_success());
        assert!(TransportResponse::new(204, "").is_success());
        assert!(!TransportResponse::new(302, "").is_success());
        assert!(!TransportResponse::new(500, "").is_success());
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Timeout(Duration::from_secs(2));
        assert_eq!(err.to_string(), "request timed out after 2s");
    }

    #[cfg(feature = "http")]
    #[tokio::test]
    async fn test_reqwest_transport_connection_refused() {
        let transport = ReqwestTransport::new().unwrap();
        // Port 9 (discard) is not expected to accept HTTP connections locally.
        let result = transport
            .post_json(
                "http://127.0.0.1:9/ingest",
                &serde_json::json!({"recordId": "x"}),
                Duration::from_millis(500),
            )
            .await;

        assert!(result.is_err());
    }
}
