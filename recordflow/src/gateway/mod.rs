//! The service gateway: "call stage X with payload Y".
//!
//! A [`Gateway`] runs in one of two modes. In [`GatewayMode::Live`] it POSTs the
//! payload to the stage endpoint through a [`Transport`], applying the stage
//! timeout and [`RetryPolicy`]. In [`GatewayMode::Simulate`] it performs no I/O
//! and echoes the payload under a `"simulated": true` marker.

mod retry;
mod transport;

pub use retry::{with_retry, RetryPolicy};
#[cfg(feature = "http")]
pub use transport::ReqwestTransport;
pub use transport::{Transport, TransportError, TransportResponse};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::errors::GatewayError;

/// Whether calls reach the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayMode {
    /// Real HTTP calls.
    #[default]
    Live,
    /// Synthetic success responses, no I/O.
    Simulate,
}

impl GatewayMode {
    /// Returns true for simulate mode.
    #[must_use]
    pub fn is_simulated(self) -> bool {
        self == Self::Simulate
    }
}

impl fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Simulate => write!(f, "simulate"),
        }
    }
}

/// Successful outcome of a gateway call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayResponse {
    /// HTTP status of the final attempt; `None` when simulated.
    pub status: Option<u16>,
    /// Response body, reported verbatim.
    pub body: Value,
    /// Attempts made, including the first.
    pub attempts: usize,
}

impl GatewayResponse {
    /// Builds the synthetic response returned in simulate mode.
    #[must_use]
    pub fn simulated(payload: &Value) -> Self {
        Self {
            status: None,
            body: json!({ "simulated": true, "echo": payload }),
            attempts: 0,
        }
    }

    /// Whether the response was synthesized.
    #[must_use]
    pub fn is_simulated(&self) -> bool {
        self.body.get("simulated").and_then(Value::as_bool) == Some(true)
    }
}

/// The seam between the stage runner and downstream services.
#[async_trait]
pub trait ServiceGateway: Send + Sync {
    /// Sends `payload` to the service behind `stage`.
    async fn call(&self, stage: &str, payload: &Value) -> Result<GatewayResponse, GatewayError>;

    /// Returns the gateway mode.
    fn mode(&self) -> GatewayMode;
}

/// Config-driven gateway with live and simulate modes.
pub struct Gateway {
    config: Arc<PipelineConfig>,
    mode: GatewayMode,
    transport: Option<Arc<dyn Transport>>,
    retry_overrides: HashMap<String, RetryPolicy>,
}

impl Gateway {
    /// Creates a live gateway over the given transport.
    #[must_use]
    pub fn new(config: Arc<PipelineConfig>, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            mode: GatewayMode::Live,
            transport: Some(transport),
            retry_overrides: HashMap::new(),
        }
    }

    /// Creates a live gateway backed by `reqwest`.
    #[cfg(feature = "http")]
    pub fn live(config: Arc<PipelineConfig>) -> Result<Self, TransportError> {
        Ok(Self::new(config, Arc::new(ReqwestTransport::new()?)))
    }

    /// Creates a gateway that never touches the network.
    #[must_use]
    pub fn simulated(config: Arc<PipelineConfig>) -> Self {
        Self {
            config,
            mode: GatewayMode::Simulate,
            transport: None,
            retry_overrides: HashMap::new(),
        }
    }

    /// Forces the given mode for every call.
    #[must_use]
    pub fn with_mode(mut self, mode: GatewayMode) -> Self {
        self.mode = mode;
        self
    }

    /// Replaces the configured retry policy of one stage.
    #[must_use]
    pub fn with_retry_policy(mut self, stage: impl Into<String>, policy: RetryPolicy) -> Self {
        self.retry_overrides.insert(stage.into(), policy);
        self
    }

    /// Returns the retry policy applied to `stage`.
    #[must_use]
    pub fn retry_policy(&self, stage: &str) -> Option<RetryPolicy> {
        self.retry_overrides.get(stage).copied().or_else(|| {
            self.config
                .stage(stage)
                .map(crate::config::StageConfig::retry_policy)
        })
    }
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("pipeline", &self.config.name)
            .field("mode", &self.mode)
            .field("has_transport", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}

/// Why one attempt did not succeed.
#[derive(Debug)]
enum AttemptFailure {
    Transport(TransportError),
    Status(u16),
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "{e}"),
            Self::Status(code) => write!(f, "HTTP {code}"),
        }
    }
}

#[async_trait]
impl ServiceGateway for Gateway {
    async fn call(&self, stage: &str, payload: &Value) -> Result<GatewayResponse, GatewayError> {
        let stage_config = self
            .config
            .stage(stage)
            .ok_or_else(|| GatewayError::UnknownStage(stage.to_string()))?;

        if self.mode.is_simulated() {
            debug!(stage, %payload, "Simulating POST");
            return Ok(GatewayResponse::simulated(payload));
        }

        let url = stage_config
            .url()
            .ok_or_else(|| GatewayError::UnknownStage(stage.to_string()))?;
        let Some(transport) = self.transport.as_deref() else {
            return Err(GatewayError::Unreachable {
                stage: stage.to_string(),
                attempts: 0,
                message: "no transport configured".to_string(),
            });
        };
        let policy = self
            .retry_policy(stage)
            .unwrap_or_else(|| stage_config.retry_policy());
        let timeout = stage_config.timeout;

        info!(stage, url = %url, "POST");
        let url = url.as_str();
        let (result, attempts) = with_retry(&policy, stage, move |_attempt| async move {
            let response = transport
                .post_json(url, payload, timeout)
                .await
                .map_err(AttemptFailure::Transport)?;
            if response.is_success() {
                Ok(response)
            } else {
                Err(AttemptFailure::Status(response.status))
            }
        })
        .await;

        match result {
            Ok(response) => Ok(GatewayResponse {
                status: Some(response.status),
                body: parse_body(response.status, &response.body),
                attempts,
            }),
            Err(AttemptFailure::Status(code)) => Err(GatewayError::BadStatus {
                stage: stage.to_string(),
                code,
                attempts,
            }),
            Err(AttemptFailure::Transport(e)) => Err(GatewayError::Unreachable {
                stage: stage.to_string(),
                attempts,
                message: e.to_string(),
            }),
        }
    }

    fn mode(&self) -> GatewayMode {
        self.mode
    }
}

/// JSON bodies are kept as-is, other text as a string, empty bodies as the status.
fn parse_body(status: u16, body: &str) -> Value {
    if body.trim().is_empty() {
        return json!({ "status_code": status });
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageConfig;
    use crate::core::StageKind;
    use crate::testing::ScriptedTransport;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn config(retries: u32) -> Arc<PipelineConfig> {
        Arc::new(
            PipelineConfig::new(
                "test",
                vec![StageConfig::new("ingest", StageKind::Ingestion)
                    .with_base_url("http://ingest.local")
                    .with_endpoint("/api/v1/dataingestion")
                    .with_retries(retries)],
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_simulate_echoes_payload_without_io() {
        let transport = Arc::new(ScriptedTransport::new());
        let gateway =
            Gateway::new(config(0), transport.clone()).with_mode(GatewayMode::Simulate);

        let payload = json!({"recordId": "ing-A-001"});
        let response = gateway.call("ingest", &payload).await.unwrap();

        assert_eq!(response.body, json!({"simulated": true, "echo": payload}));
        assert!(response.is_simulated());
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_live_call_posts_to_stage_url() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_response(TransportResponse::new(201, r#"{"id": 7}"#));
        let gateway = Gateway::new(config(0), transport.clone());

        let response = gateway.call("ingest", &json!({"a": 1})).await.unwrap();

        assert_eq!(response.status, Some(201));
        assert_eq!(response.body, json!({"id": 7}));
        assert_eq!(response.attempts, 1);
        assert_eq!(
            transport.calls()[0].0,
            "http://ingest.local/api/v1/dataingestion"
        );
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_error(TransportError::Connect("refused".to_string()));
        transport.push_response(TransportResponse::new(503, ""));
        transport.push_response(TransportResponse::new(200, "ok"));
        let gateway = Gateway::new(config(2), transport.clone());

        let response = gateway.call("ingest", &json!({})).await.unwrap();

        assert_eq!(response.attempts, 3);
        assert_eq!(response.body, json!("ok"));
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_bad_status_after_exhausting_retries() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..3 {
            transport.push_response(TransportResponse::new(500, "boom"));
        }
        let gateway = Gateway::new(config(1), transport.clone());

        let err = gateway.call("ingest", &json!({})).await.unwrap_err();

        assert_eq!(
            err,
            GatewayError::BadStatus {
                stage: "ingest".to_string(),
                code: 500,
                attempts: 2,
            }
        );
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_reports_last_error() {
        let mut mock = transport::MockTransport::new();
        mock.expect_post_json()
            .times(1)
            .returning(|_, _, timeout| Err(TransportError::Timeout(timeout)));
        let gateway = Gateway::new(config(0), Arc::new(mock));

        let err = gateway.call("ingest", &json!({})).await.unwrap_err();

        match err {
            GatewayError::Unreachable {
                attempts, message, ..
            } => {
                assert_eq!(attempts, 1);
                assert!(message.contains("timed out"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retry_policy_override() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..5 {
            transport.push_error(TransportError::Connect("refused".to_string()));
        }
        let gateway = Gateway::new(config(0), transport.clone())
            .with_retry_policy("ingest", RetryPolicy::new(4).with_backoff(Duration::ZERO));

        let err = gateway.call("ingest", &json!({})).await.unwrap_err();

        assert_eq!(err.attempts(), 4);
        assert_eq!(transport.call_count(), 4);
    }

    #[tokio::test]
    async fn test_unknown_stage() {
        let gateway = Gateway::simulated(config(0));
        let err = gateway.call("nope", &json!({})).await.unwrap_err();
        assert_eq!(err, GatewayError::UnknownStage("nope".to_string()));
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(204, ""), json!({"status_code": 204}));
        assert_eq!(parse_body(200, "[1,2]"), json!([1, 2]));
        assert_eq!(parse_body(200, "plain"), json!("plain"));
    }
}
