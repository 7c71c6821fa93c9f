//! Transport and gateway doubles.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::errors::GatewayError;
use crate::gateway::{
    GatewayMode, GatewayResponse, ServiceGateway, Transport, TransportError, TransportResponse,
};

/// A transport that replays queued outcomes in order.
///
/// Once the queue is empty every call answers `200 {}`.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<TransportResponse, TransportError>>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl ScriptedTransport {
    /// Creates a transport with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn push_response(&self, response: TransportResponse) {
        self.script.lock().push_back(Ok(response));
    }

    /// Queues a transport failure.
    pub fn push_error(&self, error: TransportError) {
        self.script.lock().push_back(Err(error));
    }

    /// Returns the number of POSTs made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns every `(url, body)` posted, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        _timeout: Duration,
    ) -> Result<TransportResponse, TransportError> {
        self.calls.lock().push((url.to_string(), body.clone()));
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(TransportResponse::new(200, "{}")))
    }
}

/// A gateway that records calls and answers from a table of failures.
///
/// Stages without a configured failure succeed with `{"accepted": true}`.
#[derive(Debug)]
pub struct RecordingGateway {
    mode: GatewayMode,
    calls: Mutex<Vec<(String, Value)>>,
    failures: Mutex<HashMap<String, GatewayError>>,
}

impl Default for RecordingGateway {
    fn default() -> Self {
        Self {
            mode: GatewayMode::Live,
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
        }
    }
}

impl RecordingGateway {
    /// Creates a gateway where every call succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call to `stage` fail as unreachable.
    #[must_use]
    pub fn failing_stage(self, stage: impl Into<String>) -> Self {
        let stage = stage.into();
        let error = GatewayError::Unreachable {
            stage: stage.clone(),
            attempts: 1,
            message: "connection refused".to_string(),
        };
        self.fail_stage(stage, error);
        self
    }

    /// Makes every call to `stage` fail with `error`.
    pub fn fail_stage(&self, stage: impl Into<String>, error: GatewayError) {
        self.failures.lock().insert(stage.into(), error);
    }

    /// Returns every `(stage, payload)` call, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }

    /// Returns the payloads sent to one stage.
    #[must_use]
    pub fn calls_for(&self, stage: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(name, _)| name == stage)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    /// Returns the number of calls made.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ServiceGateway for RecordingGateway {
    async fn call(&self, stage: &str, payload: &Value) -> Result<GatewayResponse, GatewayError> {
        self.calls.lock().push((stage.to_string(), payload.clone()));
        if let Some(error) = self.failures.lock().get(stage) {
            return Err(error.clone());
        }
        Ok(GatewayResponse {
            status: Some(200),
            body: json!({ "accepted": true }),
            attempts: 1,
        })
    }

    fn mode(&self) -> GatewayMode {
        self.mode
    }
}
