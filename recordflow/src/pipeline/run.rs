//! Run state: per-stage results and the aggregate run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::core::{Record, StageKind, StageStatus};
use crate::errors::StageError;

/// Why a stage failed, in report form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// Stable error code, e.g. `gateway_unreachable`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl From<&StageError> for StageFailure {
    fn from(err: &StageError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Outcome of one stage. Appended once per executed stage, never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage name.
    pub stage: String,
    /// Stage kind.
    pub kind: StageKind,
    /// Terminal status.
    pub status: StageStatus,
    /// Records the stage received.
    pub records_in: usize,
    /// Records the stage handed on.
    pub records_out: usize,
    /// Envelopes submitted to the gateway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Gateway response bodies, in submission order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    /// Stage-specific detail such as quality verdicts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
    /// Set when the stage failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StageFailure>,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// When the stage reached its terminal status.
    pub ended_at: DateTime<Utc>,
}

impl StageResult {
    fn base(
        stage: &str,
        kind: StageKind,
        status: StageStatus,
        records_in: usize,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stage: stage.to_string(),
            kind,
            status,
            records_in,
            records_out: 0,
            payload: None,
            response: None,
            detail: None,
            error: None,
            started_at,
            ended_at: Utc::now(),
        }
    }

    /// A succeeded stage.
    #[must_use]
    pub fn succeeded(
        stage: &str,
        kind: StageKind,
        records_in: usize,
        records_out: usize,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            records_out,
            ..Self::base(stage, kind, StageStatus::Succeeded, records_in, started_at)
        }
    }

    /// A failed stage. Nothing is handed on.
    #[must_use]
    pub fn failed(
        stage: &str,
        kind: StageKind,
        records_in: usize,
        error: &StageError,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            error: Some(StageFailure::from(error)),
            ..Self::base(stage, kind, StageStatus::Failed, records_in, started_at)
        }
    }

    /// A disabled stage; records pass through untouched.
    #[must_use]
    pub fn skipped(stage: &str, kind: StageKind, records: usize) -> Self {
        Self {
            records_out: records,
            detail: Some(serde_json::json!({ "reason": "stage disabled" })),
            ..Self::base(stage, kind, StageStatus::Skipped, records, Utc::now())
        }
    }

    /// Attaches the submitted payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Option<Value>) -> Self {
        self.payload = payload;
        self
    }

    /// Attaches the gateway responses.
    #[must_use]
    pub fn with_response(mut self, response: Option<Value>) -> Self {
        self.response = response;
        self
    }

    /// Attaches stage-specific detail.
    #[must_use]
    pub fn with_detail(mut self, detail: Option<Value>) -> Self {
        self.detail = detail;
        self
    }

    /// Wall-clock duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}

/// Overall state of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    /// Stages are still executing.
    Running,
    /// Every stage succeeded or was skipped.
    Succeeded,
    /// A stage failed or the run was cancelled.
    Halted {
        /// Stage that failed, or the next stage when cancelled.
        stage: String,
        /// Why the run stopped.
        reason: String,
    },
}

impl RunStatus {
    /// Whether the run is finished.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One execution of a pipeline over one batch of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    run_id: Uuid,
    pipeline: String,
    simulated: bool,
    started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
    status: RunStatus,
    stages: Vec<StageResult>,
}

impl PipelineRun {
    pub(crate) fn start(pipeline: &str, simulated: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline: pipeline.to_string(),
            simulated,
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            stages: Vec::new(),
        }
    }

    /// Unique id of this run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Pipeline name.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// Whether the gateway ran in simulate mode.
    #[must_use]
    pub fn simulated(&self) -> bool {
        self.simulated
    }

    /// When the run started.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the run reached a terminal status.
    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Current run status.
    #[must_use]
    pub fn status(&self) -> &RunStatus {
        &self.status
    }

    /// Stage results in execution order.
    #[must_use]
    pub fn stages(&self) -> &[StageResult] {
        &self.stages
    }

    /// Result of the named stage, if it ran.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.stage == name)
    }

    /// Whether the run finished successfully.
    #[must_use]
    pub fn is_succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub(crate) fn record(&mut self, result: StageResult) {
        debug_assert!(!self.status.is_terminal(), "run already finished");
        self.stages.push(result);
    }

    pub(crate) fn halt(&mut self, stage: &str, reason: impl Into<String>) {
        self.status = RunStatus::Halted {
            stage: stage.to_string(),
            reason: reason.into(),
        };
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn finish(&mut self) {
        self.status = RunStatus::Succeeded;
        self.finished_at = Some(Utc::now());
    }
}

/// A finished run plus the records that flowed out of its last stage.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// The run and its stage results.
    pub run: PipelineRun,
    /// Working set after the last executed stage.
    pub records: Vec<Record>,
}
