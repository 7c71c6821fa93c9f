//! Sequential stage execution.

use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::envelope::{RecordEnvelope, DEDUPLICATED, INGESTED};
use super::run::{PipelineRun, RunOutcome, StageResult};
use crate::cancellation::CancellationToken;
use crate::config::{PipelineConfig, StageConfig};
use crate::core::{Record, StageKind};
use crate::errors::StageError;
use crate::events::{names, EventSink, NoOpEventSink};
use crate::gateway::ServiceGateway;
use crate::quality::{QualityEvaluator, QualityVerdict};

/// Drives the configured stages, in order, over one batch of records.
///
/// Each stage consumes the record set produced by the previous one. The first
/// failed stage halts the run; later stages never execute.
pub struct StageRunner {
    config: Arc<PipelineConfig>,
    gateway: Arc<dyn ServiceGateway>,
    events: Arc<dyn EventSink>,
    cancellation: Arc<CancellationToken>,
}

impl StageRunner {
    /// Creates a runner with no event sink and a fresh cancellation token.
    #[must_use]
    pub fn new(config: Arc<PipelineConfig>, gateway: Arc<dyn ServiceGateway>) -> Self {
        Self {
            config,
            gateway,
            events: Arc::new(NoOpEventSink),
            cancellation: Arc::new(CancellationToken::new()),
        }
    }

    /// Sets the sink that receives lifecycle events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Uses a shared cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = token;
        self
    }

    /// Returns the cancellation token checked between stages.
    #[must_use]
    pub fn cancellation(&self) -> Arc<CancellationToken> {
        Arc::clone(&self.cancellation)
    }

    /// Returns the pipeline configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs every stage over `records`.
    ///
    /// Never returns an error: failures are recorded on the run, which ends
    /// either `Succeeded` or `Halted`.
    pub async fn run(&self, records: Vec<Record>) -> RunOutcome {
        let mut run = PipelineRun::start(&self.config.name, self.gateway.mode().is_simulated());
        let run_id = run.run_id().to_string();

        info!(
            run_id = %run_id,
            pipeline = %self.config.name,
            stages = self.config.stages.len(),
            records = records.len(),
            mode = %self.gateway.mode(),
            "Pipeline run started"
        );
        self.events.emit(
            names::RUN_STARTED,
            Some(json!({
                "run_id": run_id,
                "pipeline": self.config.name,
                "records": records.len(),
                "simulated": run.simulated(),
            })),
        );

        let mut working = records;

        for stage in &self.config.stages {
            // Simulated stages never suspend, so give signal tasks a turn.
            tokio::task::yield_now().await;
            if let Some(reason) = self.cancellation.reason() {
                warn!(run_id = %run_id, stage = %stage.name, reason = %reason, "Run cancelled");
                self.halt(&mut run, &stage.name, reason, true);
                return RunOutcome {
                    run,
                    records: working,
                };
            }

            if !stage.enabled {
                info!(stage = %stage.name, "Stage disabled, skipping");
                run.record(StageResult::skipped(&stage.name, stage.kind, working.len()));
                self.events.emit(
                    names::STAGE_SKIPPED,
                    Some(json!({"stage": stage.name, "reason": "stage disabled"})),
                );
                continue;
            }

            info!(stage = %stage.name, kind = %stage.kind, records = working.len(), "Stage started");
            self.events.emit(
                names::STAGE_STARTED,
                Some(json!({
                    "stage": stage.name,
                    "kind": stage.kind,
                    "records": working.len(),
                })),
            );

            let started_at = Utc::now();
            let timer = Instant::now();
            let records_in = working.len();
            let mut work = StageWork::default();

            match self.execute(stage, &working, &mut work).await {
                Ok(output) => {
                    let duration_ms = elapsed_ms(timer);
                    info!(
                        stage = %stage.name,
                        records_in,
                        records_out = output.len(),
                        calls = work.responses.len(),
                        attempts = work.attempts,
                        duration_ms,
                        "Stage completed"
                    );
                    self.events.emit(
                        names::STAGE_COMPLETED,
                        Some(json!({
                            "stage": stage.name,
                            "records_in": records_in,
                            "records_out": output.len(),
                            "duration_ms": duration_ms,
                        })),
                    );
                    let result = StageResult::succeeded(
                        &stage.name,
                        stage.kind,
                        records_in,
                        output.len(),
                        started_at,
                    );
                    run.record(work.attach(result));
                    working = output;
                }
                Err(err) => {
                    error!(
                        stage = %stage.name,
                        code = err.code(),
                        error = %err,
                        duration_ms = elapsed_ms(timer),
                        "Stage failed"
                    );
                    self.events.emit(
                        names::STAGE_FAILED,
                        Some(json!({
                            "stage": stage.name,
                            "code": err.code(),
                            "error": err.to_string(),
                        })),
                    );
                    let result =
                        StageResult::failed(&stage.name, stage.kind, records_in, &err, started_at);
                    run.record(work.attach(result));
                    self.halt(&mut run, &stage.name, err.to_string(), false);
                    return RunOutcome {
                        run,
                        records: working,
                    };
                }
            }
        }

        run.finish();
        info!(
            run_id = %run_id,
            stages = run.stages().len(),
            records = working.len(),
            "Pipeline run succeeded"
        );
        self.events.emit(
            names::RUN_COMPLETED,
            Some(json!({
                "run_id": run_id,
                "stages": run.stages().len(),
                "records": working.len(),
            })),
        );

        RunOutcome {
            run,
            records: working,
        }
    }

    fn halt(&self, run: &mut PipelineRun, stage: &str, reason: String, cancelled: bool) {
        self.events.emit(
            names::RUN_HALTED,
            Some(json!({
                "run_id": run.run_id().to_string(),
                "stage": stage,
                "reason": reason,
                "cancelled": cancelled,
            })),
        );
        run.halt(stage, reason);
    }

    async fn execute(
        &self,
        stage: &StageConfig,
        records: &[Record],
        work: &mut StageWork,
    ) -> Result<Vec<Record>, StageError> {
        match stage.kind {
            StageKind::Ingestion => {
                let envelopes = records
                    .iter()
                    .enumerate()
                    .map(|(idx, record)| RecordEnvelope::new("ing", idx, INGESTED, record, &[]));
                self.submit(stage, envelopes, work).await?;
                Ok(records.to_vec())
            }
            StageKind::Deduplication => {
                let survivors = stage.deduplicator().dedupe(records)?;
                work.detail = Some(json!({
                    "duplicates_removed": records.len() - survivors.len(),
                    "tie_break": stage.tie_break,
                    "missing_key": stage.missing_key,
                }));

                let deduplicated_at = json!(Utc::now().to_rfc3339());
                let envelopes = survivors.iter().enumerate().map(|(idx, record)| {
                    RecordEnvelope::new(
                        "dedup",
                        idx,
                        DEDUPLICATED,
                        record,
                        &[("deduplication_timestamp", deduplicated_at.clone())],
                    )
                });
                self.submit(stage, envelopes, work).await?;
                Ok(survivors)
            }
            StageKind::Quality => {
                let evaluator = QualityEvaluator::from_specs(&stage.rules).map_err(|e| {
                    StageError::InvalidStage {
                        stage: stage.name.clone(),
                        message: e.to_string(),
                    }
                })?;
                let verdicts = evaluator.evaluate_all(records);
                let failed = verdicts.iter().filter(|v| !v.passed).count();
                work.detail = Some(quality_detail(&evaluator, records, &verdicts, failed));

                if stage.blocking && failed > 0 {
                    return Err(StageError::QualityViolation {
                        failed,
                        total: records.len(),
                    });
                }
                if failed > 0 {
                    warn!(stage = %stage.name, failed, total = records.len(), "Records failed quality rules");
                }

                let annotated: Vec<Record> = records
                    .iter()
                    .zip(&verdicts)
                    .map(|(record, verdict)| annotate(record, verdict))
                    .collect();

                let checked_at = json!(Utc::now().to_rfc3339());
                let envelopes = annotated.iter().zip(&verdicts).enumerate().map(
                    |(idx, (record, verdict))| {
                        RecordEnvelope::new(
                            "quality",
                            idx,
                            verdict.status_label(),
                            record,
                            &[("quality_checked_at", checked_at.clone())],
                        )
                    },
                );
                self.submit(stage, envelopes, work).await?;
                Ok(annotated)
            }
        }
    }

    async fn submit(
        &self,
        stage: &StageConfig,
        envelopes: impl Iterator<Item = RecordEnvelope>,
        work: &mut StageWork,
    ) -> Result<(), StageError> {
        for envelope in envelopes {
            let payload = envelope.to_value();
            debug!(stage = %stage.name, record_id = %envelope.record_id, "Submitting record");
            work.envelopes.push(payload.clone());
            let response = self.gateway.call(&stage.name, &payload).await?;
            work.attempts += response.attempts;
            work.responses.push(response.body);
        }
        Ok(())
    }
}

impl std::fmt::Debug for StageRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRunner")
            .field("pipeline", &self.config.name)
            .field("stages", &self.config.stages.len())
            .field("mode", &self.gateway.mode())
            .finish_non_exhaustive()
    }
}

/// What a stage produced so far; kept even when the stage fails midway.
#[derive(Debug, Default)]
struct StageWork {
    envelopes: Vec<Value>,
    responses: Vec<Value>,
    attempts: usize,
    detail: Option<Value>,
}

impl StageWork {
    fn attach(self, result: StageResult) -> StageResult {
        result
            .with_payload(Some(Value::Array(self.envelopes)))
            .with_response(Some(Value::Array(self.responses)))
            .with_detail(self.detail)
    }
}

fn annotate(record: &Record, verdict: &QualityVerdict) -> Record {
    record
        .clone()
        .with_field("quality_status", verdict.status_label())
        .with_field("quality_violations", json!(verdict.violations))
        .with_field("quality_notes", verdict.notes())
}

fn quality_detail(
    evaluator: &QualityEvaluator,
    records: &[Record],
    verdicts: &[QualityVerdict],
    failed: usize,
) -> Value {
    let per_record: Vec<Value> = records
        .iter()
        .zip(verdicts)
        .map(|(record, verdict)| {
            json!({
                "source_record_id": record.source_record_id(),
                "passed": verdict.passed,
                "violations": verdict.violations,
            })
        })
        .collect();

    json!({
        "rules": evaluator.rule_names(),
        "passed": records.len() - failed,
        "failed": failed,
        "verdicts": per_record,
    })
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(timer: Instant) -> u64 {
    timer.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageStatus;
    use crate::pipeline::RunStatus;
    use crate::testing::{scenario_config, scenario_records, RecordingGateway};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_empty_batch_succeeds_without_calls() {
        let gateway = Arc::new(RecordingGateway::new());
        let runner = StageRunner::new(Arc::new(scenario_config()), gateway.clone());

        let outcome = runner.run(Vec::new()).await;

        assert!(outcome.run.is_succeeded());
        assert_eq!(outcome.run.stages().len(), 3);
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_disabled_stage_is_skipped() {
        let mut config = scenario_config();
        config.stages[1].enabled = false;
        let gateway = Arc::new(RecordingGateway::new());
        let runner = StageRunner::new(Arc::new(config), gateway.clone());

        let outcome = runner.run(scenario_records()).await;

        let dedup = &outcome.run.stages()[1];
        assert_eq!(dedup.status, StageStatus::Skipped);
        assert_eq!(dedup.records_out, 3);
        assert!(gateway.calls_for("datadeduplication").is_empty());
        assert_eq!(outcome.records.len(), 3);
    }

    #[tokio::test]
    async fn test_cancel_from_spawned_task_is_observed() {
        let runner = StageRunner::new(
            Arc::new(scenario_config()),
            Arc::new(RecordingGateway::new()),
        );
        let token = runner.cancellation();
        tokio::spawn(async move { token.cancel("interrupted by user") });

        let outcome = runner.run(scenario_records()).await;

        assert!(outcome.run.stages().is_empty());
        assert_eq!(
            outcome.run.status(),
            &RunStatus::Halted {
                stage: "dataingestion".to_string(),
                reason: "interrupted by user".to_string(),
            }
        );
    }

    #[test]
    fn test_annotate_adds_quality_fields() {
        let record = Record::new("A").with_field("amt", json!(-5));
        let verdict = QualityVerdict {
            passed: false,
            violations: vec!["positive_amount".to_string()],
            messages: vec!["amount must be positive".to_string()],
        };

        let annotated = annotate(&record, &verdict);

        assert_eq!(annotated.get("quality_status"), Some(&json!("INVALID")));
        assert_eq!(
            annotated.get("quality_violations"),
            Some(&json!(["positive_amount"]))
        );
        assert_eq!(
            annotated.get("quality_notes"),
            Some(&json!("amount must be positive"))
        );
        assert_eq!(annotated.get("amt"), Some(&json!(-5)));
    }
}
