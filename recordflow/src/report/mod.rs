//! Rendering finished runs for display, logs and export.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::core::StageStatus;
use crate::errors::RecordflowError;
use crate::pipeline::{PipelineRun, RunStatus, StageResult};

/// Builds the report document: the run plus a per-status stage count.
pub fn report_document(run: &PipelineRun) -> Result<Value, RecordflowError> {
    let mut document = serde_json::to_value(run)?;

    let mut stage_counts: BTreeMap<String, usize> = BTreeMap::new();
    for stage in run.stages() {
        *stage_counts.entry(stage.status.to_string()).or_insert(0) += 1;
    }
    if let Value::Object(map) = &mut document {
        map.insert("stage_counts".to_string(), json!(stage_counts));
    }
    Ok(document)
}

/// Renders the run as pretty-printed JSON.
pub fn render_json(run: &PipelineRun) -> Result<String, RecordflowError> {
    Ok(serde_json::to_string_pretty(&report_document(run)?)?)
}

/// Renders one line per stage plus a summary line.
#[must_use]
pub fn render_text(run: &PipelineRun) -> String {
    let mut out = String::new();
    let mode = if run.simulated() { " (simulated)" } else { "" };
    let _ = writeln!(out, "Pipeline '{}' run {}{mode}", run.pipeline(), run.run_id());

    for stage in run.stages() {
        let _ = write!(
            out,
            "  {:<20} {:<10} {:>4} -> {:<4} {:>6}ms",
            stage.stage,
            stage.status.to_string(),
            stage.records_in,
            stage.records_out,
            stage.duration_ms()
        );
        if let Some(failure) = &stage.error {
            let _ = write!(out, "  [{}] {}", failure.code, failure.message);
        }
        out.push('\n');
    }

    let _ = writeln!(out, "Status: {}", status_line(run.status()));
    out
}

/// Logs one structured line per stage and a run summary.
pub fn log_run(run: &PipelineRun) {
    for stage in run.stages() {
        log_stage(run, stage);
    }

    match run.status() {
        RunStatus::Halted { stage, reason } => warn!(
            run_id = %run.run_id(),
            pipeline = %run.pipeline(),
            stage = %stage,
            reason = %reason,
            "Pipeline run halted"
        ),
        status => info!(
            run_id = %run.run_id(),
            pipeline = %run.pipeline(),
            stages = run.stages().len(),
            status = %status_line(status),
            "Pipeline run finished"
        ),
    }
}

fn log_stage(run: &PipelineRun, stage: &StageResult) {
    let simulated = stage
        .response
        .as_ref()
        .and_then(Value::as_array)
        .and_then(|bodies| bodies.first())
        .and_then(|body| body.get("simulated"))
        .and_then(Value::as_bool)
        .unwrap_or(false);

    if stage.status == StageStatus::Failed {
        let (code, message) = stage
            .error
            .as_ref()
            .map_or(("unknown", ""), |f| (f.code.as_str(), f.message.as_str()));
        error!(
            run_id = %run.run_id(),
            stage = %stage.stage,
            kind = %stage.kind,
            status = %stage.status,
            records_in = stage.records_in,
            code,
            error = message,
            "Stage result"
        );
    } else {
        info!(
            run_id = %run.run_id(),
            stage = %stage.stage,
            kind = %stage.kind,
            status = %stage.status,
            records_in = stage.records_in,
            records_out = stage.records_out,
            duration_ms = stage.duration_ms(),
            simulated,
            "Stage result"
        );
    }
}

/// Writes the JSON report to `path`.
pub fn write_report(run: &PipelineRun, path: impl AsRef<Path>) -> Result<(), RecordflowError> {
    let path = path.as_ref();
    let body = render_json(run)?;
    std::fs::write(path, body)?;
    info!(path = %path.display(), run_id = %run.run_id(), "Wrote run report");
    Ok(())
}

fn status_line(status: &RunStatus) -> String {
    match status {
        RunStatus::Running => "running".to_string(),
        RunStatus::Succeeded => "succeeded".to_string(),
        RunStatus::Halted { stage, reason } => format!("halted at '{stage}': {reason}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Gateway;
    use crate::pipeline::StageRunner;
    use crate::testing::{scenario_config, scenario_records, RecordingGateway};
    use std::sync::Arc;

    async fn simulated_run() -> PipelineRun {
        let config = Arc::new(scenario_config());
        let gateway = Arc::new(Gateway::simulated(Arc::clone(&config)));
        StageRunner::new(config, gateway)
            .run(scenario_records())
            .await
            .run
    }

    async fn halted_run() -> PipelineRun {
        let gateway = Arc::new(RecordingGateway::new().failing_stage("dataingestion"));
        StageRunner::new(Arc::new(scenario_config()), gateway)
            .run(scenario_records())
            .await
            .run
    }

    #[tokio::test]
    async fn test_render_json() {
        let run = simulated_run().await;
        let document: Value = serde_json::from_str(&render_json(&run).unwrap()).unwrap();

        assert_eq!(document["run_id"], json!(run.run_id().to_string()));
        assert_eq!(document["simulated"], json!(true));
        assert_eq!(document["status"], json!({"state": "succeeded"}));
        assert_eq!(document["stage_counts"], json!({"succeeded": 3}));
        assert_eq!(document["stages"].as_array().unwrap().len(), 3);
        assert_eq!(
            document["stages"][0]["response"][0]["simulated"],
            json!(true)
        );
    }

    #[tokio::test]
    async fn test_render_text() {
        let text = render_text(&simulated_run().await);

        assert!(text.starts_with("Pipeline 'scenario' run "));
        assert!(text.contains("(simulated)"));
        assert!(text.contains("dataingestion"));
        assert!(text.contains("dataquality"));
        assert!(text.trim_end().ends_with("Status: succeeded"));
    }

    #[tokio::test]
    async fn test_render_text_halted() {
        let text = render_text(&halted_run().await);

        assert!(text.contains("[gateway_unreachable]"));
        assert!(text.contains("Status: halted at 'dataingestion'"));
        assert!(!text.contains("datadeduplication"));
    }

    #[tokio::test]
    async fn test_log_run_does_not_panic() {
        log_run(&simulated_run().await);
        log_run(&halted_run().await);
    }

    #[tokio::test]
    async fn test_write_report() {
        let run = halted_run().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        write_report(&run, &path).unwrap();

        let document: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(document["status"]["state"], json!("halted"));
        assert_eq!(document["status"]["stage"], json!("dataingestion"));
        assert_eq!(document["stage_counts"], json!({"failed": 1}));
    }
}
