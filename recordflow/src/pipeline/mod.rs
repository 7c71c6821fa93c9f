//! Pipeline execution.
//!
//! This module provides:
//! - The [`StageRunner`], which drives stages strictly in sequence
//! - Run state ([`PipelineRun`], [`StageResult`], [`RunStatus`])
//! - The [`RecordEnvelope`] wire body posted to each service

mod envelope;
mod run;
mod runner;


pub use envelope::{RecordEnvelope, DEDUPLICATED, INGESTED};
pub use run::{PipelineRun, RunOutcome, RunStatus, StageFailure, StageResult};
pub use runner::StageRunner;
