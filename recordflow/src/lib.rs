//! # Recordflow
//!
//! Orchestrates a record pipeline across independently-owned HTTP services.
//!
//! A run walks the configured stages in order:
//!
//! - **Ingestion**: every raw record is posted to the ingestion service
//! - **Deduplication**: records are collapsed by `source_record_id`
//! - **Quality**: named rules annotate each record with a verdict
//!
//! Every stage appends exactly one [`StageResult`](pipeline::StageResult) to the
//! [`PipelineRun`](pipeline::PipelineRun); the first fatal failure halts the run.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use recordflow::prelude::*;
//! use std::sync::Arc;
//!
//! let config = Arc::new(load_config("pipeline_config.yaml")?);
//! let records = load_records("sample_data.json")?;
//!
//! let gateway = Arc::new(Gateway::simulated(Arc::clone(&config)));
//! let outcome = StageRunner::new(config, gateway).run(records).await;
//!
//! println!("{}", render_text(&outcome.run));
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod dedup;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod input;
pub mod pipeline;
pub mod quality;
pub mod report;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{load_config, PipelineConfig, RuleSpec, StageConfig};
    pub use crate::core::{Record, StageKind, StageStatus};
    pub use crate::dedup::{Deduplicator, MissingKeyPolicy, TieBreak};
    pub use crate::errors::{
        ConfigError, DedupError, GatewayError, InputError, RecordflowError, StageError,
    };
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::gateway::{Gateway, GatewayMode, GatewayResponse, RetryPolicy, ServiceGateway};
    pub use crate::input::{load_records, parse_records};
    pub use crate::pipeline::{PipelineRun, RunOutcome, RunStatus, StageResult, StageRunner};
    pub use crate::quality::{QualityEvaluator, QualityRule, QualityVerdict};
    pub use crate::report::{log_run, render_json, render_text, write_report};
}
