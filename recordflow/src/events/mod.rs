//! Run lifecycle events.
//!
//! The runner emits one event per lifecycle transition:
//!
//! - `run.started`, `run.completed`, `run.halted`
//! - `stage.started`, `stage.completed`, `stage.failed`, `stage.skipped`
//!
//! Sinks must not fail or block the run.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Event names emitted by the runner.
pub mod names {
    /// A run began.
    pub const RUN_STARTED: &str = "run.started";
    /// Every stage completed.
    pub const RUN_COMPLETED: &str = "run.completed";
    /// A stage failed or the run was cancelled.
    pub const RUN_HALTED: &str = "run.halted";
    /// A stage began.
    pub const STAGE_STARTED: &str = "stage.started";
    /// A stage succeeded.
    pub const STAGE_COMPLETED: &str = "stage.completed";
    /// A stage failed.
    pub const STAGE_FAILED: &str = "stage.failed";
    /// A disabled stage was skipped.
    pub const STAGE_SKIPPED: &str = "stage.skipped";
}
