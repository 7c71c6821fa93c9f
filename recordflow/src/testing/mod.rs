//! Test doubles and fixtures for recordflow pipelines.
//!
//! - [`ScriptedTransport`] replays canned HTTP outcomes to a live [`Gateway`](crate::gateway::Gateway)
//! - [`RecordingGateway`] stands in for the whole gateway and records every call
//! - [`scenario_records`] and [`scenario_config`] describe the reference run

mod fixtures;
mod mocks;

pub use fixtures::{scenario_config, scenario_records, stage_names};
pub use mocks::{RecordingGateway, ScriptedTransport};
