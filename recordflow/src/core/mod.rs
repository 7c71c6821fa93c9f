//! Core domain model types for recordflow.
//!
//! This module contains the fundamental types used throughout the orchestrator:
//! - The typed [`Record`] flowing between stages
//! - Stage status and kind enums

mod record;
mod status;

pub use record::Record;
pub use status::{StageKind, StageStatus};
