//! Pipeline configuration.
//!
//! A configuration document maps stage names to their settings; the mapping
//! order is the execution order. It is parsed once per run into an immutable
//! [`PipelineConfig`], shared read-only as `Arc<PipelineConfig>`.

mod parser;
mod types;
mod validator;

pub use parser::{load_config, parse_config_str, substitute_env_vars, ConfigFormat};
pub use types::{PipelineConfig, StageConfig, DEFAULT_TIMEOUT};
pub use validator::validate_pipeline;

pub use crate::quality::{RuleCheck, RuleSpec};
