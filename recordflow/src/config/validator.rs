//! Semantic validation of pipeline configuration.
//!
//! Every problem is collected so a single run reports all of them.

use std::collections::HashSet;
use std::time::Duration;

use super::types::{
    is_absolute_url, PipelineConfig, RawHttpDefaults, RawPipelineConfig, RawStageConfig,
    StageConfig, DEFAULT_TIMEOUT,
};
use crate::core::StageKind;
use crate::errors::ConfigError;
use crate::quality::QualityEvaluator;

const DEFAULT_PIPELINE_NAME: &str = "pipeline";

impl PipelineConfig {
    /// Creates a validated configuration from typed stages.
    pub fn new(name: impl Into<String>, stages: Vec<StageConfig>) -> Result<Self, ConfigError> {
        let config = Self {
            name: name.into(),
            stages,
        };
        validate_pipeline(&config)?;
        Ok(config)
    }
}

/// Validates a typed configuration.
pub fn validate_pipeline(config: &PipelineConfig) -> Result<(), ConfigError> {
    let mut errors = Vec::new();
    validate_stages(config, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(errors))
    }
}

fn validate_stages(config: &PipelineConfig, errors: &mut Vec<String>) {
    if config.name.trim().is_empty() {
        errors.push("Pipeline name must not be empty".to_string());
    }
    if config.stages.is_empty() {
        errors.push("Pipeline must define at least one stage".to_string());
    }

    let mut seen = HashSet::new();
    for stage in &config.stages {
        let context = format!("stage '{}'", stage.name);

        if stage.name.trim().is_empty() {
            errors.push("Stage name must not be empty".to_string());
        }
        if !seen.insert(stage.name.as_str()) {
            errors.push(format!("{context}: duplicate stage name"));
        }
        if stage.timeout.is_zero() {
            errors.push(format!("{context}: timeout_seconds must be > 0"));
        }

        if stage.enabled {
            match stage.endpoint.as_deref().map(str::trim) {
                None => errors.push(format!("{context}: missing required field 'endpoint'")),
                Some("") => errors.push(format!("{context}: endpoint must not be empty")),
                Some(endpoint) => {
                    if stage.base_url.is_none() && !is_absolute_url(endpoint) {
                        errors.push(format!(
                            "{context}: endpoint '{endpoint}' is relative and no base_url is set"
                        ));
                    }
                }
            }
            if let Some(base) = stage.base_url.as_deref() {
                if !is_absolute_url(base) {
                    errors.push(format!(
                        "{context}: base_url '{base}' must start with http:// or https://"
                    ));
                }
            }
        }

        if stage.kind == StageKind::Quality {
            if let Err(e) = QualityEvaluator::from_specs(&stage.rules) {
                errors.push(format!("{context}: {e}"));
            }
        } else if !stage.rules.is_empty() {
            tracing::warn!(
                stage = %stage.name,
                kind = %stage.kind,
                "Quality rules configured on a non-quality stage are ignored"
            );
        }
    }
}

/// Converts the raw document into a validated configuration.
pub(crate) fn build_pipeline(raw: RawPipelineConfig) -> Result<PipelineConfig, ConfigError> {
    let mut errors = Vec::new();

    let defaults = resolve_defaults(&raw.http, &mut errors);
    let name = raw
        .pipeline
        .unwrap_or_else(|| DEFAULT_PIPELINE_NAME.to_string());

    let mut stages = Vec::new();
    match raw.stages {
        None => errors.push("Missing required key 'stages'".to_string()),
        Some(entries) => {
            for (stage_name, raw_stage) in entries.0 {
                if let Some(stage) =
                    build_stage(stage_name, raw_stage.unwrap_or_default(), &defaults, &mut errors)
                {
                    stages.push(stage);
                }
            }
        }
    }

    let config = PipelineConfig { name, stages };
    validate_stages(&config, &mut errors);

    if errors.is_empty() {
        Ok(config)
    } else {
        Err(ConfigError::Invalid(errors))
    }
}

struct StageDefaults {
    timeout: Duration,
    retries: u32,
    backoff: Duration,
}

fn resolve_defaults(http: &RawHttpDefaults, errors: &mut Vec<String>) -> StageDefaults {
    StageDefaults {
        timeout: http
            .timeout_seconds
            .and_then(|s| seconds(s, "http.timeout_seconds", errors))
            .unwrap_or(DEFAULT_TIMEOUT),
        retries: http
            .retry_attempts
            .and_then(|n| retry_count(n, "http.retry_attempts", errors))
            .unwrap_or(0),
        backoff: http
            .retry_backoff_seconds
            .and_then(|s| seconds(s, "http.retry_backoff_seconds", errors))
            .unwrap_or(Duration::ZERO),
    }
}

fn build_stage(
    name: String,
    raw: RawStageConfig,
    defaults: &StageDefaults,
    errors: &mut Vec<String>,
) -> Option<StageConfig> {
    let context = format!("stage '{name}'");

    let kind = match raw.kind.as_deref() {
        Some(kind) => match kind.parse::<StageKind>() {
            Ok(kind) => kind,
            Err(e) => {
                errors.push(format!("{context}: {e}"));
                return None;
            }
        },
        None => {
            if let Some(kind) = StageKind::infer_from_name(&name) {
                kind
            } else {
                errors.push(format!(
                    "{context}: missing 'kind' and it cannot be inferred from the name"
                ));
                return None;
            }
        }
    };

    let timeout = raw
        .timeout_seconds
        .and_then(|s| seconds(s, &format!("{context}: timeout_seconds"), errors))
        .unwrap_or(defaults.timeout);
    let retries = raw
        .retries
        .and_then(|n| retry_count(n, &format!("{context}: retries"), errors))
        .unwrap_or(defaults.retries);
    let retry_backoff = raw
        .retry_backoff_seconds
        .and_then(|s| seconds(s, &format!("{context}: retry_backoff_seconds"), errors))
        .unwrap_or(defaults.backoff);

    Some(StageConfig {
        name,
        kind,
        base_url: raw.base_url,
        endpoint: raw.endpoint,
        timeout,
        retries,
        retry_backoff,
        enabled: raw.enabled.unwrap_or(true),
        blocking: raw.blocking.unwrap_or(false),
        tie_break: raw.tie_break.unwrap_or_default(),
        missing_key: raw.missing_key.unwrap_or_default(),
        rules: raw.rules.unwrap_or_default(),
    })
}

fn seconds(value: f64, context: &str, errors: &mut Vec<String>) -> Option<Duration> {
    match Duration::try_from_secs_f64(value) {
        Ok(duration) => Some(duration),
        Err(_) => {
            errors.push(format!("{context} must be a non-negative number, got {value}"));
            None
        }
    }
}

fn retry_count(value: i64, context: &str, errors: &mut Vec<String>) -> Option<u32> {
    if let Ok(count) = u32::try_from(value) {
        Some(count)
    } else {
        errors.push(format!("{context} must be >= 0, got {value}"));
        None
    }
}
