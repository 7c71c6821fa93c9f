//! Reference records and configuration.

use serde_json::json;

use crate::config::{PipelineConfig, RuleCheck, RuleSpec, StageConfig};
use crate::core::{Record, StageKind};

/// Three records: a duplicated `A` whose later copy is invalid, and a valid `B`.
#[must_use]
pub fn scenario_records() -> Vec<Record> {
    vec![
        Record::new("A")
            .with_field("amt", json!(10))
            .with_field("email", "x@y.com"),
        Record::new("A")
            .with_field("amt", json!(-5))
            .with_field("email", "bad"),
        Record::new("B")
            .with_field("amt", json!(20))
            .with_field("email", "z@q.com"),
    ]
}

/// Ingestion, deduplication and quality stages against local services.
///
/// Quality checks `amt` is positive, then `email` is well formed.
#[must_use]
pub fn scenario_config() -> PipelineConfig {
    let stage = |name: &str, kind: StageKind, port: u16| {
        StageConfig::new(name, kind)
            .with_base_url(format!("http://127.0.0.1:{port}"))
            .with_endpoint(format!("/api/v1/{name}"))
    };

    PipelineConfig {
        name: "scenario".to_string(),
        stages: vec![
            stage("dataingestion", StageKind::Ingestion, 8081),
            stage("datadeduplication", StageKind::Deduplication, 8082),
            stage("dataquality", StageKind::Quality, 8083).with_rules(vec![
                RuleSpec::new(
                    "positive_amount",
                    RuleCheck::PositiveNumber {
                        field: "amt".to_string(),
                    },
                ),
                RuleSpec::new(
                    "valid_email",
                    RuleCheck::Email {
                        field: "email".to_string(),
                    },
                ),
            ]),
        ],
    }
}

/// Names of the configured stages, in order.
#[must_use]
pub fn stage_names(config: &PipelineConfig) -> Vec<String> {
    config.stages.iter().map(|s| s.name.clone()).collect()
}
