//! Configuration parsing with environment variable substitution.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::types::{PipelineConfig, RawPipelineConfig};
use super::validator::build_pipeline;
use crate::errors::ConfigError;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Syntax of a configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigFormat {
    /// YAML (default).
    #[default]
    Yaml,
    /// JSON.
    Json,
}

impl ConfigFormat {
    /// Picks the format from a file extension; anything but `.json` is YAML.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Substitute `${VAR_NAME}` patterns with environment variable values.
pub fn substitute_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut missing = Vec::new();

    let result = ENV_VAR_RE.replace_all(input, |caps: &regex::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| {
            missing.push(caps[1].to_string());
            String::new()
        })
    });

    if missing.is_empty() {
        Ok(result.into_owned())
    } else {
        Err(ConfigError::MissingEnv(missing))
    }
}

/// Parse a configuration string (after env var substitution).
pub fn parse_config_str(text: &str, format: ConfigFormat) -> Result<PipelineConfig, ConfigError> {
    let substituted = substitute_env_vars(text)?;
    let raw: RawPipelineConfig = match format {
        ConfigFormat::Yaml => {
            serde_yaml::from_str(&substituted).map_err(|e| ConfigError::Parse(e.to_string()))?
        }
        ConfigFormat::Json => {
            serde_json::from_str(&substituted).map_err(|e| ConfigError::Parse(e.to_string()))?
        }
    };
    build_pipeline(raw)
}

/// Load and validate a configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<PipelineConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let config = parse_config_str(&content, ConfigFormat::from_path(path))?;
    tracing::debug!(
        path = %path.display(),
        pipeline = %config.name,
        stages = config.stages.len(),
        "Loaded pipeline configuration"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageKind;
    use crate::dedup::{MissingKeyPolicy, TieBreak};
    use std::io::Write;
    use std::time::Duration;

    const SAMPLE: &str = r"
pipeline: data-platform
http:
  timeout_seconds: 5
  retry_attempts: 2
stages:
  dataingestion:
    base_url: http://localhost:8081
    endpoint: /api/v1/dataingestion
  datadeduplication:
    base_url: http://localhost:8082
    endpoint: /api/v1/datadeduplication
    retries: 0
    tie_break: first
    missing_key: reject
  dataquality:
    base_url: http://localhost:8083
    endpoint: /api/v1/dataquality
    timeout_seconds: 1.5
    blocking: true
    rules:
      - name: positive_amount
        kind: positive_number
        field: amt
      - name: valid_email
        kind: email
        field: email
";

    #[test]
    fn test_parse_sample() {
        let config = parse_config_str(SAMPLE, ConfigFormat::Yaml).unwrap();

        assert_eq!(config.name, "data-platform");
        let names: Vec<&str> = config.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["dataingestion", "datadeduplication", "dataquality"]);

        let ingest = &config.stages[0];
        assert_eq!(ingest.kind, StageKind::Ingestion);
        assert_eq!(ingest.timeout, Duration::from_secs(5));
        assert_eq!(ingest.retries, 2);
        assert!(ingest.enabled);

        let dedup = &config.stages[1];
        assert_eq!(dedup.retries, 0);
        assert_eq!(dedup.tie_break, TieBreak::First);
        assert_eq!(dedup.missing_key, MissingKeyPolicy::Reject);

        let quality = &config.stages[2];
        assert_eq!(quality.timeout, Duration::from_millis(1500));
        assert!(quality.blocking);
        assert_eq!(quality.rules.len(), 2);
    }

    #[test]
    fn test_missing_endpoint_is_config_error() {
        let yaml = "stages:\n  dataingestion:\n    base_url: http://localhost:8081\n    enabled: true\n";
        let err = parse_config_str(yaml, ConfigFormat::Yaml).unwrap_err();
        assert!(err.to_string().contains("missing required field 'endpoint'"));
    }

    #[test]
    fn test_missing_stages_key() {
        let err = parse_config_str("pipeline: p\n", ConfigFormat::Yaml).unwrap_err();
        assert!(err.to_string().contains("'stages'"));
    }

    #[test]
    fn test_unknown_kind_and_negative_retries() {
        let yaml = r"
stages:
  storage:
    endpoint: http://localhost/x
  dataingestion:
    endpoint: http://localhost/y
    retries: -1
";
        let err = parse_config_str(yaml, ConfigFormat::Yaml).unwrap_err();
        let problems = err.problems();
        assert!(problems.iter().any(|p| p.contains("cannot be inferred")));
        assert!(problems.iter().any(|p| p.contains("retries must be >= 0")));
    }

    #[test]
    fn test_parse_json() {
        let json = r#"{
            "pipeline": "json-pipeline",
            "stages": {
                "quality": {"kind": "quality", "endpoint": "http://q.local/check"},
                "ingest": {"kind": "ingestion", "endpoint": "http://i.local/in", "enabled": false}
            }
        }"#;
        let config = parse_config_str(json, ConfigFormat::Json).unwrap();
        assert_eq!(config.stages[0].name, "quality");
        assert_eq!(config.stages[1].name, "ingest");
        assert!(!config.stages[1].enabled);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("RF_TEST_INGEST_HOST", "ingest.example.com");
        let result = substitute_env_vars("base_url: http://${RF_TEST_INGEST_HOST}:8081").unwrap();
        assert_eq!(result, "base_url: http://ingest.example.com:8081");
        std::env::remove_var("RF_TEST_INGEST_HOST");
    }

    #[test]
    fn test_missing_env_var() {
        let err = substitute_env_vars("${RF_TEST_DEFINITELY_UNSET_VAR}").unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingEnv(vec!["RF_TEST_DEFINITELY_UNSET_VAR".to_string()])
        );
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.stages.len(), 3);
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("/nonexistent/recordflow.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.JSON")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("a.yml")), ConfigFormat::Yaml);
    }
}
