//! Error types for the recordflow orchestrator.
//!
//! Configuration and input errors are fatal before a run starts. Gateway and
//! deduplication errors are fatal to the stage that raised them and halt the
//! run. Quality findings are only errors when a stage is marked blocking.

use thiserror::Error;

/// The main error type for recordflow operations.
#[derive(Debug, Error)]
pub enum RecordflowError {
    /// The pipeline configuration is unusable.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// The input record document is unusable.
    #[error("{0}")]
    Input(#[from] InputError),

    /// A stage failed during execution.
    #[error("{0}")]
    Stage(#[from] StageError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for RecordflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Error raised when the pipeline configuration cannot be loaded or validated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The configuration document could not be read.
    #[error("Failed to read configuration {path}: {message}")]
    Read {
        /// Path of the document.
        path: String,
        /// Underlying IO message.
        message: String,
    },

    /// The configuration document is not valid YAML/JSON for the schema.
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// `${VAR}` references that are not set in the environment.
    #[error("Missing environment variable(s): {}", .0.join(", "))]
    MissingEnv(Vec<String>),

    /// Semantic validation failures, all of them at once.
    #[error("Invalid pipeline configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

impl ConfigError {
    /// Returns the individual validation problems, if any.
    #[must_use]
    pub fn problems(&self) -> &[String] {
        match self {
            Self::Invalid(problems) | Self::MissingEnv(problems) => problems,
            _ => &[],
        }
    }
}

/// Error raised when the input record document cannot be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    /// The input document could not be read.
    #[error("Failed to read input {path}: {message}")]
    Read {
        /// Path of the document.
        path: String,
        /// Underlying IO message.
        message: String,
    },

    /// The input document is not an array of record objects.
    #[error("Failed to parse input records: {0}")]
    Parse(String),
}

/// Error returned by the service gateway after its retry budget is spent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Network failure or timeout on the final attempt.
    #[error("Stage '{stage}' unreachable after {attempts} attempt(s): {message}")]
    Unreachable {
        /// Stage that was called.
        stage: String,
        /// Attempts made, including the first.
        attempts: usize,
        /// Description of the last failure.
        message: String,
    },

    /// Non-2xx status on the final attempt.
    #[error("Stage '{stage}' returned HTTP {code} after {attempts} attempt(s)")]
    BadStatus {
        /// Stage that was called.
        stage: String,
        /// HTTP status code of the last response.
        code: u16,
        /// Attempts made, including the first.
        attempts: usize,
    },

    /// The stage has no gateway route.
    #[error("No route configured for stage '{0}'")]
    UnknownStage(String),
}

impl GatewayError {
    /// Returns the number of attempts made before giving up.
    #[must_use]
    pub fn attempts(&self) -> usize {
        match self {
            Self::Unreachable { attempts, .. } | Self::BadStatus { attempts, .. } => *attempts,
            Self::UnknownStage(_) => 0,
        }
    }
}

/// Error raised when the deduplication key cannot be extracted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DedupError {
    /// A record has no `source_record_id` and the stage rejects such records.
    #[error("Record at position {index} has no source_record_id")]
    MissingKey {
        /// Zero-based position in the stage input.
        index: usize,
    },
}

/// Fatal error raised while a stage is running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    /// The gateway call failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Deduplication key extraction failed.
    #[error(transparent)]
    Dedup(#[from] DedupError),

    /// A blocking quality stage found violations.
    #[error("{failed} of {total} record(s) violated blocking quality rules")]
    QualityViolation {
        /// Records with at least one violation.
        failed: usize,
        /// Records evaluated.
        total: usize,
    },

    /// The stage configuration could not be turned into runnable work.
    #[error("Invalid configuration for stage '{stage}': {message}")]
    InvalidStage {
        /// Stage name.
        stage: String,
        /// What is wrong with it.
        message: String,
    },
}

impl StageError {
    /// Returns a stable machine-readable code for reports.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Gateway(GatewayError::Unreachable { .. }) => "gateway_unreachable",
            Self::Gateway(GatewayError::BadStatus { .. }) => "gateway_bad_status",
            Self::Gateway(GatewayError::UnknownStage(_)) => "gateway_unknown_stage",
            Self::Dedup(_) => "dedup_missing_key",
            Self::QualityViolation { .. } => "quality_violation",
            Self::InvalidStage { .. } => "invalid_stage",
        }
    }
}
