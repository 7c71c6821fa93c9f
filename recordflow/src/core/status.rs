//! Stage status and kind enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of work a stage performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Posts every working record to the ingestion service.
    Ingestion,
    /// Collapses records sharing a `source_record_id`.
    Deduplication,
    /// Applies quality rules and annotates each record with a verdict.
    Quality,
}

impl StageKind {
    /// Infers the kind from a conventional stage name such as `dataingestion`.
    #[must_use]
    pub fn infer_from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.contains("ingest") {
            Some(Self::Ingestion)
        } else if lower.contains("dedup") {
            Some(Self::Deduplication)
        } else if lower.contains("quality") {
            Some(Self::Quality)
        } else {
            None
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingestion => write!(f, "ingestion"),
            Self::Deduplication => write!(f, "deduplication"),
            Self::Quality => write!(f, "quality"),
        }
    }
}

impl FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ingestion" => Ok(Self::Ingestion),
            "deduplication" | "dedup" => Ok(Self::Deduplication),
            "quality" => Ok(Self::Quality),
            other => Err(format!("unknown stage kind '{other}'")),
        }
    }
}

/// The execution status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage is waiting for its turn in the sequence.
    Pending,
    /// Stage is currently running.
    Running,
    /// Stage completed successfully.
    Succeeded,
    /// Stage was disabled and passed its input through.
    Skipped,
    /// Stage failed fatally.
    Failed,
}

impl Default for StageStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped | Self::Failed)
    }

    /// Returns true if the status indicates success.
    ///
    /// A skipped stage counts as success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Skipped)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_kind_display() {
        assert_eq!(StageKind::Ingestion.to_string(), "ingestion");
        assert_eq!(StageKind::Deduplication.to_string(), "deduplication");
        assert_eq!(StageKind::Quality.to_string(), "quality");
    }

    #[test]
    fn test_stage_kind_infer_from_name() {
        assert_eq!(StageKind::infer_from_name("dataingestion"), Some(StageKind::Ingestion));
        assert_eq!(
            StageKind::infer_from_name("datadeduplication"),
            Some(StageKind::Deduplication)
        );
        assert_eq!(StageKind::infer_from_name("DataQuality"), Some(StageKind::Quality));
        assert_eq!(StageKind::infer_from_name("datastorage"), None);
    }

    #[test]
    fn test_stage_kind_from_str() {
        assert_eq!("dedup".parse::<StageKind>(), Ok(StageKind::Deduplication));
        assert!("storage".parse::<StageKind>().is_err());
    }

    #[test]
    fn test_stage_status_is_terminal() {
        assert!(StageStatus::Succeeded.is_terminal());
        assert!(StageStatus::Skipped.is_terminal());
        assert!(StageStatus::Failed.is_terminal());
        assert!(!StageStatus::Pending.is_terminal());
        assert!(!StageStatus::Running.is_terminal());
    }

    #[test]
    fn test_skipped_counts_as_success() {
        assert!(StageStatus::Skipped.is_success());
        assert!(!StageStatus::Failed.is_success());
        assert!(StageStatus::Failed.is_failure());
    }

    #[test]
    fn test_stage_status_serialize() {
        let json = serde_json::to_string(&StageStatus::Succeeded).unwrap();
        assert_eq!(json, r#""succeeded""#);

        let deserialized: StageStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, StageStatus::Succeeded);
    }
}
