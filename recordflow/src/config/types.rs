//! Typed pipeline configuration and its raw document form.

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::time::Duration;

use crate::core::StageKind;
use crate::dedup::{Deduplicator, MissingKeyPolicy, TieBreak};
use crate::gateway::RetryPolicy;
use crate::quality::RuleSpec;

/// Timeout applied when neither the stage nor the `http` block sets one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Immutable configuration for one pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Pipeline name used in logs and reports.
    pub name: String,
    /// Stages in execution order.
    pub stages: Vec<StageConfig>,
}

impl PipelineConfig {
    /// Returns the stage with the given name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&StageConfig> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Returns the enabled stages in order.
    pub fn enabled_stages(&self) -> impl Iterator<Item = &StageConfig> {
        self.stages.iter().filter(|s| s.enabled)
    }
}

/// Settings for a single stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageConfig {
    /// Unique stage name.
    pub name: String,
    /// What the stage does.
    pub kind: StageKind,
    /// Service base URL, e.g. `http://localhost:8081`.
    pub base_url: Option<String>,
    /// Endpoint path, or an absolute URL when `base_url` is unset.
    pub endpoint: Option<String>,
    /// Per-attempt HTTP timeout.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub retries: u32,
    /// Linear backoff base between attempts.
    pub retry_backoff: Duration,
    /// Disabled stages are skipped.
    pub enabled: bool,
    /// Quality stages only: halt the run when any record fails.
    pub blocking: bool,
    /// Deduplication stages only.
    pub tie_break: TieBreak,
    /// Deduplication stages only.
    pub missing_key: MissingKeyPolicy,
    /// Quality stages only. Empty means the default rules.
    pub rules: Vec<RuleSpec>,
}

impl StageConfig {
    /// Creates an enabled stage with default settings and no endpoint.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: StageKind) -> Self {
        Self {
            name: name.into(),
            kind,
            base_url: None,
            endpoint: None,
            timeout: DEFAULT_TIMEOUT,
            retries: 0,
            retry_backoff: Duration::ZERO,
            enabled: true,
            blocking: false,
            tie_break: TieBreak::default(),
            missing_key: MissingKeyPolicy::default(),
            rules: Vec::new(),
        }
    }

    /// Sets the base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry count.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the retry backoff base.
    #[must_use]
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Sets the enabled flag.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the blocking flag.
    #[must_use]
    pub fn with_blocking(mut self, blocking: bool) -> Self {
        self.blocking = blocking;
        self
    }

    /// Sets the deduplication tie-break.
    #[must_use]
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Sets the deduplication missing-key policy.
    #[must_use]
    pub fn with_missing_key(mut self, policy: MissingKeyPolicy) -> Self {
        self.missing_key = policy;
        self
    }

    /// Sets the quality rules.
    #[must_use]
    pub fn with_rules(mut self, rules: Vec<RuleSpec>) -> Self {
        self.rules = rules;
        self
    }

    /// Returns the full URL the gateway posts to.
    #[must_use]
    pub fn url(&self) -> Option<String> {
        let endpoint = self.endpoint.as_deref()?;
        match self.base_url.as_deref() {
            Some(base) => Some(format!(
                "{}/{}",
                base.trim_end_matches('/'),
                endpoint.trim_start_matches('/')
            )),
            None if is_absolute_url(endpoint) => Some(endpoint.to_string()),
            None => None,
        }
    }

    /// Returns the retry policy for gateway calls of this stage.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_retries(self.retries).with_backoff(self.retry_backoff)
    }

    /// Returns the deduplicator configured for this stage.
    #[must_use]
    pub fn deduplicator(&self) -> Deduplicator {
        Deduplicator::new()
            .with_tie_break(self.tie_break)
            .with_missing_key(self.missing_key)
    }
}

pub(crate) fn is_absolute_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Configuration document as written on disk.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawPipelineConfig {
    #[serde(default)]
    pub pipeline: Option<String>,
    #[serde(default)]
    pub http: RawHttpDefaults,
    #[serde(default)]
    pub stages: Option<OrderedStages>,
}

/// Defaults shared by every stage.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawHttpDefaults {
    pub timeout_seconds: Option<f64>,
    pub retry_attempts: Option<i64>,
    pub retry_backoff_seconds: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawStageConfig {
    pub kind: Option<String>,
    pub base_url: Option<String>,
    pub endpoint: Option<String>,
    pub timeout_seconds: Option<f64>,
    pub retries: Option<i64>,
    pub retry_backoff_seconds: Option<f64>,
    pub enabled: Option<bool>,
    pub blocking: Option<bool>,
    pub tie_break: Option<TieBreak>,
    pub missing_key: Option<MissingKeyPolicy>,
    pub rules: Option<Vec<RuleSpec>>,
}

/// Stage mapping with document order preserved.
#[derive(Debug, Default)]
pub(crate) struct OrderedStages(pub Vec<(String, Option<RawStageConfig>)>);

impl<'de> Deserialize<'de> for OrderedStages {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct StagesVisitor;

        impl<'de> Visitor<'de> for StagesVisitor {
            type Value = OrderedStages;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of stage name to stage settings")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((name, stage)) =
                    map.next_entry::<String, Option<RawStageConfig>>()?
                {
                    entries.push((name, stage));
                }
                Ok(OrderedStages(entries))
            }
        }

        deserializer.deserialize_map(StagesVisitor)
    }
}
