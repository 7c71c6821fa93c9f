//! Quality evaluation of records against an ordered rule set.
//!
//! Every rule runs on every record; a record can violate several rules at
//! once. Evaluation only annotates: disposal of failing records is up to the
//! caller.

mod rules;

pub use rules::{
    Predicate, QualityRule, RuleCheck, RuleError, RuleSpec, DEFAULT_AMOUNT_FIELD,
    DEFAULT_EMAIL_FIELD, POSITIVE_AMOUNT, VALID_EMAIL,
};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::core::Record;

/// Notes attached to a record that passed every rule.
pub const PASSED_NOTE: &str = "Record passed default validation rules";

/// The outcome of evaluating one record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QualityVerdict {
    /// True when no rule was violated.
    pub passed: bool,
    /// Names of violated rules, in rule order.
    pub violations: Vec<String>,
    /// Messages of violated rules, in rule order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

impl QualityVerdict {
    /// Returns `VALID` or `INVALID`.
    #[must_use]
    pub fn status_label(&self) -> &'static str {
        if self.passed {
            "VALID"
        } else {
            "INVALID"
        }
    }

    /// Returns the human-readable notes for this verdict.
    #[must_use]
    pub fn notes(&self) -> String {
        if self.passed {
            PASSED_NOTE.to_string()
        } else {
            self.messages.join("; ")
        }
    }
}

/// Applies a fixed, ordered rule set to records.
#[derive(Debug, Clone)]
pub struct QualityEvaluator {
    rules: Vec<QualityRule>,
}

impl Default for QualityEvaluator {
    fn default() -> Self {
        Self::new(vec![
            QualityRule::positive_amount(DEFAULT_AMOUNT_FIELD),
            QualityRule::valid_email(DEFAULT_EMAIL_FIELD),
        ])
    }
}

impl QualityEvaluator {
    /// Creates an evaluator with the given rules.
    #[must_use]
    pub fn new(rules: Vec<QualityRule>) -> Self {
        Self { rules }
    }

    /// Compiles configured rule specs. An empty list yields the default rules.
    pub fn from_specs(specs: &[RuleSpec]) -> Result<Self, RuleError> {
        if specs.is_empty() {
            return Ok(Self::default());
        }

        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(specs.len());
        for spec in specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(RuleError::Duplicate(spec.name.clone()));
            }
            rules.push(spec.compile()?);
        }
        Ok(Self::new(rules))
    }

    /// Appends a rule at the end of the evaluation order.
    #[must_use]
    pub fn with_rule(mut self, rule: QualityRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Returns the configured rule names in order.
    #[must_use]
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(QualityRule::name).collect()
    }

    /// Evaluates a single record against every rule.
    #[must_use]
    pub fn evaluate(&self, record: &Record) -> QualityVerdict {
        let mut violations = Vec::new();
        let mut messages = Vec::new();

        for rule in &self.rules {
            if !rule.check(record) {
                violations.push(rule.name().to_string());
                messages.push(rule.message().to_string());
            }
        }

        QualityVerdict {
            passed: violations.is_empty(),
            violations,
            messages,
        }
    }

    /// Evaluates every record, preserving order.
    #[must_use]
    pub fn evaluate_all(&self, records: &[Record]) -> Vec<QualityVerdict> {
        records.iter().map(|record| self.evaluate(record)).collect()
    }
}
