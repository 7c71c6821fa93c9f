//! Named quality rules and their declarative configuration form.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, LazyLock};
use thiserror::Error;

use crate::core::Record;

/// Name of the built-in amount rule.
pub const POSITIVE_AMOUNT: &str = "positive_amount";

/// Name of the built-in email rule.
pub const VALID_EMAIL: &str = "valid_email";

/// Amount field checked by the default rule set.
pub const DEFAULT_AMOUNT_FIELD: &str = "purchase_amount";

/// Email field checked by the default rule set.
pub const DEFAULT_EMAIL_FIELD: &str = "customer_email";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex")
});

/// A pure predicate over a record. `true` means the record passes.
pub type Predicate = dyn Fn(&Record) -> bool + Send + Sync;

/// A named predicate over a record.
#[derive(Clone)]
pub struct QualityRule {
    name: String,
    message: String,
    predicate: Arc<Predicate>,
}

impl QualityRule {
    /// Creates a rule from a name and predicate.
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Record) -> bool + Send + Sync + 'static,
    {
        let name = name.into();
        Self {
            message: format!("{name} failed"),
            name,
            predicate: Arc::new(predicate),
        }
    }

    /// Sets the human-readable message reported on violation.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// `positive_amount`: the field must be a JSON number greater than zero.
    #[must_use]
    pub fn positive_amount(field: impl Into<String>) -> Self {
        Self::positive_number(POSITIVE_AMOUNT, field)
    }

    /// `valid_email`: the field must be a string shaped like `local@domain.tld`.
    #[must_use]
    pub fn valid_email(field: impl Into<String>) -> Self {
        Self::email(VALID_EMAIL, field)
    }

    /// The field must be a JSON number greater than zero.
    #[must_use]
    pub fn positive_number(name: impl Into<String>, field: impl Into<String>) -> Self {
        let field = field.into();
        let message = format!("{field} must be positive");
        Self::new(name, move |record| {
            record
                .get(&field)
                .and_then(Value::as_f64)
                .is_some_and(|amount| amount > 0.0)
        })
        .with_message(message)
    }

    /// The field must be a string shaped like an email address.
    #[must_use]
    pub fn email(name: impl Into<String>, field: impl Into<String>) -> Self {
        let field = field.into();
        let message = format!("{field} must be a valid email address");
        Self::new(name, move |record| {
            record
                .get(&field)
                .and_then(Value::as_str)
                .is_some_and(|email| EMAIL_RE.is_match(email))
        })
        .with_message(message)
    }

    /// The field must be present, non-null and not an empty string.
    #[must_use]
    pub fn required(name: impl Into<String>, field: impl Into<String>) -> Self {
        let field = field.into();
        let message = format!("{field} is required");
        Self::new(name, move |record| match record.get(&field) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        })
        .with_message(message)
    }

    /// The field must be a string matching `pattern`.
    pub fn matches(
        name: impl Into<String>,
        field: impl Into<String>,
        pattern: &str,
    ) -> Result<Self, regex::Error> {
        let field = field.into();
        let re = Regex::new(pattern)?;
        let message = format!("{field} must match {pattern}");
        Ok(Self::new(name, move |record| {
            record
                .get(&field)
                .and_then(Value::as_str)
                .is_some_and(|value| re.is_match(value))
        })
        .with_message(message))
    }

    /// Returns the rule name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the violation message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Runs the predicate. A panicking predicate counts as a violation.
    #[must_use]
    pub fn check(&self, record: &Record) -> bool {
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (self.predicate)(record))) {
            Ok(passed) => passed,
            Err(_) => {
                tracing::warn!(rule = %self.name, "Quality rule panicked; treating as violation");
                false
            }
        }
    }
}

impl fmt::Debug for QualityRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QualityRule")
            .field("name", &self.name)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Declarative rule as written in the pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    /// Rule name reported in violations.
    pub name: String,
    /// What the rule checks.
    #[serde(flatten)]
    pub check: RuleCheck,
}

/// The check performed by a configured rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleCheck {
    /// Field must be a number greater than zero.
    PositiveNumber {
        /// Field to check.
        field: String,
    },
    /// Field must be an email-shaped string.
    Email {
        /// Field to check.
        field: String,
    },
    /// Field must be present and non-empty.
    Required {
        /// Field to check.
        field: String,
    },
    /// Field must be a string matching a regular expression.
    Regex {
        /// Field to check.
        field: String,
        /// Regular expression.
        pattern: String,
    },
}

/// Error raised when a configured rule cannot be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// The rule name is blank.
    #[error("quality rule with empty name")]
    EmptyName,

    /// The checked field is blank.
    #[error("rule '{0}': field must not be empty")]
    EmptyField(String),

    /// The pattern is not a valid regular expression.
    #[error("rule '{name}': invalid pattern: {message}")]
    InvalidPattern {
        /// Rule name.
        name: String,
        /// Regex compiler message.
        message: String,
    },

    /// Two rules share a name.
    #[error("duplicate quality rule '{0}'")]
    Duplicate(String),
}

impl RuleSpec {
    /// Creates a rule spec.
    #[must_use]
    pub fn new(name: impl Into<String>, check: RuleCheck) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }

    /// Compiles the spec into a runnable rule.
    pub fn compile(&self) -> Result<QualityRule, RuleError> {
        if self.name.trim().is_empty() {
            return Err(RuleError::EmptyName);
        }
        let field = match &self.check {
            RuleCheck::PositiveNumber { field }
            | RuleCheck::Email { field }
            | RuleCheck::Required { field }
            | RuleCheck::Regex { field, .. } => field,
        };
        if field.trim().is_empty() {
            return Err(RuleError::EmptyField(self.name.clone()));
        }

        let rule = match &self.check {
            RuleCheck::PositiveNumber { field } => QualityRule::positive_number(&self.name, field),
            RuleCheck::Email { field } => QualityRule::email(&self.name, field),
            RuleCheck::Required { field } => QualityRule::required(&self.name, field),
            RuleCheck::Regex { field, pattern } => QualityRule::matches(&self.name, field, pattern)
                .map_err(|e| RuleError::InvalidPattern {
                    name: self.name.clone(),
                    message: e.to_string(),
                })?,
        };
        Ok(rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_positive_amount() {
        let rule = QualityRule::positive_amount("amount");

        assert!(rule.check(&Record::new("A").with_field("amount", 10)));
        assert!(rule.check(&Record::new("A").with_field("amount", 0.5)));
        assert!(!rule.check(&Record::new("A").with_field("amount", 0)));
        assert!(!rule.check(&Record::new("A").with_field("amount", -5)));
        assert!(!rule.check(&Record::new("A").with_field("amount", "10")));
        assert!(!rule.check(&Record::new("A")));
        assert_eq!(rule.name(), POSITIVE_AMOUNT);
    }

    #[test]
    fn test_valid_email() {
        let rule = QualityRule::valid_email("email");

        assert!(rule.check(&Record::new("A").with_field("email", "x@y.com")));
        assert!(!rule.check(&Record::new("A").with_field("email", "bad")));
        assert!(!rule.check(&Record::new("A").with_field("email", "a@b")));
        assert!(!rule.check(&Record::new("A").with_field("email", "a b@c.com")));
        assert!(!rule.check(&Record::new("A").with_field("email", 12)));
        assert_eq!(rule.name(), VALID_EMAIL);
    }

    #[test]
    fn test_required() {
        let rule = QualityRule::required("has_country", "country");

        assert!(rule.check(&Record::new("A").with_field("country", "SE")));
        assert!(!rule.check(&Record::new("A").with_field("country", "  ")));
        assert!(!rule.check(&Record::new("A").with_field("country", json!(null))));
        assert!(!rule.check(&Record::new("A")));
    }

    #[test]
    fn test_panicking_predicate_is_a_violation() {
        let rule = QualityRule::new("explodes", |_record| panic!("boom"));
        assert!(!rule.check(&Record::new("A")));
    }

    #[test]
    fn test_rule_spec_deserialize() {
        let spec: RuleSpec = serde_json::from_value(json!({
            "name": "sku_format",
            "kind": "regex",
            "field": "sku",
            "pattern": "^SKU-[0-9]+$"
        }))
        .unwrap();

        assert_eq!(
            spec.check,
            RuleCheck::Regex {
                field: "sku".to_string(),
                pattern: "^SKU-[0-9]+$".to_string()
            }
        );

        let rule = spec.compile().unwrap();
        assert!(rule.check(&Record::new("A").with_field("sku", "SKU-12")));
        assert!(!rule.check(&Record::new("A").with_field("sku", "12")));
    }

    #[test]
    fn test_rule_spec_invalid_pattern() {
        let spec = RuleSpec::new(
            "broken",
            RuleCheck::Regex {
                field: "sku".to_string(),
                pattern: "([".to_string(),
            },
        );
        assert!(matches!(spec.compile(), Err(RuleError::InvalidPattern { .. })));
    }

    #[test]
    fn test_rule_spec_empty_field() {
        let spec = RuleSpec::new(
            "blank",
            RuleCheck::Required {
                field: String::new(),
            },
        );
        assert_eq!(spec.compile().unwrap_err(), RuleError::EmptyField("blank".to_string()));
    }
}
