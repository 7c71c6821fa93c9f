//! Deduplication of records by `source_record_id`.
//!
//! Records are grouped by key in first-seen order and each group collapses to
//! one survivor chosen by a [`TieBreak`]. The survivor takes the slot of the
//! group's first occurrence, so output order follows first appearance.
//!
//! Records without a key are never merged with each other under the default
//! [`MissingKeyPolicy::Singleton`]; [`MissingKeyPolicy::Reject`] turns them
//! into a fatal [`DedupError`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::Record;
use crate::errors::DedupError;

/// Which record of a duplicate group survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The last record in input order wins (latest update).
    #[default]
    Last,
    /// The first record in input order wins.
    First,
}

/// What to do with records that carry no key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingKeyPolicy {
    /// Each keyless record is its own group.
    #[default]
    Singleton,
    /// A keyless record fails the stage.
    Reject,
}

/// Collapses duplicate records. Holds no state between calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deduplicator {
    tie_break: TieBreak,
    missing_key: MissingKeyPolicy,
}

impl Deduplicator {
    /// Creates a deduplicator with the default policies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the tie-break policy.
    #[must_use]
    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Sets the missing-key policy.
    #[must_use]
    pub fn with_missing_key(mut self, policy: MissingKeyPolicy) -> Self {
        self.missing_key = policy;
        self
    }

    /// Returns one record per key, in order of first appearance.
    pub fn dedupe(&self, records: &[Record]) -> Result<Vec<Record>, DedupError> {
        // survivors[slot] is the input index currently holding that slot
        let mut survivors: Vec<usize> = Vec::with_capacity(records.len());
        let mut slots: HashMap<&str, usize> = HashMap::with_capacity(records.len());

        for (index, record) in records.iter().enumerate() {
            match record.source_record_id() {
                Some(key) => match slots.get(key) {
                    Some(&slot) => {
                        if self.tie_break == TieBreak::Last {
                            survivors[slot] = index;
                        }
                    }
                    None => {
                        slots.insert(key, survivors.len());
                        survivors.push(index);
                    }
                },
                None => match self.missing_key {
                    MissingKeyPolicy::Singleton => survivors.push(index),
                    MissingKeyPolicy::Reject => return Err(DedupError::MissingKey { index }),
                },
            }
        }

        Ok(survivors.into_iter().map(|i| records[i].clone()).collect())
    }
}
