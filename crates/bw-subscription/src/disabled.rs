//! Process-wide registry of disabled filters.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Filter strings the user switched off, across all subscriptions.
///
/// Entries are plain filter text, so they outlive reloads and reordering of
/// the lists they came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DisabledRules(BTreeSet<String>);

impl DisabledRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, filter: &str) -> bool {
        self.0.contains(filter)
    }

    /// Returns `true` if the filter was not disabled before.
    pub fn insert(&mut self, filter: impl Into<String>) -> bool {
        self.0.insert(filter.into())
    }

    /// Returns `true` if the filter was disabled.
    pub fn remove(&mut self, filter: &str) -> bool {
        self.0.remove(filter)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for DisabledRules {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
