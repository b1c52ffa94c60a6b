//! Per-type record counters

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Number of records processed per type during a session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    counts: BTreeMap<String, u64>,
}

impl Stats {
    /// Create empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more record of `type_name`
    pub fn increment(&mut self, type_name: &str) {
        match self.counts.get_mut(type_name) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(type_name.to_string(), 1);
            }
        }
    }

    /// Records counted for `type_name`
    pub fn get(&self, type_name: &str) -> u64 {
        self.counts.get(type_name).copied().unwrap_or(0)
    }

    /// Records counted across all types
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Number of distinct types seen
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// True if nothing was counted
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterate `(type, count)` pairs in type name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Borrow the underlying map
    pub fn as_map(&self) -> &BTreeMap<String, u64> {
        &self.counts
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (type_name, count) in self.iter() {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", type_name, count)?;
            first = false;
        }
        Ok(())
    }
}
