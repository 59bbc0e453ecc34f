//! Hierarchical Report
//!
//! Sample names are dot-delimited paths. A sample named `"a.b.c"` is counted
//! under `"a"`, `"a.b"` and `"a.b.c"`, so a parent key aggregates every
//! descendant plus the samples recorded under its exact name.

use crate::summary::{StatSummary, compute_summary};
use fxhash::FxHashMap;
use loaded_core::{NAME_SEPARATOR, Sample};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Statistics per hierarchy key, ordered by key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Report {
    entries: BTreeMap<String, StatSummary>,
}

impl Report {
    /// Statistics for one key
    pub fn get(&self, key: &str) -> Option<&StatSummary> {
        self.entries.get(key)
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the report has no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate keys and statistics in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &StatSummary)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// All keys in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl FromIterator<(String, StatSummary)> for Report {
    fn from_iter<I: IntoIterator<Item = (String, StatSummary)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Every hierarchy key a name contributes to, shortest first.
///
/// ```
/// # use loaded_stats::hierarchy_keys;
/// let keys: Vec<_> = hierarchy_keys("a.b.c").collect();
/// assert_eq!(keys, ["a", "a.b", "a.b.c"]);
/// ```
pub fn hierarchy_keys(name: &str) -> impl Iterator<Item = &str> {
    name.match_indices(NAME_SEPARATOR)
        .map(move |(i, _)| &name[..i])
        .chain(std::iter::once(name))
}

/// Group finished samples by hierarchy key, in milliseconds.
///
/// Running samples are skipped. Values keep sample order within each key.
pub fn group_by_hierarchy(samples: &[Sample]) -> FxHashMap<String, Vec<f64>> {
    let mut groups: FxHashMap<String, Vec<f64>> = FxHashMap::default();

    for sample in samples {
        let Some(ms) = sample.elapsed_ms() else {
            continue;
        };
        for key in hierarchy_keys(&sample.name) {
            match groups.get_mut(key) {
                Some(values) => values.push(ms),
                None => {
                    groups.insert(key.to_string(), vec![ms]);
                }
            }
        }
    }

    groups
}

/// Build the statistics report for a set of samples.
///
/// Keys are summarized in parallel with Rayon; the result is ordered by key
/// and identical for identical input.
pub fn report(samples: &[Sample]) -> Report {
    let entries = group_by_hierarchy(samples)
        .into_par_iter()
        .map(|(key, values)| (key, compute_summary(&values)))
        .collect();

    Report { entries }
}
