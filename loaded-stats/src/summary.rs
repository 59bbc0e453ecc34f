//! Summary Statistics
//!
//! Basic descriptive statistics over one hierarchy key's values. Empty input
//! yields `0.0` rather than an error; the aggregator never produces an empty
//! key, and the helpers are lenient for direct callers.

use crate::REPORTED_PERCENTILES;
use crate::percentiles::{percentile, sort};
use serde::{Deserialize, Serialize};

/// Statistics for one hierarchy key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatSummary {
    /// Number of samples
    pub count: usize,
    /// Total time
    pub sum: f64,
    /// Arithmetic mean
    pub mean: f64,
    /// Median (average of the two middle values for an even count)
    pub median: f64,
    /// Fastest sample
    pub min: f64,
    /// Slowest sample
    pub max: f64,
    /// 90th percentile, `None` when undefined
    #[serde(rename = "90percentile")]
    pub p90: Option<f64>,
    /// 95th percentile, `None` when undefined
    #[serde(rename = "95percentile")]
    pub p95: Option<f64>,
    /// 99th percentile, `None` when undefined
    #[serde(rename = "99percentile")]
    pub p99: Option<f64>,
}

/// Compute the summary for a list of values.
///
/// Works on a private copy; `values` keeps its order.
pub fn compute_summary(values: &[f64]) -> StatSummary {
    let mut working = values.to_vec();
    sort(&mut working);

    let [p90, p95, p99] = REPORTED_PERCENTILES.map(|p| percentile(&mut working, p));

    StatSummary {
        count: working.len(),
        sum: sum(&working),
        mean: mean(&working),
        median: median(&mut working),
        min: min(&working),
        max: max(&working),
        p90,
        p95,
        p99,
    }
}

/// Sum of all values
pub fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

/// Arithmetic mean
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    sum(values) / values.len() as f64
}

/// Median of the values.
///
/// Sorts `values` in place as a side effect.
pub fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    sort(values);

    let half = values.len() / 2;
    if values.len() % 2 == 1 {
        values[half]
    } else {
        (values[half - 1] + values[half]) / 2.0
    }
}

/// Smallest value
pub fn min(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::min).unwrap_or(0.0)
}

/// Largest value
pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().reduce(f64::max).unwrap_or(0.0)
}
