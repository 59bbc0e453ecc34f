#![warn(missing_docs)]
//! Loaded Statistical Engine
//!
//! Turns recorded samples into a per-name statistics report:
//! - Hierarchy expansion of dot-delimited names (`"a.b"` also counts towards `"a"`)
//! - Count, sum, mean, median, min and max per hierarchy key
//! - Nearest-rank percentiles that stay undefined when the sample set is too
//!   small to support them
//!
//! All values are milliseconds.

mod hierarchy;
mod percentiles;
mod summary;

pub use hierarchy::{Report, group_by_hierarchy, hierarchy_keys, report};
pub use percentiles::{percentile, sort};
pub use summary::{StatSummary, compute_summary, max, mean, median, min, sum};

/// Percentiles included in every `StatSummary`
pub const REPORTED_PERCENTILES: [f64; 3] = [90.0, 95.0, 99.0];
