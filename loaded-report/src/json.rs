//! JSON Output

use chrono::{DateTime, Utc};
use loaded_stats::Report;
use loaded_suite::{Phase, RunSummary};
use serde::{Deserialize, Serialize};

/// A finished run: what was executed and the statistics it produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// When the record was created
    pub timestamp: DateTime<Utc>,
    /// Suite title
    pub title: String,
    /// Phase the run ended in (`done` for a complete run)
    pub phase: Phase,
    /// Iterations dispatched
    pub dispatched: u64,
    /// Iterations that failed, panicked or timed out
    pub failed_iterations: u64,
    /// Errors delivered to the error handler
    pub errors: u64,
    /// Wall-clock duration of the run in milliseconds
    pub elapsed_ms: f64,
    /// Statistics per hierarchy key
    pub stats: Report,
}

impl RunRecord {
    /// Couple a run summary with the statistics of its samples
    pub fn new(summary: &RunSummary, stats: Report) -> Self {
        Self {
            timestamp: Utc::now(),
            title: summary.title.clone(),
            phase: summary.phase,
            dispatched: summary.dispatched,
            failed_iterations: summary.failed_iterations,
            errors: summary.errors,
            elapsed_ms: summary.elapsed.as_nanos() as f64 / 1_000_000.0,
            stats,
        }
    }
}

/// Generate a prettified JSON report.
pub fn generate_json_report(record: &RunRecord) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(record)
}
