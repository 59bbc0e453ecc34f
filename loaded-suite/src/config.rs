//! Suite Configuration

use std::time::Duration;

/// Static configuration of a suite.
///
/// Zero `iterations` or `concurrency` are raised to 1. A concurrency above
/// the iteration count is fine; the suite only starts as many workers as
/// there are iterations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteConfig {
    /// Human-readable title
    pub title: String,
    /// Number of times the workload pipeline runs
    pub iterations: u64,
    /// Maximum number of iterations in flight
    pub concurrency: usize,
    /// Abort and report iterations running longer than this
    pub iteration_timeout: Option<Duration>,
}

impl SuiteConfig {
    /// Configuration with the given title and default limits
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Set the iteration count
    pub fn iterations(mut self, iterations: u64) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    /// Set the concurrency bound
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set a per-iteration timeout
    pub fn iteration_timeout(mut self, timeout: Duration) -> Self {
        self.iteration_timeout = Some(timeout);
        self
    }

    /// Number of workers actually started for a run
    pub fn worker_count(&self) -> u64 {
        (self.concurrency.max(1) as u64).min(self.iterations.max(1))
    }
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            title: String::new(),
            iterations: 1,
            concurrency: 1,
            iteration_timeout: None,
        }
    }
}
