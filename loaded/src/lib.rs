#![warn(missing_docs)]
//! # Loaded
//!
//! Concurrent workload benchmarking with hierarchical timing statistics.
//!
//! - **Bounded concurrency**: run a workload N times with at most C iterations in flight
//! - **Hook chains**: before-all and after-all step chains around the iterations
//! - **Step pipelines**: each workload step feeds its output to the next
//! - **Isolated failures**: errors, panics and timeouts are reported per iteration
//! - **Hierarchical statistics**: a sample named `login.request` also counts
//!   towards `login`; every key gets count, sum, mean, median, min, max and
//!   p90/p95/p99
//!
//! ## Quick Start
//!
//! ```ignore
//! use loaded::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     loaded::run(|suite| {
//!         suite.workload(|input| async move {
//!             let timer = input.start_timer("request");
//!             call_service().await?;
//!             timer.stop();
//!             Ok(Args::new())
//!         });
//!     })
//! }
//! ```
//!
//! ## Library Use
//!
//! ```ignore
//! let loaded = Loaded::new();
//! let mut suite = loaded.suite("checkout", 1_000, 20);
//! suite.workload(|input| async move { /* ... */ Ok(Args::new()) });
//! suite.run().await;
//! println!("{:?}", loaded.stats().get("checkout"));
//! ```

// Re-export core types
pub use loaded_core::{NAME_SEPARATOR, Recorder, Sample, Timer};

// Re-export stats
pub use loaded_stats::{Report, StatSummary, compute_summary, percentile};

// Re-export suite types
pub use loaded_suite::{
    ArgError, Args, BoxedStep, Phase, Progress, RunSummary, Step, StepError, StepInput,
    StepResult, Suite, SuiteConfig, SuiteError, step,
};

// Re-export report output
pub use loaded_report::{OutputFormat, RunRecord, format_human_output, generate_json_report};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Args, Loaded, Report, StatSummary, StepError, StepInput, StepResult, Suite, SuiteConfig,
        SuiteError, step,
    };
}

/// Shared recorder plus the suites that write into it
#[derive(Debug, Clone, Default)]
pub struct Loaded {
    recorder: Recorder,
}

impl Loaded {
    /// Create a context with an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a suite that records into this context
    pub fn suite(&self, title: impl Into<String>, iterations: u64, concurrency: usize) -> Suite {
        let config = SuiteConfig::new(title)
            .iterations(iterations)
            .concurrency(concurrency);
        Suite::with_recorder(config, self.recorder.clone())
    }

    /// Start a timer outside of any suite
    pub fn new_timer(&self, name: impl Into<String>) -> Timer {
        self.recorder.start(name)
    }

    /// Discard every recorded timer
    pub fn clear_timers(&self) {
        self.recorder.clear();
    }

    /// Statistics over every completed timer recorded so far
    pub fn stats(&self) -> Report {
        loaded_stats::report(&self.recorder.samples())
    }

    /// Underlying recorder
    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }
}

/// Run the Loaded CLI harness.
///
/// Call this from your workload binary's `main()`:
/// ```ignore
/// fn main() -> anyhow::Result<()> {
///     loaded::run(|suite| { /* register hooks and workload */ })
/// }
/// ```
pub use loaded_cli::run;
