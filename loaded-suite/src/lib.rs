#![warn(missing_docs)]
//! Loaded Suite
//!
//! Runs a workload pipeline a fixed number of times with bounded concurrency:
//! - `before_all` chain once, before any iteration
//! - `iterations` runs of the workload, at most `concurrency` in flight
//! - `after_all` chain once, after every iteration finished
//!
//! Failures never escape `Suite::run`; they are delivered to the error handler.

mod config;
mod error;
mod step;
mod suite;

pub use config::SuiteConfig;
pub use error::{ArgError, Phase, SuiteError};
pub use step::{Args, BoxedStep, Step, StepError, StepFuture, StepInput, StepResult, step};
pub use suite::{ErrorHandler, Progress, ProgressObserver, RunSummary, Suite};
