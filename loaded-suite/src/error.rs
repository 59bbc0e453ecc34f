//! Suite Errors
//!
//! Every failure is local to its unit of work (one hook chain or one
//! iteration) and is delivered to the suite's error handler. Nothing here is
//! ever returned from `Suite::run`.

use crate::step::StepError;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Lifecycle phase of a suite run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Not started, or stopped before any hook ran
    Idle,
    /// Running the before-all hook chain
    BeforeAll,
    /// Running iterations
    Iterations,
    /// Running the after-all hook chain
    AfterAll,
    /// Every phase completed
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "idle",
            Phase::BeforeAll => "before-all",
            Phase::Iterations => "iterations",
            Phase::AfterAll => "after-all",
            Phase::Done => "done",
        })
    }
}

/// Errors reported to a suite's error handler
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SuiteError {
    /// `run` was called without any workload step
    #[error("no workload configured for suite {title:?}")]
    NoWorkload {
        /// Suite title
        title: String,
    },

    /// A before-all or after-all step returned an error
    #[error("{phase} hook #{index} failed: {source}")]
    Hook {
        /// `BeforeAll` or `AfterAll`
        phase: Phase,
        /// Position of the failing step in its chain
        index: usize,
        /// Error returned by the step
        #[source]
        source: StepError,
    },

    /// A workload step returned an error
    #[error("iteration {iteration} failed at step #{step}: {source}")]
    Iteration {
        /// Iteration number
        iteration: u64,
        /// Position of the failing step in the pipeline
        step: usize,
        /// Error returned by the step
        #[source]
        source: StepError,
    },

    /// An iteration exceeded the configured timeout and was aborted
    #[error("iteration {iteration} timed out after {after:?}")]
    Timeout {
        /// Iteration number
        iteration: u64,
        /// Configured timeout
        after: Duration,
    },

    /// A workload step panicked
    #[error("iteration {iteration} panicked at step #{step}: {message}")]
    IterationPanicked {
        /// Iteration number
        iteration: u64,
        /// Position of the panicking step in the pipeline
        step: usize,
        /// Panic payload
        message: String,
    },

    /// A hook step panicked
    #[error("{phase} hook #{index} panicked: {message}")]
    HookPanicked {
        /// `BeforeAll` or `AfterAll`
        phase: Phase,
        /// Position of the panicking step in its chain
        index: usize,
        /// Panic payload
        message: String,
    },
}

impl SuiteError {
    /// Iteration the error belongs to, if any
    pub fn iteration(&self) -> Option<u64> {
        match self {
            SuiteError::Iteration { iteration, .. }
            | SuiteError::Timeout { iteration, .. }
            | SuiteError::IterationPanicked { iteration, .. } => Some(*iteration),
            _ => None,
        }
    }
}

/// Errors from reading or writing step arguments
#[derive(Debug, Error)]
pub enum ArgError {
    /// The previous step returned fewer values
    #[error("missing step argument #{0}")]
    Missing(usize),

    /// The value could not be decoded into the requested type
    #[error("step argument #{index} has an unexpected shape: {source}")]
    Decode {
        /// Argument position
        index: usize,
        /// Decoding error
        #[source]
        source: serde_json::Error,
    },

    /// The value could not be encoded
    #[error("step argument could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Extract a readable message from a task's panic payload.
pub(crate) fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return "task was cancelled".to_string();
    }
    payload_message(err.into_panic().as_ref())
}

/// Readable text of a panic payload
pub(crate) fn payload_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
