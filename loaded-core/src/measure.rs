//! Named Timers
//!
//! A `Timer` measures wall-clock time with `std::time::Instant`. The elapsed
//! value lives in an atomic so that stopping a timer never needs the
//! recorder's lock, even while other iterations are appending to it.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Sentinel stored while the timer is still running.
const RUNNING: u64 = u64::MAX;

struct TimerState {
    name: String,
    started_at: Instant,
    elapsed_nanos: AtomicU64,
}

/// Live handle over a named interval.
///
/// Clones share state: stopping any clone stops them all.
#[derive(Clone)]
pub struct Timer {
    state: Arc<TimerState>,
}

impl Timer {
    /// Start a new timer. Most callers go through `Recorder::start` instead,
    /// which also registers the timer.
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            state: Arc::new(TimerState {
                name: name.into(),
                started_at: Instant::now(),
                elapsed_nanos: AtomicU64::new(RUNNING),
            }),
        }
    }

    /// Stop the timer and return the elapsed time.
    ///
    /// Stopping again recomputes the elapsed time from the same start.
    pub fn stop(&self) -> Duration {
        let elapsed = self.state.started_at.elapsed();
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(RUNNING - 1);
        self.state
            .elapsed_nanos
            .store(nanos.min(RUNNING - 1), Ordering::Release);
        elapsed
    }

    /// Timer name
    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Instant the timer was started
    pub fn started_at(&self) -> Instant {
        self.state.started_at
    }

    /// Elapsed time, or `None` while the timer is running
    pub fn elapsed(&self) -> Option<Duration> {
        match self.state.elapsed_nanos.load(Ordering::Acquire) {
            RUNNING => None,
            nanos => Some(Duration::from_nanos(nanos)),
        }
    }

    /// Whether `stop` has not been called yet
    pub fn is_running(&self) -> bool {
        self.elapsed().is_none()
    }

    /// Capture the current state of the timer.
    pub fn snapshot(&self) -> Sample {
        Sample {
            name: self.state.name.clone(),
            started_at: self.state.started_at,
            elapsed: self.elapsed(),
        }
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("name", &self.state.name)
            .field("started_at", &self.state.started_at)
            .field("elapsed", &self.elapsed())
            .finish()
    }
}

/// Immutable snapshot of a timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// Name, possibly dot-delimited (`"a.b.c"`)
    pub name: String,
    /// Instant the interval started
    pub started_at: Instant,
    /// Elapsed time, `None` for a timer that was still running
    pub elapsed: Option<Duration>,
}

impl Sample {
    /// Build a finished sample directly, e.g. from an externally measured
    /// duration.
    pub fn completed(name: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            name: name.into(),
            started_at: Instant::now(),
            elapsed: Some(elapsed),
        }
    }

    /// Build a sample for an interval that has not finished.
    pub fn running(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started_at: Instant::now(),
            elapsed: None,
        }
    }

    /// Elapsed time in fractional milliseconds
    pub fn elapsed_ms(&self) -> Option<f64> {
        self.elapsed.map(|d| d.as_nanos() as f64 / 1_000_000.0)
    }
}
