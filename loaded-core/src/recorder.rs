//! Sample Registry
//!
//! Append-only, insertion-ordered list of timers. Order matters: the
//! aggregator groups values per name in the order samples were recorded.

use crate::measure::{Sample, Timer};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared registry of timers.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    timers: Arc<Mutex<Vec<Timer>>>,
}

impl Recorder {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a timer and append it to the registry.
    ///
    /// Names do not have to be unique.
    pub fn start(&self, name: impl Into<String>) -> Timer {
        let timer = Timer::start(name);
        self.lock().push(timer.clone());
        timer
    }

    /// Snapshot every registered timer, running or stopped, in insertion
    /// order.
    pub fn samples(&self) -> Vec<Sample> {
        self.lock().iter().map(Timer::snapshot).collect()
    }

    /// Remove every registered timer.
    ///
    /// Timers handed out earlier keep working, they are just no longer part
    /// of this registry.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of registered timers
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no timer is registered
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Timer>> {
        // A panicking iteration must not take the registry down with it.
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
