#![warn(missing_docs)]
//! Loaded Core - Sample Recording
//!
//! This crate provides the timing primitives shared by every other crate:
//! - `Timer`, a live handle over one named interval
//! - `Sample`, an immutable snapshot of a timer
//! - `Recorder`, the insertion-ordered registry timers are appended to
//!
//! A `Recorder` is an owned context rather than process-wide state. Cloning
//! it yields another handle onto the same registry, which is how a suite hands
//! it to concurrently running iterations.

mod measure;
mod recorder;

pub use measure::{Sample, Timer};
pub use recorder::Recorder;

/// Separator between levels of a hierarchical sample name (`"http.connect"`).
pub const NAME_SEPARATOR: char = '.';
