//! Pipeline Steps
//!
//! A step is an async function from `StepInput` to `Result<Args, StepError>`.
//! Steps are chained: the `Args` returned by one step become the input of the
//! next. The first workload step of every iteration sees the iteration number;
//! hook steps see none.

use crate::error::ArgError;
use loaded_core::{Recorder, Timer};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Error type returned by steps. Any `std::error::Error` converts with `?`.
pub type StepError = Box<dyn std::error::Error + Send + Sync>;

/// Output of a step
pub type StepResult = Result<Args, StepError>;

/// Boxed future returned by `Step::call`
pub type StepFuture = Pin<Box<dyn Future<Output = StepResult> + Send>>;

/// Shared, type-erased step
pub type BoxedStep = Arc<dyn Step>;

/// One stage of a workload pipeline or hook chain.
///
/// Implemented for every `Fn(StepInput) -> impl Future<Output = StepResult>`,
/// so plain async closures can be registered directly.
pub trait Step: Send + Sync + 'static {
    /// Run the step
    fn call(&self, input: StepInput) -> StepFuture;
}

impl<F, Fut> Step for F
where
    F: Fn(StepInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StepResult> + Send + 'static,
{
    fn call(&self, input: StepInput) -> StepFuture {
        Box::pin(self(input))
    }
}

/// Box an async closure into a `BoxedStep`, e.g. to build a `Vec` for
/// `Suite::set_workload`.
pub fn step<F, Fut>(f: F) -> BoxedStep
where
    F: Fn(StepInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StepResult> + Send + 'static,
{
    Arc::new(f)
}

/// Values passed from one step to the next.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Args(Vec<Value>);

impl Args {
    /// No values
    pub fn new() -> Self {
        Self::default()
    }

    /// A single value
    pub fn one(value: impl Into<Value>) -> Self {
        Self(vec![value.into()])
    }

    /// Append a value, builder style
    pub fn with(mut self, value: impl Into<Value>) -> Self {
        self.push(value);
        self
    }

    /// Append a value
    pub fn push(&mut self, value: impl Into<Value>) {
        self.0.push(value.into());
    }

    /// Append any serializable value
    pub fn push_serialized<T: Serialize>(&mut self, value: &T) -> Result<(), ArgError> {
        self.0.push(serde_json::to_value(value)?);
        Ok(())
    }

    /// Decode the value at `index`
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, ArgError> {
        let value = self.0.get(index).ok_or(ArgError::Missing(index))?;
        T::deserialize(value).map_err(|source| ArgError::Decode { index, source })
    }

    /// Raw value at `index`
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no values
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Take the raw values
    pub fn into_values(self) -> Vec<Value> {
        self.0
    }
}

impl From<Vec<Value>> for Args {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl FromIterator<Value> for Args {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Everything a step receives.
#[derive(Debug, Clone)]
pub struct StepInput {
    iteration: Option<u64>,
    args: Args,
    recorder: Recorder,
}

impl StepInput {
    /// Assemble an input by hand, e.g. to unit-test a step.
    pub fn new(iteration: Option<u64>, args: Args, recorder: Recorder) -> Self {
        Self {
            iteration,
            args,
            recorder,
        }
    }

    /// Iteration number (1-based) for workload steps, `None` for hooks
    pub fn iteration(&self) -> Option<u64> {
        self.iteration
    }

    /// Values returned by the previous step
    pub fn args(&self) -> &Args {
        &self.args
    }

    /// Decode one value returned by the previous step
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, ArgError> {
        self.args.get(index)
    }

    /// Take the values returned by the previous step
    pub fn into_args(self) -> Args {
        self.args
    }

    /// Recorder shared by the whole suite
    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// Start a named timer on the suite's recorder
    pub fn start_timer(&self, name: impl Into<String>) -> Timer {
        self.recorder.start(name)
    }
}

/// A step in a chain returned an error.
#[derive(Debug)]
pub(crate) struct ChainFailure {
    pub(crate) index: usize,
    pub(crate) source: StepError,
}

/// Run steps strictly in order, feeding each step's output to the next.
///
/// `cursor` holds the index of the step currently running, so a panic can be
/// attributed after the task died.
pub(crate) async fn run_chain(
    steps: &[BoxedStep],
    iteration: Option<u64>,
    recorder: &Recorder,
    cursor: &AtomicUsize,
) -> Result<Args, ChainFailure> {
    let mut args = Args::new();
    for (index, step) in steps.iter().enumerate() {
        cursor.store(index, Ordering::Release);
        let input = StepInput::new(iteration, args, recorder.clone());
        args = step
            .call(input)
            .await
            .map_err(|source| ChainFailure { index, source })?;
    }
    Ok(args)
}
