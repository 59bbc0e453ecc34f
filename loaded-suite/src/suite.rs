//! Iteration Scheduler
//!
//! A `Suite` runs its before-all hooks once, then drives the workload
//! pipeline `iterations` times with at most `concurrency` iterations in
//! flight, then runs its after-all hooks once.
//!
//! ## Scheduling
//!
//! ```text
//!            ┌──────────── dispatch counter (AtomicU64) ────────────┐
//!            │                                                      │
//!   worker 1 ─ claim 1 ─ run ─ claim 4 ─ run ─ ...                  │
//!   worker 2 ─ claim 2 ─ run ──────── claim 5 ─ run ─ ...           │
//!   worker 3 ─ claim 3 ─ run ─ claim 6 ─ ...                        │
//!            └──────────────────────────────────────────────────────┘
//! ```
//!
//! Workers only claim a number after their previous iteration completed.
//! Claiming is a compare-and-swap bounded by the iteration count, so numbers
//! are handed out exactly once each, in increasing order. Every iteration runs
//! in its own task so that a panic is contained and reported like any other
//! failure.

use crate::config::SuiteConfig;
use crate::error::{Phase, SuiteError, panic_message, payload_message};
use crate::step::{BoxedStep, StepInput, StepResult, run_chain, step};
use loaded_core::Recorder;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Receives every error of a run
pub type ErrorHandler = Arc<dyn Fn(&SuiteError) + Send + Sync>;

/// Receives a notification for every dispatched iteration
pub type ProgressObserver = Arc<dyn Fn(Progress) + Send + Sync>;

/// Dispatch notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Number of the iteration just dispatched
    pub iteration: u64,
    /// Total iterations of the run
    pub total: u64,
}

/// Outcome of one `Suite::run`
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Suite title
    pub title: String,
    /// `Done` when every phase ran, otherwise the phase the run stopped in
    pub phase: Phase,
    /// Iterations dispatched (and completed)
    pub dispatched: u64,
    /// Iterations that failed, panicked or timed out
    pub failed_iterations: u64,
    /// Errors delivered to the error handler
    pub errors: u64,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

impl RunSummary {
    /// Whether every phase ran and no error was reported
    pub fn is_clean(&self) -> bool {
        self.phase == Phase::Done && self.errors == 0
    }
}

/// Default error handler: print to stderr
fn log_to_stderr(err: &SuiteError) {
    eprintln!("loaded: {err}");
}

/// Bounded-concurrency runner for a workload pipeline
pub struct Suite {
    config: SuiteConfig,
    recorder: Recorder,
    before_all: Vec<BoxedStep>,
    after_all: Vec<BoxedStep>,
    workload: Vec<BoxedStep>,
    on_error: ErrorHandler,
    on_progress: Option<ProgressObserver>,
    current_iteration: Arc<AtomicU64>,
}

impl Suite {
    /// Create a suite with its own recorder
    pub fn new(config: SuiteConfig) -> Self {
        Self::with_recorder(config, Recorder::new())
    }

    /// Create a suite that records into an existing recorder
    pub fn with_recorder(config: SuiteConfig, recorder: Recorder) -> Self {
        Self {
            config,
            recorder,
            before_all: Vec::new(),
            after_all: Vec::new(),
            workload: Vec::new(),
            on_error: Arc::new(log_to_stderr),
            on_progress: None,
            current_iteration: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Suite title
    pub fn title(&self) -> &str {
        &self.config.title
    }

    /// Suite configuration
    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    /// Recorder handed to every step
    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    /// Number of iterations dispatched so far in the current run (0 when idle)
    pub fn current_iteration(&self) -> u64 {
        self.current_iteration.load(Ordering::Acquire)
    }

    /// Append one step to the workload pipeline.
    ///
    /// The first step of the pipeline receives the iteration number through
    /// `StepInput::iteration`.
    pub fn workload<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(StepInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StepResult> + Send + 'static,
    {
        self.workload.push(step(f));
        self
    }

    /// Replace the whole workload pipeline
    pub fn set_workload(&mut self, steps: impl IntoIterator<Item = BoxedStep>) -> &mut Self {
        self.workload = steps.into_iter().collect();
        self
    }

    /// Append one step to the before-all chain
    pub fn before_all<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(StepInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StepResult> + Send + 'static,
    {
        self.before_all.push(step(f));
        self
    }

    /// Replace the whole before-all chain
    pub fn set_before_all(&mut self, steps: impl IntoIterator<Item = BoxedStep>) -> &mut Self {
        self.before_all = steps.into_iter().collect();
        self
    }

    /// Append one step to the after-all chain
    pub fn after_all<F, Fut>(&mut self, f: F) -> &mut Self
    where
        F: Fn(StepInput) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = StepResult> + Send + 'static,
    {
        self.after_all.push(step(f));
        self
    }

    /// Replace the whole after-all chain
    pub fn set_after_all(&mut self, steps: impl IntoIterator<Item = BoxedStep>) -> &mut Self {
        self.after_all = steps.into_iter().collect();
        self
    }

    /// Replace the error handler. It may be called from several tasks at once.
    pub fn on_error<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&SuiteError) + Send + Sync + 'static,
    {
        self.on_error = Arc::new(handler);
        self
    }

    /// Observe every dispatched iteration
    pub fn on_progress<F>(&mut self, observer: F) -> &mut Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(observer));
        self
    }

    /// Observer installed with `on_progress`, if any
    pub fn progress_observer(&self) -> Option<ProgressObserver> {
        self.on_progress.clone()
    }

    /// Run before-all, every iteration, then after-all.
    ///
    /// Always resolves, exactly once per call. Failures are delivered to the
    /// error handler and counted in the summary; they never abort sibling
    /// iterations. The suite can be run again afterwards.
    pub async fn run(&mut self) -> RunSummary {
        let started = Instant::now();
        self.current_iteration.store(0, Ordering::Release);

        let mut summary = RunSummary {
            title: self.config.title.clone(),
            phase: Phase::Idle,
            dispatched: 0,
            failed_iterations: 0,
            errors: 0,
            elapsed: Duration::ZERO,
        };

        let phase = self.drive(&mut summary).await;

        self.current_iteration.store(0, Ordering::Release);
        summary.phase = phase;
        summary.elapsed = started.elapsed();
        debug!(
            suite = %summary.title,
            phase = %summary.phase,
            dispatched = summary.dispatched,
            failed = summary.failed_iterations,
            "suite finished"
        );
        summary
    }

    /// Run the suite, then hand the summary to `on_complete`.
    pub async fn run_with<F>(&mut self, on_complete: F) -> RunSummary
    where
        F: FnOnce(&RunSummary),
    {
        let summary = self.run().await;
        on_complete(&summary);
        summary
    }

    /// Walk the phases; returns the phase the run ended in.
    async fn drive(&self, summary: &mut RunSummary) -> Phase {
        if self.workload.is_empty() {
            self.report(
                summary,
                &SuiteError::NoWorkload {
                    title: self.config.title.clone(),
                },
            );
            return Phase::Idle;
        }

        debug!(suite = %self.config.title, phase = %Phase::BeforeAll, hooks = self.before_all.len(), "entering phase");
        if let Err(err) = self.run_hooks(Phase::BeforeAll).await {
            self.report(summary, &err);
            return Phase::BeforeAll;
        }

        debug!(
            suite = %self.config.title,
            phase = %Phase::Iterations,
            iterations = self.config.iterations,
            workers = self.config.worker_count(),
            "entering phase"
        );
        let (dispatched, failed) = self.run_iterations().await;
        summary.dispatched = dispatched;
        summary.failed_iterations = failed;
        summary.errors += failed;

        debug!(suite = %self.config.title, phase = %Phase::AfterAll, hooks = self.after_all.len(), "entering phase");
        if let Err(err) = self.run_hooks(Phase::AfterAll).await {
            self.report(summary, &err);
            return Phase::AfterAll;
        }

        Phase::Done
    }

    fn report(&self, summary: &mut RunSummary, err: &SuiteError) {
        summary.errors += 1;
        guarded("error handler", || (self.on_error)(err));
    }

    /// Run one hook chain in its own task.
    async fn run_hooks(&self, phase: Phase) -> Result<(), SuiteError> {
        let steps = match phase {
            Phase::BeforeAll => &self.before_all,
            _ => &self.after_all,
        };
        if steps.is_empty() {
            return Ok(());
        }

        let steps = Arc::<[BoxedStep]>::from(steps.as_slice());
        let recorder = self.recorder.clone();
        let cursor = Arc::new(AtomicUsize::new(0));
        let position = Arc::clone(&cursor);
        let handle =
            tokio::spawn(async move { run_chain(&steps, None, &recorder, &position).await });

        match handle.await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(failure)) => Err(SuiteError::Hook {
                phase,
                index: failure.index,
                source: failure.source,
            }),
            Err(err) => Err(SuiteError::HookPanicked {
                phase,
                index: cursor.load(Ordering::Acquire),
                message: panic_message(err),
            }),
        }
    }

    /// Drain all iterations; returns (dispatched, failed).
    async fn run_iterations(&self) -> (u64, u64) {
        let dispatch = Arc::new(Dispatch {
            pipeline: Arc::from(self.workload.as_slice()),
            recorder: self.recorder.clone(),
            on_error: Arc::clone(&self.on_error),
            on_progress: self.on_progress.clone(),
            counter: Arc::clone(&self.current_iteration),
            total: self.config.iterations.max(1),
            timeout: self.config.iteration_timeout,
            failed: AtomicU64::new(0),
        });

        let mut workers = JoinSet::new();
        for worker in 0..self.config.worker_count() {
            let dispatch = Arc::clone(&dispatch);
            workers.spawn(async move { dispatch.drain(worker).await });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "iteration worker stopped unexpectedly");
            }
        }

        (
            dispatch.counter.load(Ordering::Acquire),
            dispatch.failed.load(Ordering::Acquire),
        )
    }
}

impl std::fmt::Debug for Suite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Suite")
            .field("config", &self.config)
            .field("before_all", &self.before_all.len())
            .field("workload", &self.workload.len())
            .field("after_all", &self.after_all.len())
            .field("current_iteration", &self.current_iteration())
            .finish()
    }
}

/// Call a user callback. A panic inside it is logged and swallowed, so the
/// worker that called it keeps claiming iterations.
fn guarded(callback: &'static str, f: impl FnOnce()) {
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(f)) {
        warn!(callback, message = %payload_message(panic.as_ref()), "callback panicked");
    }
}

/// State shared by the workers of one run
struct Dispatch {
    pipeline: Arc<[BoxedStep]>,
    recorder: Recorder,
    on_error: ErrorHandler,
    on_progress: Option<ProgressObserver>,
    counter: Arc<AtomicU64>,
    total: u64,
    timeout: Option<Duration>,
    failed: AtomicU64,
}

impl Dispatch {
    /// Claim the next iteration number, or `None` once all are dispatched.
    fn claim(&self) -> Option<u64> {
        self.counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.total).then_some(n + 1)
            })
            .ok()
            .map(|previous| previous + 1)
    }

    async fn drain(&self, worker: u64) {
        while let Some(iteration) = self.claim() {
            if let Some(observer) = &self.on_progress {
                let progress = Progress {
                    iteration,
                    total: self.total,
                };
                guarded("progress observer", || observer(progress));
            }
            debug!(worker, iteration, "dispatching iteration");

            if let Err(err) = self.execute(iteration).await {
                self.failed.fetch_add(1, Ordering::AcqRel);
                debug!(worker, iteration, error = %err, "iteration failed");
                guarded("error handler", || (self.on_error)(&err));
            }
        }
    }

    async fn execute(&self, iteration: u64) -> Result<(), SuiteError> {
        let pipeline = Arc::clone(&self.pipeline);
        let recorder = self.recorder.clone();
        let cursor = Arc::new(AtomicUsize::new(0));
        let position = Arc::clone(&cursor);
        let mut handle = tokio::spawn(async move {
            run_chain(&pipeline, Some(iteration), &recorder, &position).await
        });

        let joined = match self.timeout {
            None => handle.await,
            Some(after) => match tokio::time::timeout(after, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    return Err(SuiteError::Timeout { iteration, after });
                }
            },
        };

        match joined {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(failure)) => Err(SuiteError::Iteration {
                iteration,
                step: failure.index,
                source: failure.source,
            }),
            Err(err) => Err(SuiteError::IterationPanicked {
                iteration,
                step: cursor.load(Ordering::Acquire),
                message: panic_message(err),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::{Args, StepError};
    use rand::Rng;
    use std::sync::Mutex;

    fn jitter() -> Duration {
        Duration::from_millis(rand::thread_rng().gen_range(0..=10))
    }

    fn counter() -> Arc<AtomicU64> {
        Arc::new(AtomicU64::new(0))
    }

    /// Error handler that collects error messages
    fn collect_errors(suite: &mut Suite) -> Arc<Mutex<Vec<String>>> {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        suite.on_error(move |err| sink.lock().unwrap().push(err.to_string()));
        errors
    }

    fn counting_workload(suite: &mut Suite, count: &Arc<AtomicU64>) {
        let count = Arc::clone(count);
        suite.workload(move |_input| {
            let count = Arc::clone(&count);
            async move {
                tokio::task::yield_now().await;
                count.fetch_add(1, Ordering::SeqCst);
                Ok(Args::new())
            }
        });
    }

    #[tokio::test]
    async fn test_runs_hook_chains_and_multi_step_workload() {
        let mut suite = Suite::new(SuiteConfig::new("test").iterations(50).concurrency(5));
        let before_count = counter();
        let test_count = counter();
        let after_count = counter();

        let before = Arc::clone(&before_count);
        suite.set_before_all(vec![
            step(|_input| async { Ok(Args::one("test")) }),
            step(move |input| {
                let before = Arc::clone(&before);
                async move {
                    assert_eq!(input.arg::<String>(0)?, "test");
                    before.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, StepError>(Args::new())
                }
            }),
        ]);

        let tests = Arc::clone(&test_count);
        suite.set_workload(vec![
            step(|input| {
                let delay = jitter();
                async move {
                    let timer = input.start_timer("test.1");
                    tokio::time::sleep(delay).await;
                    timer.stop();
                    Ok(Args::one("test"))
                }
            }),
            step(move |input| {
                let tests = Arc::clone(&tests);
                let delay = jitter();
                async move {
                    tests.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(input.arg::<String>(0)?, "test");
                    let timer = input.start_timer("test.2");
                    tokio::time::sleep(delay).await;
                    timer.stop();
                    Ok::<_, StepError>(Args::new())
                }
            }),
        ]);

        let after = Arc::clone(&after_count);
        suite.set_after_all(vec![
            step(|_input| async { Ok(Args::one("test")) }),
            step(move |input| {
                let after = Arc::clone(&after);
                async move {
                    assert_eq!(input.arg::<String>(0)?, "test");
                    after.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, StepError>(Args::new())
                }
            }),
        ]);

        let errors = collect_errors(&mut suite);
        let summary = suite.run().await;

        assert_eq!(before_count.load(Ordering::SeqCst), 1);
        assert_eq!(test_count.load(Ordering::SeqCst), 50);
        assert_eq!(after_count.load(Ordering::SeqCst), 1);
        assert!(errors.lock().unwrap().is_empty());
        assert!(summary.is_clean());
        assert_eq!(summary.dispatched, 50);

        let report = loaded_stats::report(&suite.recorder().samples());
        assert_eq!(report.get("test").unwrap().count, 100);
        assert_eq!(report.get("test.1").unwrap().count, 50);
        assert_eq!(report.get("test.2").unwrap().count, 50);
    }

    #[tokio::test]
    async fn test_single_hooks_and_workload() {
        let mut suite = Suite::new(SuiteConfig::new("test").iterations(50).concurrency(5));
        let before_count = counter();
        let test_count = counter();
        let after_count = counter();

        let before = Arc::clone(&before_count);
        suite.before_all(move |_input| {
            let before = Arc::clone(&before);
            async move {
                before.fetch_add(1, Ordering::SeqCst);
                Ok(Args::one("test"))
            }
        });
        counting_workload(&mut suite, &test_count);
        let after = Arc::clone(&after_count);
        suite.after_all(move |_input| {
            let after = Arc::clone(&after);
            async move {
                after.fetch_add(1, Ordering::SeqCst);
                Ok(Args::one("test"))
            }
        });

        suite.run().await;

        assert_eq!(before_count.load(Ordering::SeqCst), 1);
        assert_eq!(test_count.load(Ordering::SeqCst), 50);
        assert_eq!(after_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exact_iteration_count() {
        for (iterations, concurrency) in [(1, 1), (10, 1), (10, 3), (3, 10), (100, 7), (64, 64)] {
            let mut suite = Suite::new(
                SuiteConfig::new("count")
                    .iterations(iterations)
                    .concurrency(concurrency),
            );
            let count = counter();
            counting_workload(&mut suite, &count);

            let summary = suite.run().await;

            assert_eq!(count.load(Ordering::SeqCst), iterations, "C={concurrency}");
            assert_eq!(summary.dispatched, iterations);
            assert_eq!(suite.current_iteration(), 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_exact_iteration_count_multi_thread() {
        let mut suite = Suite::new(SuiteConfig::new("mt").iterations(500).concurrency(16));
        let count = counter();
        counting_workload(&mut suite, &count);

        let summary = suite.run().await;

        assert_eq!(count.load(Ordering::SeqCst), 500);
        assert_eq!(summary.dispatched, 500);
    }

    #[tokio::test]
    async fn test_concurrency_bound() {
        let mut suite = Suite::new(SuiteConfig::new("bound").iterations(40).concurrency(4));
        let in_flight = counter();
        let peak = counter();

        let (in_flight_ref, peak_ref) = (Arc::clone(&in_flight), Arc::clone(&peak));
        suite.workload(move |_input| {
            let in_flight = Arc::clone(&in_flight_ref);
            let peak = Arc::clone(&peak_ref);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(Args::new())
            }
        });

        suite.run().await;

        assert!(peak.load(Ordering::SeqCst) <= 4);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dispatch_order_on_current_thread() {
        let mut suite = Suite::new(SuiteConfig::new("order").iterations(30).concurrency(4));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        suite.workload(move |input| {
            sink.lock().unwrap().push(input.iteration());
            async move {
                tokio::task::yield_now().await;
                Ok(Args::new())
            }
        });

        suite.run().await;

        let expected: Vec<_> = (1..=30).map(Some).collect();
        assert_eq!(*seen.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_iteration_number_only_on_first_step() {
        let mut suite = Suite::new(SuiteConfig::new("first").iterations(3));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        suite.workload(|input| async move { Ok(Args::one(input.iteration().unwrap_or(0) * 2)) });
        suite.workload(move |input| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().unwrap().push(input.arg::<u64>(0)?);
                Ok::<_, StepError>(Args::new())
            }
        });

        suite.run().await;

        assert_eq!(*seen.lock().unwrap(), vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn test_empty_workload() {
        let mut suite = Suite::new(SuiteConfig::new("empty"));
        let before_count = counter();
        let before = Arc::clone(&before_count);
        suite.before_all(move |_input| {
            let before = Arc::clone(&before);
            async move {
                before.fetch_add(1, Ordering::SeqCst);
                Ok(Args::new())
            }
        });
        let errors = collect_errors(&mut suite);

        let completed = counter();
        let done = Arc::clone(&completed);
        let summary = suite
            .run_with(move |_| {
                done.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert_eq!(completed.load(Ordering::SeqCst), 1);
        assert_eq!(before_count.load(Ordering::SeqCst), 0);
        assert_eq!(summary.phase, Phase::Idle);
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("no workload configured"));
    }

    #[tokio::test]
    async fn test_before_all_failure_skips_iterations() {
        let mut suite = Suite::new(SuiteConfig::new("setup").iterations(10).concurrency(2));
        let count = counter();
        let after_count = counter();

        suite.before_all(|_input| async { Err::<Args, StepError>("no token".into()) });
        let reached = counter();
        let reached_ref = Arc::clone(&reached);
        suite.before_all(move |_input| {
            let reached = Arc::clone(&reached_ref);
            async move {
                reached.fetch_add(1, Ordering::SeqCst);
                Ok(Args::new())
            }
        });
        counting_workload(&mut suite, &count);
        let after = Arc::clone(&after_count);
        suite.after_all(move |_input| {
            let after = Arc::clone(&after);
            async move {
                after.fetch_add(1, Ordering::SeqCst);
                Ok(Args::new())
            }
        });
        let errors = collect_errors(&mut suite);

        let summary = suite.run().await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(reached.load(Ordering::SeqCst), 0);
        assert_eq!(after_count.load(Ordering::SeqCst), 0);
        assert_eq!(summary.phase, Phase::BeforeAll);
        assert_eq!(summary.dispatched, 0);
        assert_eq!(
            *errors.lock().unwrap(),
            vec!["before-all hook #0 failed: no token".to_string()]
        );
    }

    #[tokio::test]
    async fn test_iteration_failures_are_isolated() {
        let mut suite = Suite::new(SuiteConfig::new("flaky").iterations(20).concurrency(3));
        let count = counter();
        let after_count = counter();

        let done = Arc::clone(&count);
        suite.workload(move |input| {
            let done = Arc::clone(&done);
            async move {
                done.fetch_add(1, Ordering::SeqCst);
                match input.iteration() {
                    Some(n) if n % 2 == 0 => Err::<_, StepError>(format!("even iteration {n}").into()),
                    _ => Ok(Args::new()),
                }
            }
        });
        let after = Arc::clone(&after_count);
        suite.after_all(move |_input| {
            let after = Arc::clone(&after);
            async move {
                after.fetch_add(1, Ordering::SeqCst);
                Ok(Args::new())
            }
        });
        let errors = collect_errors(&mut suite);

        let summary = suite.run().await;

        assert_eq!(count.load(Ordering::SeqCst), 20);
        assert_eq!(after_count.load(Ordering::SeqCst), 1);
        assert_eq!(errors.lock().unwrap().len(), 10);
        assert_eq!(summary.dispatched, 20);
        assert_eq!(summary.failed_iterations, 10);
        assert_eq!(summary.phase, Phase::Done);
        assert!(!summary.is_clean());
    }

    #[tokio::test]
    async fn test_after_all_failure_is_reported() {
        let mut suite = Suite::new(SuiteConfig::new("teardown").iterations(4));
        let count = counter();
        counting_workload(&mut suite, &count);
        suite.after_all(|_input| async { Err::<Args, StepError>("cleanup failed".into()) });
        let errors = collect_errors(&mut suite);

        let summary = suite.run().await;

        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert_eq!(summary.phase, Phase::AfterAll);
        assert_eq!(
            *errors.lock().unwrap(),
            vec!["after-all hook #0 failed: cleanup failed".to_string()]
        );
    }

    #[tokio::test]
    async fn test_panicking_iteration_is_contained() {
        let mut suite = Suite::new(SuiteConfig::new("panic").iterations(6).concurrency(2));
        let count = counter();

        let done = Arc::clone(&count);
        suite.workload(move |input| {
            let done = Arc::clone(&done);
            async move {
                if input.iteration() == Some(3) {
                    panic!("iteration three exploded");
                }
                done.fetch_add(1, Ordering::SeqCst);
                Ok(Args::new())
            }
        });
        let errors = collect_errors(&mut suite);

        let summary = suite.run().await;

        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert_eq!(summary.dispatched, 6);
        assert_eq!(
            *errors.lock().unwrap(),
            vec!["iteration 3 panicked at step #0: iteration three exploded".to_string()]
        );
    }

    #[tokio::test]
    async fn test_panicking_error_handler_does_not_stop_dispatch() {
        let mut suite = Suite::new(SuiteConfig::new("handler").iterations(5).concurrency(1));
        let ran = counter();

        let done = Arc::clone(&ran);
        suite.workload(move |input| {
            let done = Arc::clone(&done);
            async move {
                done.fetch_add(1, Ordering::SeqCst);
                if input.iteration() == Some(2) {
                    return Err::<Args, StepError>("refused".into());
                }
                Ok(Args::new())
            }
        });
        suite.on_error(|err| panic!("handler could not report: {err}"));

        let summary = suite.run().await;

        assert_eq!(ran.load(Ordering::SeqCst), 5);
        assert_eq!(summary.dispatched, 5);
        assert_eq!(summary.failed_iterations, 1);
        assert_eq!(summary.phase, Phase::Done);
    }

    #[tokio::test]
    async fn test_panicking_progress_observer_does_not_stop_dispatch() {
        let mut suite = Suite::new(SuiteConfig::new("observer").iterations(6).concurrency(2));
        let count = counter();
        counting_workload(&mut suite, &count);
        suite.on_progress(|progress| {
            if progress.iteration % 2 == 1 {
                panic!("observer failed at {}", progress.iteration);
            }
        });
        let errors = collect_errors(&mut suite);

        let summary = suite.run().await;

        assert_eq!(count.load(Ordering::SeqCst), 6);
        assert_eq!(summary.dispatched, 6);
        assert!(errors.lock().unwrap().is_empty());
        assert!(summary.is_clean());
    }

    #[tokio::test]
    async fn test_panics_name_the_step() {
        let mut suite = Suite::new(SuiteConfig::new("located").iterations(1));
        suite.before_all(|_input| async { Ok(Args::new()) });
        suite.before_all(|input| async move {
            if input.iteration().is_none() {
                panic!("token store unavailable");
            }
            Ok(Args::new())
        });
        let count = counter();
        counting_workload(&mut suite, &count);
        let errors = collect_errors(&mut suite);

        let summary = suite.run().await;

        assert_eq!(summary.phase, Phase::BeforeAll);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(
            *errors.lock().unwrap(),
            vec!["before-all hook #1 panicked: token store unavailable".to_string()]
        );

        let mut suite = Suite::new(SuiteConfig::new("located").iterations(1));
        suite.workload(|_input| async { Ok(Args::new()) });
        // Only the first step sees the iteration number
        suite.workload(|input| async move {
            if input.iteration().is_none() {
                panic!("bad response");
            }
            Ok(Args::new())
        });
        let errors = collect_errors(&mut suite);

        suite.run().await;

        assert_eq!(
            *errors.lock().unwrap(),
            vec!["iteration 1 panicked at step #1: bad response".to_string()]
        );
    }

    /// Counts WARN events
    struct WarnCounter(Arc<AtomicU64>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarnCounter {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn test_failures_reach_only_the_error_handler() {
        use tracing_subscriber::layer::SubscriberExt;

        let warnings = counter();
        let subscriber =
            tracing_subscriber::registry().with(WarnCounter(Arc::clone(&warnings)));
        let _guard = tracing::subscriber::set_default(subscriber);

        let mut suite = Suite::new(SuiteConfig::new("quiet").iterations(4).concurrency(2));
        suite.workload(|_input| async { Err::<Args, StepError>("refused".into()) });
        let errors = collect_errors(&mut suite);

        suite.run().await;

        assert_eq!(errors.lock().unwrap().len(), 4);
        assert_eq!(warnings.load(Ordering::SeqCst), 0);

        // A panicking handler is the one case that warns
        suite.on_error(|_err| panic!("sink closed"));
        suite.run().await;
        assert_eq!(warnings.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_iteration_timeout() {
        let mut suite = Suite::new(
            SuiteConfig::new("stall")
                .iterations(3)
                .concurrency(3)
                .iteration_timeout(Duration::from_millis(20)),
        );
        suite.workload(|_input| async {
            std::future::pending::<()>().await;
            Ok(Args::new())
        });
        let errors = collect_errors(&mut suite);

        let summary = suite.run().await;

        assert_eq!(summary.dispatched, 3);
        assert_eq!(summary.failed_iterations, 3);
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| e.contains("timed out after 20ms")));
    }

    #[tokio::test]
    async fn test_suite_is_reusable() {
        let mut suite = Suite::new(SuiteConfig::new("again").iterations(7).concurrency(3));
        let count = counter();
        let before_count = counter();
        let before = Arc::clone(&before_count);
        suite.before_all(move |_input| {
            let before = Arc::clone(&before);
            async move {
                before.fetch_add(1, Ordering::SeqCst);
                Ok(Args::new())
            }
        });
        counting_workload(&mut suite, &count);

        let first = suite.run().await;
        let second = suite.run().await;

        assert_eq!(first.dispatched, 7);
        assert_eq!(second.dispatched, 7);
        assert_eq!(count.load(Ordering::SeqCst), 14);
        assert_eq!(before_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_append_then_replace() {
        let mut suite = Suite::new(SuiteConfig::new("setters").iterations(2));
        let calls = Arc::new(Mutex::new(Vec::new()));

        let log = |name: &'static str, calls: &Arc<Mutex<Vec<&'static str>>>| {
            let calls = Arc::clone(calls);
            step(move |_input| {
                calls.lock().unwrap().push(name);
                async { Ok(Args::new()) }
            })
        };

        suite.set_workload(vec![log("a", &calls)]);
        suite.set_workload(vec![log("b", &calls), log("c", &calls)]);
        let sink = Arc::clone(&calls);
        suite.workload(move |_input| {
            sink.lock().unwrap().push("d");
            async { Ok(Args::new()) }
        });

        suite.run().await;

        assert_eq!(*calls.lock().unwrap(), vec!["b", "c", "d", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_progress_observer() {
        let mut suite = Suite::new(SuiteConfig::new("progress").iterations(5).concurrency(2));
        let count = counter();
        counting_workload(&mut suite, &count);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        suite.on_progress(move |progress| sink.lock().unwrap().push(progress));

        suite.run().await;

        assert!(suite.progress_observer().is_some());
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 5);
        assert!(seen.iter().all(|p| p.total == 5));
        let mut numbers: Vec<_> = seen.iter().map(|p| p.iteration).collect();
        numbers.sort_unstable();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    }
}
