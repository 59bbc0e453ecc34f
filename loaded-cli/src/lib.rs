#![warn(missing_docs)]
//! Loaded CLI Library
//!
//! Turns a workload definition into a runnable binary. Call
//! `loaded_cli::run()` from `main` with a closure that registers the suite's
//! hooks and workload; iteration count, concurrency and output are then
//! controlled from the command line or a `loaded.toml` file.
//!
//! # Example
//!
//! ```ignore
//! fn main() -> anyhow::Result<()> {
//!     loaded_cli::run(|suite| {
//!         suite.workload(|input| async move {
//!             let timer = input.start_timer("request");
//!             // ...
//!             timer.stop();
//!             Ok(loaded_suite::Args::new())
//!         });
//!     })
//! }
//! ```

mod config;

pub use config::*;

use clap::Parser;
use loaded_report::{OutputFormat, RunRecord, render};
use loaded_suite::{Phase, Progress, Suite, SuiteConfig};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Loaded CLI arguments
#[derive(Parser, Debug, Default)]
#[command(name = "loaded")]
#[command(author, version, about = "Loaded - concurrent workload benchmarking")]
pub struct Cli {
    /// Number of workload iterations
    #[arg(long, short = 'n')]
    pub iterations: Option<u64>,

    /// Maximum iterations in flight
    #[arg(long, short = 'c')]
    pub concurrency: Option<usize>,

    /// Suite title
    #[arg(long)]
    pub title: Option<String>,

    /// Per-iteration timeout (e.g., "5s", "250ms")
    #[arg(long)]
    pub timeout: Option<String>,

    /// Output format: human, json
    #[arg(long)]
    pub format: Option<String>,

    /// Minimum time between progress lines (e.g., "1s")
    #[arg(long)]
    pub progress: Option<String>,

    /// Configuration file (default: discover loaded.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Drive the suite on a single-threaded runtime
    #[arg(long)]
    pub current_thread: bool,

    /// Internal: Absorb cargo bench's --bench flag
    #[arg(long, hide = true)]
    pub bench: bool,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    /// Suite configuration
    pub suite: SuiteConfig,
    /// Report format
    pub format: OutputFormat,
    /// Minimum time between progress lines
    pub progress_interval: Duration,
    /// Use a single-threaded runtime
    pub current_thread: bool,
}

impl RunSettings {
    /// Build settings by layering: loaded.toml values → CLI overrides.
    pub fn resolve(cli: &Cli, config: &LoadedConfig) -> Result<Self, ConfigError> {
        let title = cli.title.clone().unwrap_or_else(|| config.suite.title.clone());
        let iterations = cli.iterations.unwrap_or(config.suite.iterations);
        let concurrency = cli.concurrency.unwrap_or(config.suite.concurrency);

        let timeout = match cli.timeout.as_deref().or(config.suite.iteration_timeout.as_deref()) {
            Some(s) => Some(LoadedConfig::parse_duration(s)?),
            None => None,
        };

        let mut suite = SuiteConfig::new(title)
            .iterations(iterations)
            .concurrency(concurrency);
        if let Some(after) = timeout {
            suite = suite.iteration_timeout(after);
        }

        let format_name = cli.format.as_deref().unwrap_or(config.output.format.as_str());
        let format = format_name
            .parse::<OutputFormat>()
            .map_err(ConfigError::Format)?;

        let progress = cli
            .progress
            .as_deref()
            .unwrap_or(config.output.progress_interval.as_str());

        Ok(Self {
            suite,
            format,
            progress_interval: LoadedConfig::parse_duration(progress)?,
            current_thread: cli.current_thread,
        })
    }
}

/// Run the Loaded CLI with the given suite definition.
/// This is the main entry point for workload binaries.
///
/// # Returns
/// Returns `Ok(())` when every phase ran, even if some iterations failed.
/// A run that stopped in a hook chain is an error.
pub fn run<F>(configure: F) -> anyhow::Result<()>
where
    F: FnOnce(&mut Suite),
{
    run_with_cli(Cli::parse(), configure)
}

/// Run the Loaded CLI with pre-parsed arguments.
pub fn run_with_cli<F>(cli: Cli, configure: F) -> anyhow::Result<()>
where
    F: FnOnce(&mut Suite),
{
    init_logging(cli.verbose);

    // Explicit --config must exist; a discovered file is optional
    let config = match &cli.config {
        Some(path) => LoadedConfig::load(path)?,
        None => LoadedConfig::discover().transpose()?.unwrap_or_default(),
    };
    let settings = RunSettings::resolve(&cli, &config)?;

    let runtime = if settings.current_thread {
        tokio::runtime::Builder::new_current_thread()
    } else {
        tokio::runtime::Builder::new_multi_thread()
    }
    .enable_all()
    .build()?;

    let record = runtime.block_on(execute(&settings, configure));
    println!("{}", render(&record, settings.format)?);

    if record.phase != Phase::Done {
        anyhow::bail!("suite {:?} stopped during {}", record.title, record.phase);
    }
    Ok(())
}

/// Build the suite, run it and collect its statistics.
pub async fn execute<F>(settings: &RunSettings, configure: F) -> RunRecord
where
    F: FnOnce(&mut Suite),
{
    let mut suite = Suite::new(settings.suite.clone());
    configure(&mut suite);

    // Log progress alongside any observer the definition installed
    let logger = progress_logger(settings.progress_interval);
    match suite.progress_observer() {
        Some(observer) => suite.on_progress(move |progress| {
            logger(progress);
            observer(progress);
        }),
        None => suite.on_progress(logger),
    };

    info!(
        suite = %settings.suite.title,
        iterations = settings.suite.iterations,
        concurrency = settings.suite.concurrency,
        "starting run"
    );
    let summary = suite.run().await;
    if summary.failed_iterations > 0 {
        warn!(
            failed = summary.failed_iterations,
            total = summary.dispatched,
            "some iterations failed"
        );
    }

    let stats = loaded_stats::report(&suite.recorder().samples());
    RunRecord::new(&summary, stats)
}

fn init_logging(verbose: bool) {
    let filter = if verbose { "loaded=debug" } else { "loaded=info" };
    // A subscriber may already be installed by the host program
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Progress observer that logs at most one line per `interval`, plus the last
/// iteration.
fn progress_logger(interval: Duration) -> impl Fn(Progress) + Send + Sync + 'static {
    throttled(interval, |progress: Progress| {
        info!(
            iteration = progress.iteration,
            total = progress.total,
            "progress {}/{}",
            progress.iteration,
            progress.total
        );
    })
}

/// Forward at most one notification per `interval` to `emit`. The last
/// iteration is always forwarded.
fn throttled<E>(interval: Duration, emit: E) -> impl Fn(Progress) + Send + Sync + 'static
where
    E: Fn(Progress) + Send + Sync + 'static,
{
    let last = Arc::new(Mutex::new(None::<Instant>));
    move |progress: Progress| {
        let now = Instant::now();
        let mut last = last.lock().unwrap_or_else(PoisonError::into_inner);
        let due = last.is_none_or(|at| now.duration_since(at) >= interval);
        if due || progress.iteration == progress.total {
            *last = Some(now);
            emit(progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loaded_suite::Args;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn test_cli_parses_overrides() {
        let cli = Cli::try_parse_from([
            "loaded", "-n", "200", "-c", "8", "--timeout", "2s", "--format", "json",
        ])
        .unwrap();
        assert_eq!(cli.iterations, Some(200));
        assert_eq!(cli.concurrency, Some(8));
        assert_eq!(cli.timeout.as_deref(), Some("2s"));
        assert!(!cli.current_thread);
    }

    #[test]
    fn test_cli_wins_over_file() {
        let config: LoadedConfig = toml::from_str(
            r#"
            [suite]
            title = "from-file"
            iterations = 10
            concurrency = 2
            iteration_timeout = "1s"

            [output]
            format = "json"
            "#,
        )
        .unwrap();
        let cli = Cli {
            iterations: Some(50),
            timeout: Some("250ms".to_string()),
            ..Cli::default()
        };

        let settings = RunSettings::resolve(&cli, &config).unwrap();

        assert_eq!(settings.suite.title, "from-file");
        assert_eq!(settings.suite.iterations, 50);
        assert_eq!(settings.suite.concurrency, 2);
        assert_eq!(
            settings.suite.iteration_timeout,
            Some(Duration::from_millis(250))
        );
        assert_eq!(settings.format, OutputFormat::Json);
        assert_eq!(settings.progress_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_zero_values_are_raised() {
        let cli = Cli {
            iterations: Some(0),
            concurrency: Some(0),
            ..Cli::default()
        };
        let settings = RunSettings::resolve(&cli, &LoadedConfig::default()).unwrap();
        assert_eq!(settings.suite.iterations, 1);
        assert_eq!(settings.suite.concurrency, 1);
    }

    #[test]
    fn test_bad_timeout_is_an_error() {
        let cli = Cli {
            timeout: Some("soon".to_string()),
            ..Cli::default()
        };
        assert!(RunSettings::resolve(&cli, &LoadedConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_execute_collects_stats() {
        let cli = Cli {
            iterations: Some(12),
            concurrency: Some(4),
            title: Some("exec".to_string()),
            ..Cli::default()
        };
        let settings = RunSettings::resolve(&cli, &LoadedConfig::default()).unwrap();

        let record = execute(&settings, |suite| {
            suite.workload(|input| async move {
                input.start_timer("work.step").stop();
                Ok(Args::new())
            });
        })
        .await;

        assert_eq!(record.title, "exec");
        assert_eq!(record.phase, Phase::Done);
        assert_eq!(record.dispatched, 12);
        assert_eq!(record.stats.get("work").unwrap().count, 12);
        assert_eq!(record.stats.get("work.step").unwrap().count, 12);
    }

    fn emitted(interval: Duration, total: u64) -> Vec<u64> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let log = throttled(interval, move |progress| {
            sink.lock().unwrap().push(progress.iteration)
        });
        for iteration in 1..=total {
            log(Progress { iteration, total });
        }
        let seen = seen.lock().unwrap().clone();
        seen
    }

    #[test]
    fn test_progress_throttling() {
        // First and last only
        assert_eq!(emitted(Duration::from_secs(3600), 5), vec![1, 5]);
        assert_eq!(emitted(Duration::from_secs(3600), 1), vec![1]);
        // No throttling
        assert_eq!(emitted(Duration::ZERO, 4), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_user_progress_observer_still_fires() {
        let cli = Cli {
            iterations: Some(5),
            concurrency: Some(2),
            ..Cli::default()
        };
        let settings = RunSettings::resolve(&cli, &LoadedConfig::default()).unwrap();
        let calls = Arc::new(AtomicU64::new(0));

        let observed = Arc::clone(&calls);
        let record = execute(&settings, move |suite| {
            suite.workload(|_input| async { Ok(Args::new()) });
            suite.on_progress(move |_progress| {
                observed.fetch_add(1, Ordering::SeqCst);
            });
        })
        .await;

        assert_eq!(record.dispatched, 5);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_bad_format_is_an_error() {
        let cli = Cli {
            format: Some("csv".to_string()),
            ..Cli::default()
        };
        let err = RunSettings::resolve(&cli, &LoadedConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Format(_)));
        assert_eq!(err.to_string(), "Unknown output format: csv");
    }
}
