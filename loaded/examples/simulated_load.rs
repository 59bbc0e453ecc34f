//! Loaded Example Workload
//!
//! Simulates a login-then-browse session against a fake service with random
//! latencies, so the report shows a small hierarchy of timings.
//!
//! Run with:
//!   cargo run --example simulated_load                        # 1 iteration
//!   cargo run --example simulated_load -- -n 500 -c 20        # 500 iterations, 20 in flight
//!   cargo run --example simulated_load -- -n 100 --format json
//!   cargo run --example simulated_load -- --help              # Show all options

use loaded::prelude::*;
use rand::Rng;
use std::time::Duration;

/// Sleep for a random time in `min..=max` milliseconds
async fn fake_latency(min: u64, max: u64) {
    let millis = rand::thread_rng().gen_range(min..=max);
    tokio::time::sleep(Duration::from_millis(millis)).await;
}

fn main() -> anyhow::Result<()> {
    loaded::run(|suite| {
        suite.before_all(|_input| async {
            fake_latency(20, 40).await;
            Ok(Args::one("service-token"))
        });

        // Step 1: log in, pass the session id on
        suite.workload(|input| async move {
            let timer = input.start_timer("session.login");
            fake_latency(5, 25).await;
            timer.stop();

            let session = format!("session-{}", input.iteration().unwrap_or_default());
            Ok(Args::one(session))
        });

        // Step 2: browse a few pages with the session
        suite.workload(|input| async move {
            let session: String = input.arg(0)?;
            for page in ["home", "search", "item"] {
                let timer = input.start_timer(format!("session.browse.{page}"));
                fake_latency(1, 15).await;
                timer.stop();
            }
            // Occasional slow failure, reported but not fatal
            if rand::thread_rng().gen_ratio(1, 50) {
                return Err(format!("{session}: upstream returned 503").into());
            }
            Ok::<_, StepError>(Args::new())
        });

        suite.after_all(|_input| async {
            fake_latency(5, 10).await;
            Ok(Args::new())
        });
    })
}
