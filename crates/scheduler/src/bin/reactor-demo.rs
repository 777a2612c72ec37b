//! reactor-demo: interleaving demo for the single-concurrency scheduler.
//!
//! Three chains of steps (`a b c`, `1 2 3`, `x y z`) write to one shared slot,
//! pausing a random delay between steps, while a ticker prints the slot.
//! Submitted through the scheduler, the chains never interleave: the output
//! shows all letters of one chain before the next chain starts.
//!
//! # Usage
//!
//! ```bash
//! reactor-demo
//!
//! # Faster ticks, and a per-chain timeout: a chain that overruns is reported
//! # as timed out, the next chain starts, and the late chain's guard stops it
//! # before its next write
//! reactor-demo --tick-ms 50 --timeout-ms 1500
//!
//! # Via environment variables
//! REACTOR_DEMO_MAX_DELAY_MS=300 REACTOR_LOG=debug reactor-demo
//! ```

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Parser;
use rand::Rng;
use reactor_core::{Config, load_dotenv};
use reactor_scheduler::{Scheduler, SchedulerConfig, Task};
use tracing::info;

/// Shows that chained async steps submitted to the scheduler never interleave.
#[derive(Parser, Debug)]
#[command(name = "reactor-demo", version, about)]
struct Cli {
    /// Upper bound for the random pause between two steps, in milliseconds.
    #[arg(long, env = "REACTOR_DEMO_MAX_DELAY_MS", default_value_t = 1000)]
    max_delay_ms: u64,

    /// How often the ticker prints the shared slot, in milliseconds.
    #[arg(long, env = "REACTOR_DEMO_TICK_MS", default_value_t = 100)]
    tick_ms: u64,

    /// Timeout for each chain, in milliseconds (0 = none).
    #[arg(long, env = "REACTOR_DEMO_TIMEOUT_MS", default_value_t = 0)]
    timeout_ms: u64,
}

type Slot = Arc<Mutex<char>>;

const CHAINS: [(&str, [char; 3]); 3] = [
    ("letters", ['a', 'b', 'c']),
    ("numbers", ['1', '2', '3']),
    ("tail", ['x', 'y', 'z']),
];

/// Random pause in `0..=max_ms`.
fn jitter(max_ms: u64) -> Duration {
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

fn chain(
    scheduler: &Scheduler,
    slot: &Slot,
    name: &'static str,
    steps: [char; 3],
    max_delay_ms: u64,
) -> Task<()> {
    let slot = Arc::clone(slot);
    // Issued before submission, so it goes stale once the next chain starts.
    let guard = scheduler.issue_guard();
    Task::new(move || async move {
        for step in steps {
            guard.ensure_fresh()?;
            *slot.lock().unwrap_or_else(|e| e.into_inner()) = step;
            tokio::time::sleep(jitter(max_delay_ms)).await;
        }
        Ok(())
    })
    .named(name)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&config.logging.filter))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    config.validate()?;
    config.log_summary();

    let cli = Cli::parse();
    info!(?cli, "starting reactor-demo");

    let scheduler = Scheduler::new(SchedulerConfig::from(&config));
    let slot: Slot = Arc::new(Mutex::new('.'));

    let ticker = {
        let slot = Arc::clone(&slot);
        let tick = Duration::from_millis(cli.tick_ms.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            let mut stdout = std::io::stdout();
            loop {
                interval.tick().await;
                let current = *slot.lock().unwrap_or_else(|e| e.into_inner());
                print!("{current}");
                let _ = stdout.flush();
            }
        })
    };

    let handles: Vec<_> = CHAINS
        .into_iter()
        .map(|(name, steps)| {
            let mut task = chain(&scheduler, &slot, name, steps, cli.max_delay_ms);
            if cli.timeout_ms > 0 {
                task = task.with_timeout(Duration::from_millis(cli.timeout_ms));
            }
            (name, scheduler.submit_task(task))
        })
        .collect();

    let mut outcomes = Vec::new();
    for (name, handle) in handles {
        outcomes.push((name, handle.await));
    }
    // One more tick so the last step shows up.
    tokio::time::sleep(Duration::from_millis(cli.tick_ms)).await;
    ticker.abort();
    println!();

    for (name, outcome) in outcomes {
        match outcome {
            Ok(()) => info!(chain = name, "chain finished"),
            Err(e) => info!(chain = name, error = %e, "chain cut short"),
        }
    }
    println!("{}", serde_json::to_string_pretty(&scheduler.metrics())?);
    Ok(())
}
