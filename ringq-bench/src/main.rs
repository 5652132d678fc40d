//! Pinned-thread throughput harness for the ringq queues.
//!
//! Usage:
//!     cargo run --release -p ringq-bench
//!
//! Environment variables:
//!     RINGQ_MODE=both              spsc | mpsc | both
//!     RINGQ_RUNS=10                Repetitions per variant
//!     RINGQ_SPSC_ITEMS=10000000    Items per SPSC run
//!     RINGQ_SPSC_CAPACITY=100000   SPSC queue capacity
//!     RINGQ_MPSC_ITEMS=1150000     Items per MPSC producer per run
//!     RINGQ_MPSC_CAPACITY=131071   MPSC queue capacity
//!     RINGQ_PRODUCERS=3            MPSC producer threads
//!     RINGQ_PRODUCER_CPU=4         SPSC producer core (`none` to leave unpinned)
//!     RINGQ_CONSUMER_CPU=1         SPSC consumer core (`none` to leave unpinned)
//!     RINGQ_MPSC_CPUS=0,1,2,3      MPSC cores, consumer first
//!     RUST_LOG=ringq_bench=info    Log filter

mod config;
mod runner;
mod stats;

use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::BenchConfig;
use crate::runner::BenchError;
use crate::stats::Summary;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ringq_bench=info,ringq=info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter)
        .init();
}

fn report(name: &str, results: &[u64]) {
    println!("{name}");
    match Summary::from_samples(results) {
        Some(summary) => println!("{summary}"),
        None => println!("no runs"),
    }
    println!();
}

fn run(config: &BenchConfig) -> Result<(), BenchError> {
    if config.mode.runs_spsc() {
        let results = runner::run_spsc(config)?;
        report("SPSC", &results);
    }
    if config.mode.runs_mpsc() {
        let results = runner::run_mpsc(config)?;
        report("MPSC", &results);
    }
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();

    let config = match BenchConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(mode = ?config.mode, runs = config.runs, "ringq benchmark");

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("benchmark aborted: {e}");
            ExitCode::FAILURE
        }
    }
}
