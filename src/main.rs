//! # Loadgen - Main Entry Point
//!
//! Command-line frontend for the throughput-controlled load generation
//! engine. The main function performs these key operations:
//!
//! 1. **Initialize logging**: Sets up structured logging with tracing
//! 2. **Parse arguments**: Processes command-line configuration
//! 3. **Create run config**: Converts CLI args to the internal config
//! 4. **Run**: Spawns the virtual users and blocks until they drain
//! 5. **Report**: Writes JSON results and prints a summary
//!
//! ## Error Handling
//!
//! The application uses `anyhow::Result` throughout. A failing sampler
//! does not abort the run; only configuration and I/O errors do.

use anyhow::Result;
use clap::Parser;
use loadgen::{
    cli::Args,
    engine::{Engine, RunConfig},
    results::{ResultsManager, RunResults},
    utils::{format_millis, format_rate},
};
use tracing::info;

fn main() -> Result<()> {
    let args = Args::parse();

    // Log level can be controlled via the RUST_LOG environment variable
    // Example: RUST_LOG=debug loadgen -m delay -t 4
    loadgen::logging::init(args.verbose);

    info!("Starting load generation run");
    info!("Configuration: {:?}", args);

    let config = RunConfig::from_args(&args)?;
    let results_manager = ResultsManager::new(&args.output_file)?;

    let outcome = Engine::new(config).run()?;

    results_manager.write(&RunResults::from_outcome(&outcome))?;
    print_summary(&outcome);

    info!("Load generation run completed successfully");
    Ok(())
}

/// Print a human-readable end-of-run summary.
fn print_summary(outcome: &loadgen::engine::RunOutcome) {
    let stats = &outcome.stats;
    info!("=== Run {} ===", outcome.run_id);
    info!(
        "Samples: {} ({} failed), transactions: {}",
        stats.total_samples, stats.failed_samples, stats.transactions
    );
    info!(
        "Wall time: {}, rate: {}",
        format_millis(outcome.wall_time.as_millis() as u64),
        format_rate(stats.samples_per_second)
    );
    if let Some(latency) = &stats.latency {
        info!(
            "Elapsed time: min {} / mean {:.2}ms / max {}",
            format_millis(latency.min_ms),
            latency.mean_ms,
            format_millis(latency.max_ms)
        );
        for entry in &latency.percentiles {
            info!("  P{}: {}", entry.percentile, format_millis(entry.value_ms));
        }
    }
}
