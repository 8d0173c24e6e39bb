//! # Loadgen Library
//!
//! A throughput-controlled load generation engine implemented in Rust.
//! This library provides the scheduling core of a load test runner:
//! ramped thread-group startup, Poisson-process arrival pacing, and
//! transaction-level result aggregation.
//!
//! ## Capabilities
//!
//! - **Ramp-up scheduling**: Virtual users are started evenly across a
//!   configurable ramp-up period, with spawn-time drift compensated so
//!   the last user still starts on schedule
//! - **Scheduled windows**: Optional startup delay and run duration give
//!   each group an absolute start/end window that users honor mid-run
//! - **Precise throughput control**: A shared Poisson arrival stream
//!   paces all users in a group against absolute target timestamps, so
//!   achieved throughput does not drift with sampler latency
//! - **Transactions**: Consecutive samples can be aggregated into a
//!   transaction result, either as an additional aggregate sample or as
//!   a generated parent nesting its children
//!
//! ## Architecture Overview
//!
//! The library is organized into several key modules:
//!
//! - `engine`: Run orchestration, worker spawning, and report collection
//! - `schedule`: Ramp-up delay computation and scheduled run windows
//! - `arrivals`: Poisson arrival-time generation for throughput pacing
//! - `sample`: Sample results, sampler trait, and the listener pipeline
//! - `transaction`: Aggregation of child samples into transaction results
//! - `worker`: The per-thread virtual user loop
//! - `metrics`: Latency histograms and run-level statistics
//! - `results`: Result formatting and JSON output management
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use loadgen::engine::{Engine, RunConfig};
//! use loadgen::sample::SamplerSpec;
//! use loadgen::schedule::ThreadGroupConfig;
//! use std::time::Duration;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = RunConfig {
//!         group: ThreadGroupConfig::new(4, Duration::from_secs(2)),
//!         group_name: "group-1".to_string(),
//!         loops: 100,
//!         samplers: vec![SamplerSpec {
//!             kind: "delay".to_string(),
//!             label: "delay-1".to_string(),
//!             work: Duration::from_millis(5),
//!             fail_every: 0,
//!         }],
//!         transaction: None,
//!         pacing: None,
//!         percentiles: vec![50.0, 95.0, 99.0],
//!     };
//!
//!     let outcome = Engine::new(config).run()?;
//!     println!("Samples: {}", outcome.stats.total_samples);
//!     Ok(())
//! }
//! ```

/// Poisson arrival-time generation for throughput pacing
///
/// Contains the `PoissonArrivalStream` shared by all users of a group and
/// the `ArrivalRegistry` that scopes streams to a single run. Handles:
/// - Window-by-window batch generation of sorted arrival offsets
/// - Regeneration when the target throughput changes
/// - Batched arrivals that share a single offset
pub mod arrivals;

/// Command-line interface and configuration
///
/// Provides argument parsing using clap and converts user-friendly CLI
/// options into internal configuration structures. Includes duration
/// parsing with human-readable formats (e.g., "10s", "5m") and sampler
/// selection.
pub mod cli;

/// Run orchestration
///
/// Contains the main `Engine` and `RunConfig` types. The engine validates
/// configuration, spawns one OS thread per virtual user with ramped start
/// delays, and collects per-worker reports over a channel.
pub mod engine;

pub mod logging;

/// Performance measurement and statistical analysis
///
/// Implements run-level metrics collection using HDR histograms:
/// - Elapsed-time percentiles (P50, P95, P99, P99.9, etc.)
/// - Sample, failure, transaction, and byte counters
/// - A cloneable listener that feeds the collector from worker threads
pub mod metrics;

/// Result collection and output formatting
///
/// Manages the presentation of run results with structured JSON output
/// and system information collection for reproducibility.
pub mod results;

/// Sample results, samplers, and the listener pipeline
pub mod sample;

/// Ramp-up scheduling and run windows
///
/// Computes evenly spread per-thread start delays, absolute scheduled
/// start/end windows, and drift-compensated spawn pacing.
pub mod schedule;

/// Transaction aggregation
///
/// Accumulates child sample results into a single transaction result,
/// tracking sums, failure counts, and pause exclusion.
pub mod transaction;

/// The per-thread virtual user loop
pub mod worker;

pub mod utils;

// Re-export key types for convenient library usage

/// Main run execution engine
pub use engine::{Engine, RunConfig, RunOutcome};

/// Command-line interface types
pub use cli::Args;

/// Core sampling abstractions
///
/// The `Sampler` and `SampleListener` traits are the extension points for
/// custom workloads and result sinks.
pub use sample::{SampleListener, SampleResult, Sampler};

/// Transaction aggregation types
pub use transaction::{TransactionAccumulator, TransactionMode};

/// The current version of the load generation engine
///
/// This version string is automatically populated from Cargo.toml and used
/// in result output for reproducibility and debugging purposes.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration values
///
/// This module provides sensible defaults for all configurable parameters.
pub mod defaults {
    /// Default number of virtual users
    ///
    /// A single user is the default so a bare invocation behaves like a
    /// simple sequential check. Larger groups are enabled with the
    /// `--threads` flag.
    pub const NUM_THREADS: usize = 1;

    /// Default iterations per virtual user
    ///
    /// One loop keeps a bare invocation short. Duration-based runs
    /// combine a large loop count with the `--duration` flag so the
    /// scheduled end time stops the users instead.
    pub const LOOPS: u64 = 1;

    /// Default output file name
    ///
    /// Results are written in JSON format for easy parsing and analysis
    /// by external tools.
    pub const OUTPUT_FILE: &str = "loadgen_results.json";
}
