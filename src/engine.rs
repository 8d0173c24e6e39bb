//! # Run Engine Module
//!
//! The engine owns a complete run: it validates the configuration, builds
//! the run context (arrival registry, run id, wall-clock test start),
//! spawns one OS thread per virtual user with compensated ramp-up delays,
//! and collects worker reports and aggregate statistics when the run
//! drains.
//!
//! ## Execution Lifecycle
//!
//! 1. **Validate**: reject configurations that cannot run
//! 2. **Context**: create the per-run shared state (owned here, dropped
//!    here, never global)
//! 3. **Spawn**: start workers, handing each its ramp delay and schedule
//!    window; spawning never waits for a worker to finish
//! 4. **Collect**: receive worker reports as they complete, then join all
//!    thread handles
//! 5. **Summarize**: snapshot the stats listener into the run outcome

use crate::arrivals::{ArrivalConfig, ArrivalRegistry};
use crate::metrics::{RunStats, StatsListener};
use crate::sample::{SampleListener, SamplerRegistry, SamplerSpec};
use crate::schedule::{RampUpPacer, ThreadGroupConfig};
use crate::transaction::TransactionMode;
use crate::utils::{generate_run_id, now_epoch_ms};
use crate::worker::{TransactionSettings, VirtualUser, WorkerPlan, WorkerReport};
use anyhow::{anyhow, Context, Result};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Transaction configuration for a run.
#[derive(Clone, Debug)]
pub struct TransactionConfig {
    pub label: String,
    /// Parent mode nests children under one composite result; otherwise
    /// the legacy additional-sample aggregate is emitted
    pub generate_parent: bool,
    /// Include timer/processing pauses in the aggregate elapsed time
    pub include_timers: bool,
}

/// Throughput pacing configuration for a run.
#[derive(Clone, Debug)]
pub struct PacingConfig {
    /// Target events per throughput period
    pub throughput: f64,
    /// Seconds per throughput unit; also the regeneration window
    pub period: Duration,
    /// Consecutive arrivals sharing one offset
    pub batch_size: usize,
    /// Non-zero for reproducible arrival sequences
    pub seed: Option<u64>,
    pub log_first_samples: bool,
}

/// Complete configuration for one run.
#[derive(Debug)]
pub struct RunConfig {
    pub group: ThreadGroupConfig,
    pub group_name: String,
    pub loops: u64,
    pub samplers: Vec<SamplerSpec>,
    pub transaction: Option<TransactionConfig>,
    pub pacing: Option<PacingConfig>,
    pub percentiles: Vec<f64>,
}

impl RunConfig {
    /// Create a run configuration from CLI arguments.
    ///
    /// The scheduler is honored when explicitly requested or implied by a
    /// configured delay or duration.
    pub fn from_args(args: &crate::cli::Args) -> Result<Self> {
        let mut group = ThreadGroupConfig::new(args.threads, args.ramp_up);
        group.scheduler = args.scheduler || args.duration.is_some() || args.delay.is_some();
        group.delay = args.delay;
        group.duration = args.duration;

        let samplers = args
            .samplers
            .iter()
            .enumerate()
            .map(|(index, kind)| SamplerSpec {
                kind: kind.as_str().to_string(),
                label: format!("{}-{}", kind.as_str(), index + 1),
                work: args.work,
                fail_every: args.fail_every,
            })
            .collect();

        let transaction = args.transaction.as_ref().map(|label| TransactionConfig {
            label: label.clone(),
            generate_parent: args.parent_sample,
            include_timers: args.include_timers,
        });

        let pacing = args.throughput.map(|throughput| PacingConfig {
            throughput,
            period: args.throughput_period,
            batch_size: args.batch_size,
            seed: args.seed,
            log_first_samples: args.log_first_samples,
        });

        Ok(Self {
            group,
            group_name: "group-1".to_string(),
            loops: args.loops,
            samplers,
            transaction,
            pacing,
            percentiles: args.percentiles.clone(),
        })
    }

    fn validate(&self) -> Result<()> {
        if self.samplers.is_empty() {
            return Err(anyhow!("At least one sampler is required"));
        }
        if self.loops == 0 {
            return Err(anyhow!("Loop count must be at least 1"));
        }
        if let Some(pacing) = &self.pacing {
            if pacing.throughput <= 0.0 {
                return Err(anyhow!("Throughput must be positive, got {}", pacing.throughput));
            }
            if pacing.period.is_zero() {
                return Err(anyhow!("Throughput period must be non-zero"));
            }
            if pacing.batch_size == 0 {
                return Err(anyhow!("Batch size must be at least 1"));
            }
        }
        Ok(())
    }
}

/// Everything a finished run produced.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub run_id: String,
    pub test_start_ms: u64,
    pub wall_time: Duration,
    pub stats: RunStats,
    pub workers: Vec<WorkerReport>,
}

/// Per-run shared state, owned by the engine for the duration of the run.
struct RunContext {
    arrivals: ArrivalRegistry,
    test_start_ms: u64,
}

/// Drives one run to completion.
pub struct Engine {
    config: RunConfig,
}

impl Engine {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    /// Execute the run and block until every worker has reported.
    pub fn run(&self) -> Result<RunOutcome> {
        self.config.validate()?;
        let run_id = generate_run_id();
        let started = Instant::now();
        let stats = StatsListener::new(self.config.percentiles.clone())?;

        let num_threads = self.config.group.num_threads;
        if num_threads == 0 {
            // An empty group is a no-op, not an error
            warn!("Thread group '{}' has zero threads; nothing to do", self.config.group_name);
            return Ok(RunOutcome {
                run_id,
                test_start_ms: now_epoch_ms(),
                wall_time: started.elapsed(),
                stats: stats.snapshot(),
                workers: Vec::new(),
            });
        }

        let context = RunContext {
            arrivals: ArrivalRegistry::new(),
            test_start_ms: now_epoch_ms(),
        };
        let window = self.config.group.window(context.test_start_ms);
        info!(
            "Starting run {}: group='{}' threads={} ramp-up={:?} loops={}",
            run_id, self.config.group_name, num_threads, self.config.group.ramp_up, self.config.loops
        );

        let (report_tx, report_rx) = crossbeam::channel::unbounded::<WorkerReport>();
        let mut pacer = RampUpPacer::new(self.config.group.ramp_up, num_threads);
        let mut handles = Vec::with_capacity(num_threads);

        for thread_index in 0..num_threads {
            let delay_ms = pacer.next_delay_ms(now_epoch_ms());
            let user = self.build_user(thread_index, delay_ms, window, &context, &stats)?;
            let tx = report_tx.clone();
            let thread_name = user.thread_name.clone();
            let handle = std::thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || {
                    let report = user.run();
                    // The engine may already have stopped listening on a
                    // panic path; a send failure is not the worker's problem
                    let _ = tx.send(report);
                })
                .with_context(|| format!("Failed to spawn worker {}", thread_name))?;
            handles.push(handle);
        }
        drop(report_tx);

        let mut workers: Vec<WorkerReport> = Vec::with_capacity(num_threads);
        for report in report_rx.iter() {
            info!(
                "{} done: {} iterations, {} samples, {} failures{}",
                report.thread_name,
                report.iterations,
                report.samples,
                report.failures,
                report
                    .stopped
                    .as_deref()
                    .map(|s| format!(" (stopped: {})", s))
                    .unwrap_or_default()
            );
            workers.push(report);
        }
        for handle in handles {
            if handle.join().is_err() {
                warn!("A worker thread panicked before reporting");
            }
        }
        workers.sort_by_key(|report| report.thread_index);

        let outcome = RunOutcome {
            run_id,
            test_start_ms: context.test_start_ms,
            wall_time: started.elapsed(),
            stats: stats.snapshot(),
            workers,
        };
        info!(
            "Run {} complete: {} samples, {} failures in {:?}",
            outcome.run_id, outcome.stats.total_samples, outcome.stats.failed_samples, outcome.wall_time
        );
        Ok(outcome)
    }

    /// Assemble one virtual user: samplers from the registry, the shared
    /// arrival stream for this group, and the stats listener handle.
    fn build_user(
        &self,
        thread_index: usize,
        initial_delay_ms: u64,
        window: crate::schedule::ScheduleWindow,
        context: &RunContext,
        stats: &StatsListener,
    ) -> Result<VirtualUser> {
        let registry = SamplerRegistry::with_builtins();
        let samplers = self
            .config
            .samplers
            .iter()
            .map(|spec| registry.build(spec))
            .collect::<Result<Vec<_>>>()?;

        let transaction = self.config.transaction.as_ref().map(|txn| TransactionSettings {
            label: txn.label.clone(),
            mode: if txn.generate_parent {
                TransactionMode::GenerateParent
            } else {
                TransactionMode::AdditionalSample
            },
            include_timers: txn.include_timers,
        });

        let arrivals = self.config.pacing.as_ref().map(|pacing| {
            let pacing = pacing.clone();
            context.arrivals.stream_for(&self.config.group_name, move || {
                let rate = pacing.throughput / pacing.period.as_secs_f64();
                let mut config =
                    ArrivalConfig::constant(rate, pacing.period, pacing.batch_size, pacing.seed);
                config.log_first_samples = pacing.log_first_samples;
                config
            })
        });

        let listeners: Vec<Box<dyn SampleListener>> = vec![Box::new(stats.clone())];

        Ok(VirtualUser {
            thread_index,
            thread_name: format!("{} 1-{}", self.config.group_name, thread_index + 1),
            group_name: self.config.group_name.clone(),
            group_threads: self.config.group.num_threads,
            all_threads: self.config.group.num_threads,
            initial_delay_ms,
            window,
            test_start_ms: context.test_start_ms,
            plan: WorkerPlan {
                samplers,
                transaction,
                loops: self.config.loops,
            },
            arrivals,
            listeners,
        })
    }
}
