//! # Virtual User Worker Module
//!
//! One [`VirtualUser`] simulates one user: it sleeps out its ramp-up
//! delay, honors its group's scheduled start/end window, paces iterations
//! against the shared arrival stream when throughput control is on, and
//! drives its samplers (optionally wrapped in a transaction) for the
//! configured number of loops.
//!
//! All waiting happens here, on the worker's own OS thread. The scheduler
//! and arrival stream only hand out numbers; a worker that discovers its
//! next wait would outlive the group's end time stops itself without
//! affecting its siblings.

use crate::arrivals::PoissonArrivalStream;
use crate::sample::{
    notify_listeners, SampleEvent, SampleListener, Sampler, SamplerContext,
};
use crate::schedule::ScheduleWindow;
use crate::transaction::{CompositeTransaction, TransactionAccumulator, TransactionMode};
use crate::utils::now_epoch_ms;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Why a worker stopped before finishing its loops.
///
/// These are per-thread control signals, not failures: one worker hitting
/// its bound never propagates to its siblings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkerStop {
    #[error("scheduled end time reached")]
    EndTimeReached,

    #[error("next delay would pass the scheduled end time")]
    DelayPastEnd,
}

/// Transaction wrapping for a worker's iteration, if any.
pub struct TransactionSettings {
    pub label: String,
    pub mode: TransactionMode,
    pub include_timers: bool,
}

/// What a worker executes each iteration.
pub struct WorkerPlan {
    pub samplers: Vec<Box<dyn Sampler>>,
    pub transaction: Option<TransactionSettings>,
    pub loops: u64,
}

/// Final accounting for one worker, reported back to the engine.
#[derive(Clone, Debug)]
pub struct WorkerReport {
    pub thread_index: usize,
    pub thread_name: String,
    pub iterations: u64,
    pub samples: u64,
    pub failures: u64,
    /// Present when the worker stopped on a schedule bound instead of
    /// completing its loops
    pub stopped: Option<String>,
}

/// One simulated user and everything it owns.
pub struct VirtualUser {
    pub thread_index: usize,
    pub thread_name: String,
    pub group_name: String,
    pub group_threads: usize,
    pub all_threads: usize,

    /// Ramp position: how long to wait before the first iteration
    pub initial_delay_ms: u64,
    /// Absolute bounds from the group scheduler
    pub window: ScheduleWindow,
    /// Wall-clock test start; arrival offsets are relative to this
    pub test_start_ms: u64,

    pub plan: WorkerPlan,
    /// Shared pacing stream; `next()` calls are serialized by the lock
    pub arrivals: Option<Arc<Mutex<PoissonArrivalStream>>>,
    pub listeners: Vec<Box<dyn SampleListener>>,
}

impl VirtualUser {
    /// Run to completion on the current thread and report.
    pub fn run(mut self) -> WorkerReport {
        let mut report = WorkerReport {
            thread_index: self.thread_index,
            thread_name: self.thread_name.clone(),
            iterations: 0,
            samples: 0,
            failures: 0,
            stopped: None,
        };

        match self.run_inner(&mut report) {
            Ok(()) => debug!("{} finished all loops", self.thread_name),
            Err(stop) => {
                info!("Stopping {}: {}", self.thread_name, stop);
                report.stopped = Some(stop.to_string());
            }
        }
        report
    }

    fn run_inner(&mut self, report: &mut WorkerReport) -> Result<(), WorkerStop> {
        self.wait_for_start()?;

        let mut accumulator = self.plan.transaction.as_ref().and_then(|txn| {
            if txn.mode == TransactionMode::AdditionalSample {
                Some(TransactionAccumulator::new(
                    txn.label.clone(),
                    self.group_name.clone(),
                    txn.include_timers,
                ))
            } else {
                None
            }
        });

        for iteration in 0..self.plan.loops {
            let now = now_epoch_ms();
            if self.window.expired(now) {
                // Unfinished transaction state still gets flushed out
                if let Some(acc) = accumulator.as_mut() {
                    acc.force_end(now, false, &mut self.listeners);
                }
                return Err(WorkerStop::EndTimeReached);
            }

            self.pace(iteration)?;
            self.run_iteration(iteration, accumulator.as_mut(), report);
            report.iterations += 1;
        }
        Ok(())
    }

    /// Sleep through the scheduled start and the ramp-up delay.
    ///
    /// Aborts without sleeping when the pending wait would already pass
    /// the end of the window.
    fn wait_for_start(&self) -> Result<(), WorkerStop> {
        let now = now_epoch_ms();
        let scheduled_start = self.window.start_ms.max(now);
        let first_action_ms = scheduled_start + self.initial_delay_ms;

        if let Some(end) = self.window.end_ms {
            if first_action_ms >= end {
                return Err(WorkerStop::DelayPastEnd);
            }
        }

        let wait = first_action_ms.saturating_sub(now);
        if wait > 0 {
            debug!("{} delaying start by {}ms", self.thread_name, wait);
            std::thread::sleep(Duration::from_millis(wait));
        }
        Ok(())
    }

    /// Wait until the next arrival offset, if throughput control is on.
    fn pace(&mut self, _iteration: u64) -> Result<(), WorkerStop> {
        let Some(arrivals) = self.arrivals.as_ref() else {
            return Ok(());
        };

        // Offset consumption and regeneration are atomic under this lock;
        // the sleep happens outside it
        let offset_secs = arrivals.lock().next();
        let target_ms = self.test_start_ms + (offset_secs * 1000.0) as u64;

        if let Some(end) = self.window.end_ms {
            if target_ms >= end {
                return Err(WorkerStop::DelayPastEnd);
            }
        }

        let now = now_epoch_ms();
        if target_ms > now {
            std::thread::sleep(Duration::from_millis(target_ms - now));
        }
        Ok(())
    }

    /// Execute every sampler once, wrapped in a transaction if configured.
    fn run_iteration(
        &mut self,
        iteration: u64,
        accumulator: Option<&mut TransactionAccumulator>,
        report: &mut WorkerReport,
    ) {
        let parent_label = self.plan.transaction.as_ref().and_then(|txn| {
            (txn.mode == TransactionMode::GenerateParent).then(|| txn.label.clone())
        });

        match (accumulator, parent_label) {
            (Some(acc), _) => self.run_additional_sample_iteration(iteration, acc, report),
            (None, Some(label)) => self.run_parent_iteration(iteration, &label, report),
            (None, None) => self.run_plain_iteration(iteration, report),
        }
    }

    fn run_plain_iteration(&mut self, iteration: u64, report: &mut WorkerReport) {
        for i in 0..self.plan.samplers.len() {
            let result = self.sample_one(i, iteration);
            report.samples += 1;
            if !result.success {
                report.failures += 1;
            }
            let event = SampleEvent::new(result, self.group_name.clone());
            notify_listeners(&mut self.listeners, &event);
        }
    }

    /// Legacy mode: children are reported individually and folded into the
    /// accumulator, which emits its aggregate when the subtree is spent.
    fn run_additional_sample_iteration(
        &mut self,
        iteration: u64,
        accumulator: &mut TransactionAccumulator,
        report: &mut WorkerReport,
    ) {
        accumulator.begin(now_epoch_ms());
        for i in 0..self.plan.samplers.len() {
            let result = self.sample_one(i, iteration);
            report.samples += 1;
            if !result.success {
                report.failures += 1;
            }
            let event = SampleEvent::new(result, self.group_name.clone());
            accumulator.on_child_event(&event);
            notify_listeners(&mut self.listeners, &event);
        }
        accumulator.on_subtree_exhausted(now_epoch_ms(), &mut self.listeners);
    }

    /// Parent mode: children nest under one composite result and only the
    /// completed parent is dispatched.
    fn run_parent_iteration(&mut self, iteration: u64, label: &str, report: &mut WorkerReport) {
        let mut composite = CompositeTransaction::begin(label, now_epoch_ms());
        for i in 0..self.plan.samplers.len() {
            let result = self.sample_one(i, iteration);
            report.samples += 1;
            if !result.success {
                report.failures += 1;
            }
            composite.add_sub_sample(result);
        }
        composite.set_done();
        if let Some(parent) = composite.take() {
            let event = SampleEvent::transaction(parent, self.group_name.clone());
            notify_listeners(&mut self.listeners, &event);
        }
    }

    fn sample_one(&mut self, sampler_index: usize, iteration: u64) -> crate::sample::SampleResult {
        let ctx = SamplerContext {
            thread_name: self.thread_name.clone(),
            group_threads: self.group_threads,
            all_threads: self.all_threads,
            iteration,
            now_ms: now_epoch_ms(),
        };
        self.plan.samplers[sampler_index].sample(&ctx)
    }
}
