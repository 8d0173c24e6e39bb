//! # Transaction Aggregation Module
//!
//! A transaction groups the samples of one loop iteration into a single
//! reported result. Two modes exist, mirroring the two historical
//! behaviors:
//!
//! - **Generate parent** ([`CompositeTransaction`]): the real samples are
//!   nested under one composite parent whose timing and success derive from
//!   its children.
//! - **Additional sample** ([`TransactionAccumulator`]): the children are
//!   reported as usual and one extra synthetic result is emitted at the end
//!   of the subtree, carrying summed bytes/latency/connect time, ANDed
//!   success, and a message with the child and failure counts.
//!
//! The accumulator can exclude pause time (timers, pre/post processing
//! between children) from the aggregate elapsed time; the excluded amount
//! is reported as idle time instead.
//!
//! All state here is owned by the single worker thread driving the subtree,
//! so nothing is locked. The one ordering requirement is that listener
//! dispatch completes before the next iteration begins accumulating, which
//! the synchronous [`notify_listeners`] call guarantees.

use crate::sample::{notify_listeners, SampleEvent, SampleListener, SampleResult};
use tracing::debug;

/// Message prefix identifying synthetic transaction results.
pub const SAMPLES_IN_TRANSACTION_PREFIX: &str = "Number of samples in transaction : ";

/// How a transaction reports its children.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionMode {
    GenerateParent,
    AdditionalSample,
}

/// Whether `result` is a synthetic transaction aggregate.
pub fn is_transaction_result(result: &SampleResult) -> bool {
    result.response_message.starts_with(SAMPLES_IN_TRANSACTION_PREFIX)
}

/// Legacy "additional sample" accumulator.
///
/// Lifecycle per loop iteration: [`begin`](Self::begin) when the subtree
/// starts, [`on_child_sample`](Self::on_child_sample) for every child,
/// then exactly one of [`on_subtree_exhausted`](Self::on_subtree_exhausted)
/// or [`force_end`](Self::force_end), which dispatch the aggregate and
/// return the accumulator to idle.
pub struct TransactionAccumulator {
    label: String,
    thread_group: String,
    /// Include timer and pre/post-processor pauses in the aggregate
    /// elapsed time (the compatible default)
    include_timers: bool,

    /// In-flight aggregate; `None` while idle
    result: Option<SampleResult>,
    calls: u64,
    failing_samples: u64,
    pause_time_ms: u64,
    prev_end_ms: u64,
}

impl TransactionAccumulator {
    pub fn new(label: impl Into<String>, thread_group: impl Into<String>, include_timers: bool) -> Self {
        Self {
            label: label.into(),
            thread_group: thread_group.into(),
            include_timers,
            result: None,
            calls: 0,
            failing_samples: 0,
            pause_time_ms: 0,
            prev_end_ms: 0,
        }
    }

    pub fn is_accumulating(&self) -> bool {
        self.result.is_some()
    }

    /// Start a new transaction at `now_ms`. Resets all counters.
    pub fn begin(&mut self, now_ms: u64) {
        debug!("Start of transaction {}", self.label);
        let mut result = SampleResult::new(self.label.clone());
        result.sample_start(now_ms);
        self.prev_end_ms = result.start_time_ms;
        self.pause_time_ms = 0;
        self.calls = 0;
        self.failing_samples = 0;
        self.result = Some(result);
    }

    /// Fold one child sample into the aggregate.
    ///
    /// Byte counts, latency and connect time are summed; thread counts take
    /// the latest value; any child failure makes the aggregate a failure
    /// without stopping the iteration.
    pub fn on_child_sample(&mut self, child: &SampleResult) {
        let result = match self.result.as_mut() {
            Some(result) => result,
            None => return, // idle: child belongs to no transaction
        };

        self.calls += 1;
        result.thread_name = child.thread_name.clone();
        result.bytes += child.bytes;
        result.sent_bytes += child.sent_bytes;
        if !self.include_timers {
            // Pause is the gap between the previous child's end and this
            // child's effective start (end minus net elapsed)
            let child_start = child.end_time_ms.saturating_sub(child.elapsed_ms());
            self.pause_time_ms += child_start.saturating_sub(self.prev_end_ms);
            self.prev_end_ms = child.end_time_ms;
        }
        if !child.success {
            result.success = false;
            self.failing_samples += 1;
        }
        result.all_threads = child.all_threads;
        result.group_threads = child.group_threads;
        result.latency_ms += child.latency_ms;
        result.connect_time_ms += child.connect_time_ms;
    }

    /// Event-level hook: skips synthetic transaction events so the
    /// accumulator never folds its own output back in.
    pub fn on_child_event(&mut self, event: &SampleEvent) {
        if !event.is_transaction_event {
            self.on_child_sample(&event.result);
        }
    }

    /// The subtree ran out of samplers: finalize and dispatch the
    /// aggregate.
    pub fn on_subtree_exhausted(&mut self, now_ms: u64, listeners: &mut [Box<dyn SampleListener>]) {
        let Some(mut result) = self.result.take() else {
            return;
        };
        if !self.include_timers {
            // Trailing processing time after the last child is a pause too
            self.pause_time_ms += now_ms.saturating_sub(self.prev_end_ms);
        }
        result.idle_time_ms += self.pause_time_ms;
        result.sample_end(now_ms);
        result.response_message = format!(
            "{}{}, number of failing samples : {}",
            SAMPLES_IN_TRANSACTION_PREFIX, self.calls, self.failing_samples
        );
        if result.success {
            result.set_response_code_ok();
        }
        self.dispatch(result, listeners);
    }

    /// Forced end of the loop (error path): finalize with the success of
    /// the last sample and dispatch whatever was accumulated.
    pub fn force_end(
        &mut self,
        now_ms: u64,
        last_sample_ok: bool,
        listeners: &mut [Box<dyn SampleListener>],
    ) {
        let Some(mut result) = self.result.take() else {
            return;
        };
        result.idle_time_ms += self.pause_time_ms;
        result.sample_end(now_ms);
        result.success = last_sample_ok;
        result.response_message = format!(
            "{}{}, number of failing samples : {}",
            SAMPLES_IN_TRANSACTION_PREFIX, self.calls, self.failing_samples
        );
        self.dispatch(result, listeners);
    }

    /// Exactly-once synchronous dispatch. The in-flight result was already
    /// taken out of `self`, so a listener feeding events back through
    /// [`on_child_event`] sees an idle accumulator and a transaction event,
    /// and ignores both.
    fn dispatch(&mut self, result: SampleResult, listeners: &mut [Box<dyn SampleListener>]) {
        debug!("End of transaction {}", self.label);
        let event = SampleEvent::transaction(result, self.thread_group.clone());
        notify_listeners(listeners, &event);
    }
}

/// "Generate parent" mode: children nest under one composite result.
pub struct CompositeTransaction {
    parent: Option<SampleResult>,
    calls: u64,
    failing_samples: u64,
    done: bool,
}

impl CompositeTransaction {
    pub fn begin(label: impl Into<String>, now_ms: u64) -> Self {
        let mut parent = SampleResult::new(label);
        parent.sample_start(now_ms);
        Self {
            parent: Some(parent),
            calls: 0,
            failing_samples: 0,
            done: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Attach a finished child. Parent timing and success derive from the
    /// children: the end time extends to cover the child, success is the
    /// AND over all children.
    pub fn add_sub_sample(&mut self, child: SampleResult) {
        let Some(parent) = self.parent.as_mut() else {
            return;
        };
        self.calls += 1;
        parent.thread_name = child.thread_name.clone();
        parent.bytes += child.bytes;
        parent.sent_bytes += child.sent_bytes;
        parent.end_time_ms = parent.end_time_ms.max(child.end_time_ms);
        parent.all_threads = child.all_threads;
        parent.group_threads = child.group_threads;
        if !child.success {
            parent.success = false;
            self.failing_samples += 1;
        }
        parent.sub_results.push(child);
    }

    /// Signal that the subtree is exhausted. The next call to
    /// [`take`](Self::take) yields the completed parent.
    pub fn set_done(&mut self) {
        self.done = true;
    }

    /// Complete the parent and hand it over; `None` on the second call,
    /// which signals the subtree is spent.
    pub fn take(&mut self) -> Option<SampleResult> {
        let mut parent = self.parent.take()?;
        if parent.end_time_ms < parent.start_time_ms {
            parent.end_time_ms = parent.start_time_ms;
        }
        parent.response_message = format!(
            "{}{}, number of failing samples : {}",
            SAMPLES_IN_TRANSACTION_PREFIX, self.calls, self.failing_samples
        );
        if parent.success {
            parent.set_response_code_ok();
        }
        Some(parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::sync::{Arc, Mutex};

    /// Captures every dispatched event for inspection.
    struct Capture(Arc<Mutex<Vec<SampleEvent>>>);
    impl SampleListener for Capture {
        fn sample_occurred(&mut self, event: &SampleEvent) -> Result<()> {
            self.0.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    fn capture() -> (Vec<Box<dyn SampleListener>>, Arc<Mutex<Vec<SampleEvent>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let listeners: Vec<Box<dyn SampleListener>> = vec![Box::new(Capture(seen.clone()))];
        (listeners, seen)
    }

    fn child(label: &str, bytes: u64, sent: u64, success: bool, start: u64, end: u64) -> SampleResult {
        let mut result = SampleResult::new(label);
        result.sample_start(start);
        result.sample_end(end);
        result.bytes = bytes;
        result.sent_bytes = sent;
        result.success = success;
        result.latency_ms = end - start;
        result.group_threads = 2;
        result.all_threads = 4;
        result
    }

    #[test]
    fn test_aggregate_all_successful() {
        let (mut listeners, seen) = capture();
        let mut txn = TransactionAccumulator::new("checkout", "group-0", true);

        txn.begin(1_000);
        txn.on_child_sample(&child("a", 10, 1, true, 1_000, 1_100));
        txn.on_child_sample(&child("b", 20, 2, true, 1_100, 1_250));
        txn.on_child_sample(&child("c", 30, 3, true, 1_250, 1_400));
        txn.on_subtree_exhausted(1_400, &mut listeners);

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 1);
        let aggregate = &events[0].result;
        assert!(events[0].is_transaction_event);
        assert_eq!(aggregate.bytes, 60);
        assert_eq!(aggregate.sent_bytes, 6);
        assert!(aggregate.success);
        assert_eq!(aggregate.response_code, "200");
        assert_eq!(aggregate.latency_ms, 100 + 150 + 150);
        assert_eq!(aggregate.group_threads, 2);
        assert_eq!(aggregate.all_threads, 4);
        assert_eq!(
            aggregate.response_message,
            "Number of samples in transaction : 3, number of failing samples : 0"
        );
        assert!(is_transaction_result(aggregate));
        assert!(!txn.is_accumulating());
    }

    #[test]
    fn test_aggregate_with_one_failure() {
        let (mut listeners, seen) = capture();
        let mut txn = TransactionAccumulator::new("checkout", "group-0", true);

        txn.begin(1_000);
        txn.on_child_sample(&child("a", 10, 1, true, 1_000, 1_100));
        txn.on_child_sample(&child("b", 20, 2, false, 1_100, 1_250));
        txn.on_child_sample(&child("c", 30, 3, true, 1_250, 1_400));
        txn.on_subtree_exhausted(1_400, &mut listeners);

        let events = seen.lock().unwrap();
        let aggregate = &events[0].result;
        assert!(!aggregate.success);
        assert_ne!(aggregate.response_code, "200");
        assert!(aggregate
            .response_message
            .ends_with("number of failing samples : 1"));
    }

    #[test]
    fn test_pause_time_excluded_when_timers_not_included() {
        let (mut listeners, seen) = capture();
        let mut txn = TransactionAccumulator::new("paced", "group-0", false);

        txn.begin(1_000);
        // 200ms gap before the first child, 300ms between children,
        // 100ms after the last one
        txn.on_child_sample(&child("a", 0, 0, true, 1_200, 1_300));
        txn.on_child_sample(&child("b", 0, 0, true, 1_600, 1_700));
        txn.on_subtree_exhausted(1_800, &mut listeners);

        let events = seen.lock().unwrap();
        let aggregate = &events[0].result;
        assert_eq!(aggregate.idle_time_ms, 200 + 300 + 100);
        // Elapsed nets out the idle time: 800ms wall minus 600ms pauses
        assert_eq!(aggregate.elapsed_ms(), 200);
    }

    #[test]
    fn test_dispatch_happens_exactly_once_and_clears_state() {
        let (mut listeners, seen) = capture();
        let mut txn = TransactionAccumulator::new("t", "group-0", true);

        txn.begin(0);
        txn.on_child_sample(&child("a", 1, 1, true, 0, 10));
        txn.on_subtree_exhausted(10, &mut listeners);
        // Spurious second exhaustion must be a no-op
        txn.on_subtree_exhausted(20, &mut listeners);
        assert_eq!(seen.lock().unwrap().len(), 1);

        // A transaction event fed back in while idle is ignored
        let echo = seen.lock().unwrap()[0].clone();
        txn.on_child_event(&echo);
        assert!(!txn.is_accumulating());
    }

    #[test]
    fn test_children_ignored_while_idle() {
        let mut txn = TransactionAccumulator::new("t", "group-0", true);
        txn.on_child_sample(&child("stray", 5, 5, true, 0, 10));
        assert!(!txn.is_accumulating());

        let (mut listeners, seen) = capture();
        txn.begin(100);
        txn.on_subtree_exhausted(100, &mut listeners);
        let events = seen.lock().unwrap();
        // The stray child was not counted
        assert!(events[0]
            .result
            .response_message
            .starts_with("Number of samples in transaction : 0,"));
    }

    #[test]
    fn test_force_end_uses_last_sample_outcome() {
        let (mut listeners, seen) = capture();
        let mut txn = TransactionAccumulator::new("t", "group-0", true);

        txn.begin(0);
        txn.on_child_sample(&child("a", 1, 1, true, 0, 10));
        txn.force_end(15, false, &mut listeners);

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(!events[0].result.success);
        assert!(events[0]
            .result
            .response_message
            .starts_with("Number of samples in transaction : 1,"));
        assert!(!txn.is_accumulating());
    }

    #[test]
    fn test_composite_parent_derives_from_children() {
        let mut txn = CompositeTransaction::begin("parent", 1_000);
        txn.add_sub_sample(child("a", 10, 1, true, 1_000, 1_200));
        txn.add_sub_sample(child("b", 20, 2, false, 1_200, 1_500));
        txn.set_done();
        assert!(txn.is_done());

        let parent = txn.take().unwrap();
        assert_eq!(parent.start_time_ms, 1_000);
        assert_eq!(parent.end_time_ms, 1_500);
        assert_eq!(parent.bytes, 30);
        assert_eq!(parent.sent_bytes, 3);
        assert!(!parent.success);
        assert_eq!(parent.sub_results.len(), 2);
        assert_eq!(
            parent.response_message,
            "Number of samples in transaction : 2, number of failing samples : 1"
        );

        // Second take signals exhaustion
        assert!(txn.take().is_none());
    }
}
