//! # Sample Model Module
//!
//! Core sample types shared by the whole engine: the [`SampleResult`]
//! produced by every sampler invocation, the [`SampleEvent`] wrapper pushed
//! to listeners, the listener trait with per-listener error isolation, and
//! the sampler factory registry.
//!
//! The registry maps a sampler kind name to a constructor function and is
//! populated at startup. Pluggability without any dynamic class loading:
//! adding a sampler means registering one more constructor.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::error;

/// Result of one sampler invocation, or one finalized transaction.
///
/// Times are epoch milliseconds. `elapsed_ms` excludes idle time, which is
/// where a transaction parks the pause time it was told to exclude.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SampleResult {
    pub label: String,
    pub thread_name: String,
    pub start_time_ms: u64,
    pub end_time_ms: u64,
    pub idle_time_ms: u64,
    pub latency_ms: u64,
    pub connect_time_ms: u64,
    pub bytes: u64,
    pub sent_bytes: u64,
    pub success: bool,
    pub response_code: String,
    pub response_message: String,
    pub group_threads: usize,
    pub all_threads: usize,
    /// Children of a generated parent transaction, empty otherwise
    pub sub_results: Vec<SampleResult>,
}

impl SampleResult {
    /// A new, not-yet-started result. Success defaults to true and is
    /// flipped by whoever detects a failure.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            thread_name: String::new(),
            start_time_ms: 0,
            end_time_ms: 0,
            idle_time_ms: 0,
            latency_ms: 0,
            connect_time_ms: 0,
            bytes: 0,
            sent_bytes: 0,
            success: true,
            response_code: String::new(),
            response_message: String::new(),
            group_threads: 0,
            all_threads: 0,
            sub_results: Vec::new(),
        }
    }

    /// Mark the sample as started at `now_ms`.
    pub fn sample_start(&mut self, now_ms: u64) {
        self.start_time_ms = now_ms;
    }

    /// Mark the sample as finished at `now_ms`.
    pub fn sample_end(&mut self, now_ms: u64) {
        self.end_time_ms = now_ms;
    }

    /// Elapsed milliseconds net of idle time.
    pub fn elapsed_ms(&self) -> u64 {
        self.end_time_ms
            .saturating_sub(self.start_time_ms)
            .saturating_sub(self.idle_time_ms)
    }

    pub fn set_response_code_ok(&mut self) {
        self.response_code = "200".to_string();
    }
}

/// A finished sample on its way to the listeners.
#[derive(Clone, Debug)]
pub struct SampleEvent {
    pub result: SampleResult,
    pub thread_group: String,
    /// Set on synthetic transaction results so accumulators can ignore
    /// their own output
    pub is_transaction_event: bool,
}

impl SampleEvent {
    pub fn new(result: SampleResult, thread_group: impl Into<String>) -> Self {
        Self {
            result,
            thread_group: thread_group.into(),
            is_transaction_event: false,
        }
    }

    pub fn transaction(result: SampleResult, thread_group: impl Into<String>) -> Self {
        Self {
            result,
            thread_group: thread_group.into(),
            is_transaction_event: true,
        }
    }
}

/// Receives finished samples synchronously, on the worker thread that
/// produced them.
pub trait SampleListener: Send {
    fn sample_occurred(&mut self, event: &SampleEvent) -> Result<()>;
}

/// Synchronous fan-out to a set of listeners.
///
/// One listener failing must not starve the rest: each error is logged and
/// dispatch continues.
pub fn notify_listeners(listeners: &mut [Box<dyn SampleListener>], event: &SampleEvent) {
    for listener in listeners.iter_mut() {
        if let Err(e) = listener.sample_occurred(event) {
            error!("Sample listener failed for '{}': {e:#}", event.result.label);
        }
    }
}

/// Per-invocation context handed to samplers.
#[derive(Clone, Debug)]
pub struct SamplerContext {
    pub thread_name: String,
    pub group_threads: usize,
    pub all_threads: usize,
    pub iteration: u64,
    pub now_ms: u64,
}

/// A unit of simulated work. Implementations must be cheap to construct;
/// one instance exists per virtual user.
pub trait Sampler: Send {
    fn label(&self) -> &str;

    /// Execute one sample and report its result. Failures are expressed in
    /// the result, not as errors: a failing sample is still a sample.
    fn sample(&mut self, ctx: &SamplerContext) -> SampleResult;
}

/// Declarative sampler description, as parsed from the CLI.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SamplerSpec {
    pub kind: String,
    pub label: String,
    /// Simulated per-sample work time
    pub work: Duration,
    /// Every Nth sample fails; 0 disables injected failures
    pub fail_every: u64,
}

type SamplerBuilder = fn(&SamplerSpec) -> Result<Box<dyn Sampler>>;

/// Startup-populated map from sampler kind to constructor.
pub struct SamplerRegistry {
    builders: HashMap<String, SamplerBuilder>,
}

impl SamplerRegistry {
    /// Registry with the built-in sampler kinds (`delay`, `flaky`).
    pub fn with_builtins() -> Self {
        let mut registry = Self {
            builders: HashMap::new(),
        };
        registry.register("delay", |spec| Ok(Box::new(DelaySampler::from_spec(spec))));
        registry.register("flaky", |spec| Ok(Box::new(FlakySampler::from_spec(spec))));
        registry
    }

    pub fn register(&mut self, kind: &str, builder: SamplerBuilder) {
        self.builders.insert(kind.to_string(), builder);
    }

    pub fn build(&self, spec: &SamplerSpec) -> Result<Box<dyn Sampler>> {
        let builder = self
            .builders
            .get(&spec.kind)
            .ok_or_else(|| anyhow!("Unknown sampler kind: {}", spec.kind))?;
        builder(spec)
    }
}

/// Sleeps for the configured work time and succeeds.
pub struct DelaySampler {
    label: String,
    work: Duration,
}

impl DelaySampler {
    pub fn from_spec(spec: &SamplerSpec) -> Self {
        Self {
            label: spec.label.clone(),
            work: spec.work,
        }
    }
}

impl Sampler for DelaySampler {
    fn label(&self) -> &str {
        &self.label
    }

    fn sample(&mut self, ctx: &SamplerContext) -> SampleResult {
        let mut result = SampleResult::new(self.label.clone());
        result.thread_name = ctx.thread_name.clone();
        result.group_threads = ctx.group_threads;
        result.all_threads = ctx.all_threads;
        result.sample_start(ctx.now_ms);
        if !self.work.is_zero() {
            std::thread::sleep(self.work);
        }
        result.sample_end(ctx.now_ms + self.work.as_millis() as u64);
        result.latency_ms = self.work.as_millis() as u64;
        result.set_response_code_ok();
        result
    }
}

/// Like [`DelaySampler`] but fails every `fail_every`th invocation, for
/// exercising failure accounting end to end.
pub struct FlakySampler {
    label: String,
    work: Duration,
    fail_every: u64,
    calls: u64,
}

impl FlakySampler {
    pub fn from_spec(spec: &SamplerSpec) -> Self {
        Self {
            label: spec.label.clone(),
            work: spec.work,
            fail_every: spec.fail_every,
            calls: 0,
        }
    }
}

impl Sampler for FlakySampler {
    fn label(&self) -> &str {
        &self.label
    }

    fn sample(&mut self, ctx: &SamplerContext) -> SampleResult {
        self.calls += 1;
        let mut result = SampleResult::new(self.label.clone());
        result.thread_name = ctx.thread_name.clone();
        result.group_threads = ctx.group_threads;
        result.all_threads = ctx.all_threads;
        result.sample_start(ctx.now_ms);
        if !self.work.is_zero() {
            std::thread::sleep(self.work);
        }
        result.sample_end(ctx.now_ms + self.work.as_millis() as u64);
        result.latency_ms = self.work.as_millis() as u64;

        if self.fail_every > 0 && self.calls % self.fail_every == 0 {
            result.success = false;
            result.response_code = "500".to_string();
            result.response_message = "Injected failure".to_string();
        } else {
            result.set_response_code_ok();
        }
        result
    }
}
