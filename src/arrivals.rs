//! # Poisson Arrival Stream Module
//!
//! Generates a paced stream of arrival offsets for throughput-controlled
//! load generation. Offsets are seconds relative to the wall-clock test
//! start, produced window by window: each regeneration draws
//! `ceil(throughput * duration)` samples uniformly over the next window and
//! sorts them, which matches a homogeneous Poisson process in aggregate
//! count per window.
//!
//! Note the inter-arrival gaps are deliberately *not* exponential. The
//! uniform-then-sort model is the established behavior that seeded
//! reproducibility depends on, so it is preserved exactly.
//!
//! One stream instance is shared by every user pacing against the same
//! throughput target; the [`ArrivalRegistry`] hands out the per-group
//! instance behind a lock so that offset consumption and buffer
//! regeneration stay atomic across workers.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Throughput changes smaller than this do not force a regeneration.
const THROUGHPUT_EPSILON: f64 = 1e-5;

/// How many offsets of a fresh window are logged when diagnostics are on.
const LOGGED_SAMPLE_COUNT: usize = 5;

/// Tunable inputs for one arrival stream.
///
/// The throughput and duration providers are re-read on every regeneration,
/// so a rate that changes mid-run takes effect at the next batch boundary.
pub struct ArrivalConfig {
    /// Current target rate in events per second
    pub throughput: Box<dyn Fn() -> f64 + Send>,

    /// Seconds covered by each regeneration window
    pub duration: Box<dyn Fn() -> f64 + Send>,

    /// Number of consecutive `next()` calls that share one offset.
    /// A value of 1 means every call advances.
    pub batch_size: usize,

    /// Fixed RNG seed; `None` or `Some(0)` selects an entropy seed
    pub seed: Option<u64>,

    /// Log the first few offsets of every fresh window
    pub log_first_samples: bool,
}

impl ArrivalConfig {
    /// Fixed-rate configuration, the common case.
    pub fn constant(throughput: f64, window: Duration, batch_size: usize, seed: Option<u64>) -> Self {
        let window_secs = window.as_secs_f64();
        Self {
            throughput: Box::new(move || throughput),
            duration: Box::new(move || window_secs),
            batch_size: batch_size.max(1),
            seed,
            log_first_samples: false,
        }
    }
}

/// Lazily generated, per-window sequence of arrival offsets.
///
/// Calls to [`next`](Self::next) must be serialized by the owner; the
/// registry wraps each stream in a mutex for exactly that reason.
pub struct PoissonArrivalStream {
    rng: StdRng,
    config: ArrivalConfig,

    /// Sorted offsets for the current window. Reused across regenerations
    /// so a steady rate never reallocates.
    events: Vec<f64>,
    position: usize,

    /// Calls issued against the current batch's offset
    issued_in_batch: usize,
    last_offset: f64,

    last_throughput: f64,
    window_end_secs: f64,
}

impl PoissonArrivalStream {
    pub fn new(mut config: ArrivalConfig) -> Self {
        // A zero batch would make the per-call rate infinite in
        // regenerate(); treat it as the unbatched case
        config.batch_size = config.batch_size.max(1);
        let rng = match config.seed {
            Some(seed) if seed != 0 => StdRng::seed_from_u64(seed),
            _ => StdRng::from_entropy(),
        };
        Self {
            rng,
            config,
            events: Vec::new(),
            position: 0,
            issued_in_batch: 0,
            last_offset: 0.0,
            last_throughput: f64::NAN,
            window_end_secs: 0.0,
        }
    }

    /// Next arrival offset in seconds, relative to the test start.
    ///
    /// Within a batch of `batch_size` calls every call returns the first
    /// call's offset; the buffer only advances at batch boundaries. A fresh
    /// window is generated when the buffer is exhausted or the provided
    /// throughput moved by at least `1e-5` events/sec since the last
    /// generation.
    pub fn next(&mut self) -> f64 {
        if self.issued_in_batch > 0 && self.issued_in_batch < self.config.batch_size {
            self.issued_in_batch += 1;
            return self.last_offset;
        }

        let throughput = (self.config.throughput)();
        let exhausted = self.position >= self.events.len();
        let rate_moved = (throughput - self.last_throughput).abs() >= THROUGHPUT_EPSILON
            || self.last_throughput.is_nan();
        if exhausted || rate_moved {
            self.regenerate(throughput);
        }

        if self.events.is_empty() {
            // Degenerate rate: the window produced no arrivals. Report the
            // start of the next window and retry on the following call.
            self.issued_in_batch = 0;
            self.last_offset = self.window_end_secs;
            return self.last_offset;
        }

        self.last_offset = self.events[self.position];
        self.position += 1;
        self.issued_in_batch = 1;
        self.last_offset
    }

    /// Fill the buffer with the next window of sorted arrival offsets.
    fn regenerate(&mut self, throughput: f64) {
        let started = Instant::now();
        let duration = (self.config.duration)();
        let per_call_rate = throughput / self.config.batch_size as f64;
        let samples = (per_call_rate * duration).ceil().max(0.0) as usize;

        // clear() keeps the allocation, so steady-state regeneration is
        // alloc-free once capacity has been reached
        self.events.clear();
        for _ in 0..samples {
            self.events
                .push(self.window_end_secs + duration * self.rng.gen::<f64>());
        }
        self.events.sort_unstable_by(f64::total_cmp);

        self.window_end_secs += duration;
        self.position = 0;
        self.last_throughput = throughput;

        if self.config.log_first_samples {
            let shown = self.events.len().min(LOGGED_SAMPLE_COUNT);
            debug!(
                "Generated {} arrivals up to {:.3}s, first {}: {:?}",
                self.events.len(),
                self.window_end_secs,
                shown,
                &self.events[..shown]
            );
        }

        let took = started.elapsed();
        if took > Duration::from_secs(1) {
            warn!(
                "Arrival generation took {:?} for {} samples; consider a shorter window",
                took,
                self.events.len()
            );
        }
    }
}

/// Per-run lookup from thread-group identity to its shared arrival stream.
///
/// Owned by the run controller and dropped with it, so no stream outlives
/// the run it was created for. Workers clone the `Arc` handle and serialize
/// their `next()` calls through the mutex.
#[derive(Default)]
pub struct ArrivalRegistry {
    streams: Mutex<HashMap<String, Arc<Mutex<PoissonArrivalStream>>>>,
}

impl ArrivalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stream for `group_id`, creating it from `build` on first access.
    pub fn stream_for<F>(&self, group_id: &str, build: F) -> Arc<Mutex<PoissonArrivalStream>>
    where
        F: FnOnce() -> ArrivalConfig,
    {
        let mut streams = self.streams.lock();
        streams
            .entry(group_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(PoissonArrivalStream::new(build()))))
            .clone()
    }
}
