//! # Ramp-Up Scheduling Module
//!
//! This module computes when each virtual user starts and stops. A thread
//! group spreads its users evenly across a ramp-up period, and may in
//! addition carry an absolute schedule (start delay plus run duration, or
//! explicit start/end timestamps) that bounds every user in the group.
//!
//! The scheduler never sleeps itself: it only computes per-user delays and
//! absolute bounds. The actual waiting happens in each worker's own loop,
//! which keeps thread groups independent of one another.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one thread group.
///
/// Immutable once a run starts; workers only ever read it. When `scheduler`
/// is disabled the delay/duration fields are ignored and users start purely
/// according to the ramp-up spread.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThreadGroupConfig {
    /// Number of virtual users in the group
    pub num_threads: usize,

    /// Period over which the users are started, evenly spread
    pub ramp_up: Duration,

    /// Whether the absolute start/end schedule below is honored
    pub scheduler: bool,

    /// Relative startup delay, applied from the moment the run starts
    pub delay: Option<Duration>,

    /// Absolute start time (epoch milliseconds), used when no relative
    /// delay is configured; clamped to "now" to avoid starting in the past
    pub start_time_ms: Option<u64>,

    /// How long the group runs once started
    pub duration: Option<Duration>,

    /// Absolute end time (epoch milliseconds), used when no duration is set
    pub end_time_ms: Option<u64>,
}

impl ThreadGroupConfig {
    /// Create an unscheduled group: `num_threads` users over `ramp_up`.
    pub fn new(num_threads: usize, ramp_up: Duration) -> Self {
        Self {
            num_threads,
            ramp_up,
            scheduler: false,
            delay: None,
            start_time_ms: None,
            duration: None,
            end_time_ms: None,
        }
    }

    /// Compute the absolute start/end window for a worker in this group.
    ///
    /// `now_ms` is the wall-clock test start in epoch milliseconds. Returns
    /// an unbounded window when the scheduler is disabled.
    pub fn window(&self, now_ms: u64) -> ScheduleWindow {
        if !self.scheduler {
            return ScheduleWindow::unbounded();
        }

        let start_ms = match self.delay {
            Some(delay) => now_ms + delay.as_millis() as u64,
            // An absolute start in the past degrades to an immediate start.
            None => self.start_time_ms.map_or(now_ms, |t| t.max(now_ms)),
        };

        let end_ms = match self.duration {
            Some(duration) => Some(start_ms + duration.as_millis() as u64),
            None => self.end_time_ms,
        };

        ScheduleWindow { start_ms, end_ms }
    }
}

/// Absolute bounds for one worker, in epoch milliseconds.
///
/// A worker sleeps until `start_ms` before its first iteration and stops as
/// soon as it observes a time at or past `end_ms`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleWindow {
    pub start_ms: u64,
    pub end_ms: Option<u64>,
}

impl ScheduleWindow {
    /// A window that neither delays the start nor bounds the end.
    pub fn unbounded() -> Self {
        Self {
            start_ms: 0,
            end_ms: None,
        }
    }

    /// Whether `now_ms` falls at or past the end of the window.
    pub fn expired(&self, now_ms: u64) -> bool {
        matches!(self.end_ms, Some(end) if now_ms >= end)
    }
}

/// Per-thread ramp-up spacing in milliseconds.
///
/// Guarded against `num_threads == 0`: an empty group is a no-op, never a
/// division by zero.
pub fn per_thread_delay_ms(ramp_up: Duration, num_threads: usize) -> u64 {
    if num_threads == 0 {
        return 0;
    }
    (ramp_up.as_secs_f64() * 1000.0 / num_threads as f64) as u64
}

/// Initial ramp-up delay for the worker at `thread_index` (0-based).
///
/// Users are spread evenly: the delay grows linearly with the index and is
/// truncated to whole milliseconds.
pub fn initial_delay_ms(thread_index: usize, num_threads: usize, ramp_up: Duration) -> u64 {
    if num_threads == 0 {
        return 0;
    }
    let per_thread = ramp_up.as_secs_f64() * 1000.0 / num_threads as f64;
    (per_thread * thread_index as f64) as u64
}

/// Tracks ramp-up pacing while the engine is spawning workers.
///
/// Spawning a worker itself takes time; the delay handed to each subsequent
/// worker is reduced by the time already spent, so the overall ramp still
/// completes on schedule. Clamped at zero when spawning falls behind.
#[derive(Debug)]
pub struct RampUpPacer {
    per_thread_delay_ms: i64,
    carried_delay_ms: i64,
    last_spawn_ms: Option<u64>,
}

impl RampUpPacer {
    pub fn new(ramp_up: Duration, num_threads: usize) -> Self {
        Self {
            per_thread_delay_ms: per_thread_delay_ms(ramp_up, num_threads) as i64,
            carried_delay_ms: 0,
            last_spawn_ms: None,
        }
    }

    /// Delay in milliseconds for the worker about to be spawned at `now_ms`.
    pub fn next_delay_ms(&mut self, now_ms: u64) -> u64 {
        if let Some(last) = self.last_spawn_ms {
            let elapsed = now_ms.saturating_sub(last) as i64;
            self.carried_delay_ms += self.per_thread_delay_ms - elapsed;
        }
        self.last_spawn_ms = Some(now_ms);
        self.carried_delay_ms.max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_delay_exact_and_monotonic() {
        let ramp_up = Duration::from_secs(10);
        let num_threads = 4;
        let mut prev = 0;
        for idx in 0..num_threads {
            let delay = initial_delay_ms(idx, num_threads, ramp_up);
            let expected = (10_000.0 / num_threads as f64 * idx as f64) as u64;
            assert_eq!(delay, expected);
            assert!(delay >= prev);
            prev = delay;
        }
        assert_eq!(initial_delay_ms(0, 4, ramp_up), 0);
        assert_eq!(initial_delay_ms(3, 4, ramp_up), 7500);
    }

    #[test]
    fn test_initial_delay_truncates() {
        // 1s over 3 users: 333.33ms spacing, truncated per index
        let ramp_up = Duration::from_secs(1);
        assert_eq!(initial_delay_ms(1, 3, ramp_up), 333);
        assert_eq!(initial_delay_ms(2, 3, ramp_up), 666);
    }

    #[test]
    fn test_zero_threads_is_noop() {
        assert_eq!(per_thread_delay_ms(Duration::from_secs(10), 0), 0);
        assert_eq!(initial_delay_ms(0, 0, Duration::from_secs(10)), 0);
    }

    #[test]
    fn test_window_disabled_scheduler() {
        let config = ThreadGroupConfig::new(2, Duration::ZERO);
        let window = config.window(1_000_000);
        assert_eq!(window, ScheduleWindow::unbounded());
        assert!(!window.expired(u64::MAX));
    }

    #[test]
    fn test_window_relative_delay_and_duration() {
        let mut config = ThreadGroupConfig::new(2, Duration::ZERO);
        config.scheduler = true;
        config.delay = Some(Duration::from_secs(5));
        config.duration = Some(Duration::from_secs(60));

        let window = config.window(1_000_000);
        assert_eq!(window.start_ms, 1_005_000);
        assert_eq!(window.end_ms, Some(1_065_000));
        assert!(!window.expired(1_064_999));
        assert!(window.expired(1_065_000));
    }

    #[test]
    fn test_window_absolute_start_clamped_to_now() {
        let mut config = ThreadGroupConfig::new(1, Duration::ZERO);
        config.scheduler = true;
        config.start_time_ms = Some(500); // in the past
        config.end_time_ms = Some(2_000_000);

        let window = config.window(1_000_000);
        assert_eq!(window.start_ms, 1_000_000);
        assert_eq!(window.end_ms, Some(2_000_000));
    }

    #[test]
    fn test_ramp_up_pacer_compensates_for_spawn_overhead() {
        // 4 users over 2s: 500ms apart
        let mut pacer = RampUpPacer::new(Duration::from_secs(2), 4);
        assert_eq!(pacer.next_delay_ms(10_000), 0);
        // Second spawn happens 100ms later: full spacing minus overhead
        assert_eq!(pacer.next_delay_ms(10_100), 400);
        // Third spawn is late by more than the spacing: clamped to zero
        assert_eq!(pacer.next_delay_ms(11_200), 0);
        // The deficit carries: 500 - 100 = 400, previous carry was -200
        assert_eq!(pacer.next_delay_ms(11_300), 200);
    }
}
