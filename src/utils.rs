//! Small shared helpers: wall-clock access, run identifiers, and
//! human-readable formatting for the end-of-run summary.

use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a unique identifier for a run.
///
/// Used in result output and log correlation; uniqueness also keeps output
/// artifacts from concurrent runs apart.
pub fn generate_run_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current wall-clock time in epoch milliseconds.
///
/// Falls back to 0 if the system clock is before the Unix epoch rather
/// than panicking.
pub fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Format a millisecond duration for human-readable output.
pub fn format_millis(ms: u64) -> String {
    if ms < 1_000 {
        format!("{}ms", ms)
    } else if ms < 60_000 {
        format!("{:.2}s", ms as f64 / 1_000.0)
    } else {
        format!("{:.1}m", ms as f64 / 60_000.0)
    }
}

/// Format an event rate for human-readable output.
pub fn format_rate(per_second: f64) -> String {
    if per_second < 1_000.0 {
        format!("{:.2}/s", per_second)
    } else {
        format!("{:.2}k/s", per_second / 1_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(generate_run_id(), generate_run_id());
    }

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(500), "500ms");
        assert_eq!(format_millis(1_500), "1.50s");
        assert_eq!(format_millis(90_000), "1.5m");
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(12.5), "12.50/s");
        assert_eq!(format_rate(2_500.0), "2.50k/s");
    }
}
