use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Loadgen - a throughput-controlled load generation engine
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
pub struct Args {
    /// Samplers to run each iteration (space-separated: delay, flaky)
    #[clap(short = 'm', value_enum, default_values_t = vec![SamplerKind::Delay], help_heading = "Core Options", num_args = 1..)]
    pub samplers: Vec<SamplerKind>,

    /// Number of virtual users
    #[clap(short = 't', long, default_value_t = crate::defaults::NUM_THREADS)]
    pub threads: usize,

    /// Ramp-up period over which users are started (e.g. "10s", "5m")
    #[clap(short = 'r', long, value_parser = parse_duration, default_value = "0s")]
    pub ramp_up: Duration,

    /// Iterations each user runs
    #[clap(short = 'l', long, default_value_t = crate::defaults::LOOPS)]
    pub loops: u64,

    /// Scheduled run duration; enables the scheduler
    #[clap(short = 'd', long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Scheduled startup delay; enables the scheduler
    #[clap(long, value_parser = parse_duration)]
    pub delay: Option<Duration>,

    /// Honor the startup delay / duration schedule
    #[clap(long, default_value_t = false)]
    pub scheduler: bool,

    /// Simulated work time per sample
    #[clap(short = 'w', long, value_parser = parse_duration, default_value = "0ms")]
    pub work: Duration,

    /// Make the flaky sampler fail every Nth call (0 disables)
    #[clap(long, default_value_t = 0)]
    pub fail_every: u64,

    /// Wrap each iteration in a transaction with this label
    #[clap(long)]
    pub transaction: Option<String>,

    /// Generate a parent sample nesting the children instead of the
    /// legacy additional aggregate sample
    #[clap(long, default_value_t = false)]
    pub parent_sample: bool,

    /// Include timer and processing pauses in transaction elapsed time
    /// (pass `--include-timers false` to report pauses as idle time)
    #[clap(long, action = clap::ArgAction::Set, default_value_t = true, value_name = "BOOL")]
    pub include_timers: bool,

    /// Target throughput in events per throughput period; enables
    /// Poisson arrival pacing
    #[clap(long)]
    pub throughput: Option<f64>,

    /// Seconds per throughput unit, also the arrival regeneration window
    #[clap(long, value_parser = parse_duration, default_value = "1s")]
    pub throughput_period: Duration,

    /// Consecutive arrivals that share one offset (simultaneous batches)
    #[clap(long, default_value_t = 1)]
    pub batch_size: usize,

    /// Random seed for reproducible arrival sequences (0 = entropy)
    #[clap(long)]
    pub seed: Option<u64>,

    /// Log the first arrival offsets of every generated window
    #[clap(long, default_value_t = false)]
    pub log_first_samples: bool,

    /// Percentiles to calculate for latency metrics
    #[clap(long, default_values_t = vec![50.0, 95.0, 99.0, 99.9])]
    pub percentiles: Vec<f64>,

    /// Output file for results (JSON format)
    #[clap(short = 'o', long, default_value = crate::defaults::OUTPUT_FILE)]
    pub output_file: PathBuf,

    /// Verbose output
    #[clap(short = 'v', long, default_value_t = false)]
    pub verbose: bool,
}

/// Built-in sampler kinds selectable from the command line
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum SamplerKind {
    /// Sleeps for the configured work time and succeeds
    #[clap(name = "delay")]
    Delay,

    /// Like delay, but fails every Nth call
    #[clap(name = "flaky")]
    Flaky,
}

impl SamplerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SamplerKind::Delay => "delay",
            SamplerKind::Flaky => "flaky",
        }
    }
}

impl std::fmt::Display for SamplerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Parse duration from string (e.g., "10s", "5m", "1h")
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();

    if s.is_empty() {
        return Err("Duration cannot be empty".to_string());
    }

    let (num_str, unit) = if let Some(stripped) = s.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = s.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = s.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = s.strip_suffix('h') {
        (stripped, "h")
    } else {
        (s, "s") // Default to seconds
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number in duration: {}", num_str))?;

    let duration = match unit {
        "ms" => Duration::from_millis(num as u64),
        "s" => Duration::from_secs_f64(num),
        "m" => Duration::from_secs_f64(num * 60.0),
        "h" => Duration::from_secs_f64(num * 3600.0),
        _ => return Err(format!("Invalid duration unit: {}", unit)),
    };

    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("10").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("0.5s").unwrap(), Duration::from_millis(500));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("invalid").is_err());
    }

    #[test]
    fn test_sampler_kind_display() {
        assert_eq!(SamplerKind::Delay.to_string(), "delay");
        assert_eq!(SamplerKind::Flaky.to_string(), "flaky");
    }

    #[test]
    fn test_include_timers_can_be_disabled() {
        let args = Args::try_parse_from(["loadgen"]).unwrap();
        assert!(args.include_timers);

        let args = Args::try_parse_from(["loadgen", "--include-timers", "false"]).unwrap();
        assert!(!args.include_timers);

        let args = Args::try_parse_from(["loadgen", "--include-timers", "true"]).unwrap();
        assert!(args.include_timers);
    }
}
