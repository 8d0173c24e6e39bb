//! End-to-end smoke tests: full runs through the public API, including
//! result file output.

use loadgen::engine::{Engine, PacingConfig, RunConfig, TransactionConfig};
use loadgen::results::{ResultsManager, RunResults};
use loadgen::sample::SamplerSpec;
use loadgen::schedule::ThreadGroupConfig;
use std::time::Duration;
use tempfile::NamedTempFile;

fn spec(kind: &str, label: &str, fail_every: u64) -> SamplerSpec {
    SamplerSpec {
        kind: kind.to_string(),
        label: label.to_string(),
        work: Duration::from_millis(1),
        fail_every,
    }
}

fn config(threads: usize, loops: u64) -> RunConfig {
    RunConfig {
        group: ThreadGroupConfig::new(threads, Duration::ZERO),
        group_name: "group-1".to_string(),
        loops,
        samplers: vec![spec("delay", "delay-1", 0)],
        transaction: None,
        pacing: None,
        percentiles: vec![50.0, 95.0, 99.0],
    }
}

#[test]
fn test_plain_run_end_to_end() {
    let outcome = Engine::new(config(3, 5)).run().unwrap();

    assert_eq!(outcome.stats.total_samples, 15);
    assert_eq!(outcome.stats.failed_samples, 0);
    assert_eq!(outcome.workers.len(), 3);
    for report in &outcome.workers {
        assert_eq!(report.iterations, 5);
        assert_eq!(report.samples, 5);
        assert!(report.stopped.is_none());
    }
    let latency = outcome.stats.latency.as_ref().unwrap();
    assert!(latency.min_ms >= 1);
}

#[test]
fn test_failing_sampler_is_counted_not_fatal() {
    let mut config = config(1, 6);
    config.samplers = vec![spec("flaky", "flaky-1", 3)];

    let outcome = Engine::new(config).run().unwrap();
    assert_eq!(outcome.stats.total_samples, 6);
    // Calls 3 and 6 fail
    assert_eq!(outcome.stats.failed_samples, 2);
    assert_eq!(outcome.workers[0].failures, 2);
}

#[test]
fn test_transaction_run_with_parent_samples() {
    let mut config = config(2, 4);
    config.samplers = vec![spec("delay", "step-1", 0), spec("delay", "step-2", 0)];
    config.transaction = Some(TransactionConfig {
        label: "checkout".to_string(),
        generate_parent: true,
        include_timers: true,
    });

    let outcome = Engine::new(config).run().unwrap();
    // 2 users x 4 loops x 2 child samples
    assert_eq!(outcome.stats.total_samples, 16);
    // One parent per iteration
    assert_eq!(outcome.stats.transactions, 8);
}

#[test]
fn test_paced_run_respects_target_timing() {
    let mut config = config(2, 5);
    config.pacing = Some(PacingConfig {
        throughput: 100.0,
        period: Duration::from_secs(1),
        batch_size: 1,
        seed: Some(7),
        log_first_samples: false,
    });

    let started = std::time::Instant::now();
    let outcome = Engine::new(config).run().unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome.stats.total_samples, 10);
    // 10 arrivals at 100/s all land inside the first one-second window,
    // so the run must not take several windows
    assert!(elapsed < Duration::from_secs(3), "paced run took {:?}", elapsed);
}

#[test]
fn test_scheduled_duration_stops_users() {
    let mut config = config(2, u64::MAX);
    config.group.scheduler = true;
    config.group.duration = Some(Duration::from_millis(300));
    config.samplers = vec![spec("delay", "delay-1", 0)];

    let outcome = Engine::new(config).run().unwrap();
    assert!(outcome.stats.total_samples > 0);
    for report in &outcome.workers {
        assert!(report.stopped.is_some());
    }
}

#[test]
fn test_results_file_shape() {
    let outcome = Engine::new(config(1, 2)).run().unwrap();

    let temp_file = NamedTempFile::new().unwrap();
    let manager = ResultsManager::new(temp_file.path()).unwrap();
    manager.write(&RunResults::from_outcome(&outcome)).unwrap();

    let written = std::fs::read_to_string(temp_file.path()).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(parsed["metadata"]["run_id"], outcome.run_id.as_str());
    assert_eq!(parsed["stats"]["total_samples"], 2);
    assert_eq!(parsed["workers"][0]["thread_name"], "group-1 1-1");
    assert!(parsed["metadata"]["system_info"]["cpu_cores"].as_u64().unwrap() > 0);
}
