use crate::sample::{SampleEvent, SampleListener};
use anyhow::Result;
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Percentile value pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PercentileValue {
    pub percentile: f64,
    pub value_ms: u64,
}

/// Latency statistics over the elapsed times of finished samples
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyStats {
    pub min_ms: u64,
    pub max_ms: u64,
    pub mean_ms: f64,
    pub median_ms: f64,
    pub std_dev_ms: f64,
    pub percentiles: Vec<PercentileValue>,
}

/// Aggregate counts and rates for a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    pub total_samples: usize,
    pub failed_samples: usize,
    pub transactions: usize,
    pub total_bytes: u64,
    pub total_sent_bytes: u64,
    pub samples_per_second: f64,
    pub latency: Option<LatencyStats>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Accumulates sample statistics for one run.
///
/// Sample elapsed times go into an HDR histogram (3 significant figures)
/// so percentile queries stay accurate regardless of sample count.
/// Synthetic transaction aggregates are counted separately and kept out of
/// the latency histogram to avoid double-counting their children.
pub struct StatsCollector {
    histogram: Histogram<u64>,
    start_time: Instant,
    total_samples: usize,
    failed_samples: usize,
    transactions: usize,
    total_bytes: u64,
    total_sent_bytes: u64,
    percentiles: Vec<f64>,
}

impl StatsCollector {
    pub fn new(percentiles: Vec<f64>) -> Result<Self> {
        let histogram = Histogram::<u64>::new(3)?;
        Ok(Self {
            histogram,
            start_time: Instant::now(),
            total_samples: 0,
            failed_samples: 0,
            transactions: 0,
            total_bytes: 0,
            total_sent_bytes: 0,
            percentiles,
        })
    }

    /// Record one finished sample event.
    pub fn record(&mut self, event: &SampleEvent) -> Result<()> {
        let result = &event.result;
        if event.is_transaction_event {
            self.transactions += 1;
            return Ok(());
        }

        self.total_samples += 1;
        if !result.success {
            self.failed_samples += 1;
        }
        self.total_bytes += result.bytes;
        self.total_sent_bytes += result.sent_bytes;
        self.histogram.record(result.elapsed_ms())?;
        Ok(())
    }

    /// Snapshot of the current statistics.
    pub fn snapshot(&self) -> RunStats {
        let elapsed_secs = self.start_time.elapsed().as_secs_f64();
        let samples_per_second = if elapsed_secs > 0.0 {
            self.total_samples as f64 / elapsed_secs
        } else {
            0.0
        };

        let latency = if self.total_samples > 0 {
            let percentile_values = self
                .percentiles
                .iter()
                .map(|&p| PercentileValue {
                    percentile: p,
                    value_ms: self.histogram.value_at_percentile(p),
                })
                .collect();
            Some(LatencyStats {
                min_ms: self.histogram.min(),
                max_ms: self.histogram.max(),
                mean_ms: self.histogram.mean(),
                median_ms: self.histogram.value_at_percentile(50.0) as f64,
                std_dev_ms: self.histogram.stdev(),
                percentiles: percentile_values,
            })
        } else {
            None
        };

        RunStats {
            total_samples: self.total_samples,
            failed_samples: self.failed_samples,
            transactions: self.transactions,
            total_bytes: self.total_bytes,
            total_sent_bytes: self.total_sent_bytes,
            samples_per_second,
            latency,
            timestamp: chrono::Utc::now(),
        }
    }
}

/// Cloneable listener handle feeding a shared [`StatsCollector`].
///
/// Each worker holds one clone; the collector lock is only contended for
/// the duration of a single histogram record.
#[derive(Clone)]
pub struct StatsListener {
    collector: Arc<Mutex<StatsCollector>>,
}

impl StatsListener {
    pub fn new(percentiles: Vec<f64>) -> Result<Self> {
        Ok(Self {
            collector: Arc::new(Mutex::new(StatsCollector::new(percentiles)?)),
        })
    }

    pub fn snapshot(&self) -> RunStats {
        self.collector.lock().snapshot()
    }
}

impl SampleListener for StatsListener {
    fn sample_occurred(&mut self, event: &SampleEvent) -> Result<()> {
        self.collector.lock().record(event)
    }
}
