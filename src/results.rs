use crate::engine::RunOutcome;
use crate::metrics::RunStats;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Complete results for one run, as written to the output file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResults {
    pub metadata: RunMetadata,
    pub stats: RunStats,
    pub workers: Vec<WorkerSummary>,
}

/// Run identification and environment for reproducibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub test_start_ms: u64,
    pub wall_time: Duration,
    pub system_info: SystemInfo,
}

/// Per-worker accounting in the output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub thread_index: usize,
    pub thread_name: String,
    pub iterations: u64,
    pub samples: u64,
    pub failures: u64,
    pub stopped: Option<String>,
}

/// System information for reproducibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub architecture: String,
    pub cpu_cores: usize,
    pub engine_version: String,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            cpu_cores: num_cpus::get(),
            engine_version: crate::VERSION.to_string(),
        }
    }
}

impl RunResults {
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        let workers = outcome
            .workers
            .iter()
            .map(|report| WorkerSummary {
                thread_index: report.thread_index,
                thread_name: report.thread_name.clone(),
                iterations: report.iterations,
                samples: report.samples,
                failures: report.failures,
                stopped: report.stopped.clone(),
            })
            .collect();

        Self {
            metadata: RunMetadata {
                run_id: outcome.run_id.clone(),
                version: crate::VERSION.to_string(),
                timestamp: chrono::Utc::now(),
                test_start_ms: outcome.test_start_ms,
                wall_time: outcome.wall_time,
                system_info: SystemInfo::default(),
            },
            stats: outcome.stats.clone(),
            workers,
        }
    }
}

/// Writes finalized run results to the output file
pub struct ResultsManager {
    output_file: std::path::PathBuf,
}

impl ResultsManager {
    pub fn new(output_file: &Path) -> Result<Self> {
        Ok(Self {
            output_file: output_file.to_path_buf(),
        })
    }

    /// Write results as pretty-printed JSON.
    pub fn write(&self, results: &RunResults) -> Result<()> {
        if let Some(parent) = self.output_file.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&self.output_file, json)?;
        info!("Results written to: {:?}", self.output_file);
        Ok(())
    }
}
