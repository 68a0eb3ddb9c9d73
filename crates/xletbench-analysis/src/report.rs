//! Per-run and batch analysis of a log directory.

use std::path::Path;

use serde::{Deserialize, Serialize};
use xletbench_core::{
    Error, Result, RunMetadata, RunPair, group_runs, pair_run, read_consumer_log,
    read_producer_log,
};

use crate::latency::{
    LatencySummary, latency_summary, mean_corrected_latency, mean_latency, mean_window_duration,
};
use crate::verify::{Consistency, verify_detailed};

/// Everything learned about one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub run_id: u32,
    pub meta: RunMetadata,
    pub data_loss_detected: bool,
    pub mean_window_duration: Option<f64>,
    pub mean_latency: f64,
    pub mean_corrected_latency: f64,
    pub samples_sent: usize,
    pub samples_received: usize,
    pub consistency: Consistency,
    pub latency: Option<LatencySummary>,
}

/// A run that could not be analyzed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub id: u32,
    pub kind: String,
    pub error: String,
}

impl RunFailure {
    fn new(id: u32, err: &Error) -> Self {
        Self {
            id,
            kind: err.kind().to_string(),
            error: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub results: Vec<AnalysisResult>,
    pub failures: Vec<RunFailure>,
}

impl BatchReport {
    /// True when there was something to analyze and none of it succeeded.
    pub fn all_failed(&self) -> bool {
        self.results.is_empty() && !self.failures.is_empty()
    }

    pub fn runs_with_loss(&self) -> impl Iterator<Item = &AnalysisResult> {
        self.results.iter().filter(|r| r.data_loss_detected)
    }
}

/// Analyze one resolved run.
pub fn analyze_run(pair: &RunPair) -> Result<AnalysisResult> {
    let sent = read_producer_log(&pair.outlet)?;
    let windows = read_consumer_log(&pair.inlet)?;

    let outlet_values: Vec<i64> = sent.iter().map(|s| s.value).collect();
    let inlet_values: Vec<i64> = windows.iter().flat_map(|w| w.values()).collect();

    let oversized = windows.iter().filter(|w| w.len() > pair.meta.window_size).count();
    if oversized > 0 {
        log::warn!(
            "run {}: {oversized} windows exceed the configured size {}",
            pair.meta.id,
            pair.meta.window_size
        );
    }

    let consistency = verify_detailed(&outlet_values, &inlet_values)?;
    if consistency.loss_detected {
        log::warn!("run {}: data loss detected", pair.meta.id);
    }

    Ok(AnalysisResult {
        run_id: pair.meta.id,
        meta: pair.meta.clone(),
        data_loss_detected: consistency.loss_detected,
        mean_window_duration: mean_window_duration(&windows, pair.meta.window_size),
        mean_latency: mean_latency(&windows),
        mean_corrected_latency: mean_corrected_latency(&windows),
        samples_sent: outlet_values.len(),
        samples_received: inlet_values.len(),
        consistency,
        latency: latency_summary(&windows),
    })
}

/// Analyze every run found in `dir`.
///
/// Only an unreadable directory is an error. Problems with a single run are
/// recorded in [`BatchReport::failures`] and the remaining runs still go
/// through.
pub fn analyze_dir(dir: &Path) -> Result<BatchReport> {
    let runs = group_runs(dir)?;
    log::info!("analyzing {} runs in {}", runs.len(), dir.display());

    let mut report = BatchReport::default();
    for (id, files) in runs {
        match pair_run(id, &files).and_then(|pair| analyze_run(&pair)) {
            Ok(result) => report.results.push(result),
            Err(err) => {
                log::error!("run {id}: {err}");
                report.failures.push(RunFailure::new(id, &err));
            }
        }
    }
    Ok(report)
}
