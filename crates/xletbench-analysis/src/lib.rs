//! # xletbench-analysis
//!
//! Offline half of the benchmark: pairs the outlet and inlet logs of each
//! run, checks the inlet saw a gap-free suffix of what the outlet sent, and
//! summarizes transport latency.
//!
//! ```no_run
//! let report = xletbench_analysis::analyze_dir(std::path::Path::new("logs")).unwrap();
//! for r in &report.results {
//!     println!("run {}: loss={} latency={:.6}s", r.run_id, r.data_loss_detected, r.mean_latency);
//! }
//! ```

pub mod latency;
pub mod report;
pub mod verify;

pub use latency::{
    LatencySummary, latency_summary, mean_corrected_latency, mean_latency, mean_window_duration,
};
pub use report::{AnalysisResult, BatchReport, RunFailure, analyze_dir, analyze_run};
pub use verify::{Consistency, Mismatch, verify, verify_detailed};
