//! Run and sweep configuration.
//!
//! [`RunConfig`] is what one xlet process needs; [`SweepPlan`] is the
//! orchestrator's JSON-loadable matrix of runs. Every field of the plan has a
//! default, so `{}` is a valid plan file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::meta::{Datatype, Role, RunMetadata};
use crate::window::TailPolicy;

// ---------------------------------------------------------------------------
// RunConfig
// ---------------------------------------------------------------------------

/// Everything one side of a run needs to execute.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub meta: RunMetadata,
    /// Samples the outlet produces before end-of-stream.
    pub total_count: u64,
    pub log_dir: PathBuf,
    pub tail_policy: TailPolicy,
    /// Capacity of the channels between pipeline tasks.
    pub channel_capacity: usize,
    /// How long the inlet keeps trying to reach the outlet.
    pub ready_timeout: Duration,
    /// Abort the inlet when nothing arrives for this long.
    pub idle_timeout: Option<Duration>,
    /// How long the outlet waits for a first subscriber before generating.
    pub subscriber_wait: Option<Duration>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            meta: RunMetadata {
                id: 0,
                outlet_kind: "tcpsample".to_string(),
                inlet_kind: "tcppull".to_string(),
                datatype: Datatype::Counter,
                platform: std::env::consts::OS.to_string(),
                multiproc: true,
                sample_rate: 1000,
                window_size: 1,
            },
            total_count: 10_000,
            log_dir: PathBuf::from("logs"),
            tail_policy: TailPolicy::Flush,
            channel_capacity: 1024,
            ready_timeout: Duration::from_secs(30),
            idle_timeout: None,
            subscriber_wait: Some(Duration::from_secs(5)),
        }
    }
}

impl RunConfig {
    /// Check the configuration before any file or socket is opened.
    pub fn validate(&self) -> Result<()> {
        self.meta.validate()?;
        if self.channel_capacity == 0 {
            return Err(Error::config("channel capacity must be at least 1"));
        }
        if self.total_count > i64::MAX as u64 {
            return Err(Error::config("total count exceeds the sample value range"));
        }
        Ok(())
    }

    /// Path of this run's log for one role.
    pub fn log_path(&self, role: Role) -> Result<PathBuf> {
        Ok(self.log_dir.join(self.meta.file_name(role)?))
    }
}

// ---------------------------------------------------------------------------
// SweepPlan
// ---------------------------------------------------------------------------

/// Matrix of runs executed by `xletbench run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepPlan {
    pub outlet_kinds: Vec<String>,
    pub inlet_kinds: Vec<String>,
    pub total_count: u64,
    pub sample_rate: u32,
    pub multiproc: Vec<bool>,
    pub window_sizes: Vec<usize>,
    /// Kinds that only run with `multiproc = false`.
    pub single_process_kinds: Vec<String>,
    pub tail_policy: TailPolicy,
    /// Pause between consecutive runs.
    pub pause_ms: u64,
    pub ready_timeout_secs: u64,
    /// Run `i` uses TCP port `base_port + i`.
    pub base_port: u16,
}

impl Default for SweepPlan {
    fn default() -> Self {
        Self {
            outlet_kinds: vec!["tcpsample".to_string(), "tcpchunk".to_string()],
            inlet_kinds: vec!["tcppull".to_string(), "tcppoll".to_string()],
            total_count: 10_000,
            sample_rate: 1000,
            multiproc: vec![true, false],
            window_sizes: vec![1, 60, 100],
            single_process_kinds: vec!["tcppoll".to_string()],
            tail_policy: TailPolicy::Flush,
            pause_ms: 1000,
            ready_timeout_secs: 30,
            base_port: 17_000,
        }
    }
}

impl SweepPlan {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::config(format!("invalid sweep plan {}: {e}", path.display())))
    }

    fn is_single_process(&self, kind: &str) -> bool {
        self.single_process_kinds.iter().any(|k| k == kind)
    }

    /// Enumerate the runs of the sweep in execution order.
    ///
    /// Order is outlet kind, inlet kind, multiproc, window size (outermost
    /// first). Combinations that would run a single-process kind with
    /// `multiproc = true` are skipped; ids number the remaining runs from 0.
    pub fn combos(&self, datatype: Datatype, platform: &str) -> Result<Vec<RunMetadata>> {
        let mut runs = Vec::new();
        for outlet in &self.outlet_kinds {
            for inlet in &self.inlet_kinds {
                for &multiproc in &self.multiproc {
                    for &window_size in &self.window_sizes {
                        if multiproc && (self.is_single_process(outlet) || self.is_single_process(inlet)) {
                            continue;
                        }
                        let meta = RunMetadata {
                            id: runs.len() as u32,
                            outlet_kind: outlet.clone(),
                            inlet_kind: inlet.clone(),
                            datatype,
                            platform: platform.to_string(),
                            multiproc,
                            sample_rate: self.sample_rate,
                            window_size,
                        };
                        meta.validate()?;
                        runs.push(meta);
                    }
                }
            }
        }
        Ok(runs)
    }

    /// Port assigned to run `id`.
    pub fn port_for(&self, id: u32) -> Result<u16> {
        u16::try_from(u32::from(self.base_port) + id)
            .map_err(|_| Error::config(format!("no TCP port left for run {id}")))
    }
}
