//! Error taxonomy shared by every xletbench crate.
//!
//! Configuration problems are raised before any I/O happens. Run-level
//! problems (`IncompleteRun`, `InconsistentRun`, `Alignment`) abort the
//! analysis of a single run only; the batch driver collects them per run.
//! Transport errors come from a Bus adapter and are never retried.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid run configuration (window size, rate, datatype, file name field).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A run id did not resolve to exactly one outlet and one inlet log.
    #[error("incomplete run {id}: expected one outlet and one inlet log, found {files:?}")]
    IncompleteRun { id: u32, files: Vec<PathBuf> },

    /// The two logs of a run disagree on a field that must match.
    #[error("inconsistent run {id}: field `{field}` is `{outlet}` for the outlet but `{inlet}` for the inlet")]
    InconsistentRun {
        id: u32,
        field: &'static str,
        outlet: String,
        inlet: String,
    },

    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    /// Bus failure: connection never established, disconnect, bad frame, timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// A file name does not follow the run log naming scheme.
    #[error("bad log file name '{name}': {reason}")]
    BadFileName { name: String, reason: String },

    /// A log file row or header could not be parsed.
    #[error("malformed log {path}:{line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Input arrived after the accumulator saw end-of-stream.
    #[error("window accumulator already drained; no input accepted after end-of-stream")]
    AccumulatorClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The inlet's log cannot be lined up against the outlet's log.
///
/// This never means "no loss": a pair that cannot be aligned is corrupted or
/// does not overlap at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlignmentError {
    #[error("alignment error: inlet log contains no samples")]
    EmptyInlet,

    #[error("alignment error: first inlet value {value} never appears in the outlet log")]
    NotInOutlet { value: i64 },
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Short category label used in failure tables.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::IncompleteRun { .. } => "incomplete-run",
            Self::InconsistentRun { .. } => "inconsistent-run",
            Self::Alignment(_) => "alignment",
            Self::Transport(_) => "transport",
            Self::BadFileName { .. } => "file-name",
            Self::Malformed { .. } => "malformed-log",
            Self::AccumulatorClosed => "accumulator",
            Self::Io(_) => "io",
        }
    }
}
