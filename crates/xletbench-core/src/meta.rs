//! Run metadata codec.
//!
//! A run's configuration travels in the log file names, one per xlet:
//!
//! ```text
//! id-<int>_{inlet|outlet}-<kind>_datatype-<datatype>_platform-<platform>_multiproc-<True|False>_fs-<int>_window-<int>.csv
//! ```
//!
//! Segments are separated by `_`, key and value by `-`, in this fixed order.
//! Offline, the two files of a run are paired back into one [`RunMetadata`].

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const SEGMENT_KEYS: [&str; 7] = ["id", "<role>", "datatype", "platform", "multiproc", "fs", "window"];

/// Which side of the Bus wrote a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Outlet,
    Inlet,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outlet => write!(f, "outlet"),
            Self::Inlet => write!(f, "inlet"),
        }
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "outlet" => Ok(Self::Outlet),
            "inlet" => Ok(Self::Inlet),
            other => Err(Error::config(format!("unknown xlet role '{other}'"))),
        }
    }
}

/// Kind of stream being benchmarked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Datatype {
    /// Synthetic counter produced by the sample generator.
    Counter,
    /// Recorded physiological signal from an external acquisition device.
    Airsignal,
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Counter => write!(f, "counter"),
            Self::Airsignal => write!(f, "airsignal"),
        }
    }
}

impl FromStr for Datatype {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "counter" => Ok(Self::Counter),
            "airsignal" => Ok(Self::Airsignal),
            other => Err(Error::config(format!(
                "unsupported datatype '{other}' (expected counter or airsignal)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// RunMetadata
// ---------------------------------------------------------------------------

/// Configuration shared by the two xlets of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub id: u32,
    pub outlet_kind: String,
    pub inlet_kind: String,
    pub datatype: Datatype,
    pub platform: String,
    pub multiproc: bool,
    pub sample_rate: u32,
    pub window_size: usize,
}

impl RunMetadata {
    /// Check every field can be encoded and describes a runnable configuration.
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(Error::config("window size must be at least 1"));
        }
        if self.sample_rate == 0 {
            return Err(Error::config("sample rate must be at least 1 Hz"));
        }
        check_text_field("outlet kind", &self.outlet_kind)?;
        check_text_field("inlet kind", &self.inlet_kind)?;
        check_text_field("platform", &self.platform)?;
        Ok(())
    }

    pub fn kind(&self, role: Role) -> &str {
        match role {
            Role::Outlet => &self.outlet_kind,
            Role::Inlet => &self.inlet_kind,
        }
    }

    /// Log file name for one side of the run.
    pub fn file_name(&self, role: Role) -> Result<String> {
        self.validate()?;
        Ok(format!(
            "id-{}_{}-{}_datatype-{}_platform-{}_multiproc-{}_fs-{}_window-{}.csv",
            self.id,
            role,
            self.kind(role),
            self.datatype,
            self.platform,
            if self.multiproc { "True" } else { "False" },
            self.sample_rate,
            self.window_size,
        ))
    }

    /// Rebuild the metadata from the outlet and inlet file names of one run.
    pub fn from_file_names(outlet: &str, inlet: &str) -> Result<Self> {
        let outlet = LogFileName::parse(outlet)?;
        let inlet = LogFileName::parse(inlet)?;
        merge(&outlet, &inlet, || {
            vec![PathBuf::from(&outlet.raw), PathBuf::from(&inlet.raw)]
        })
    }
}

fn check_text_field(name: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::config(format!("{name} must not be empty")));
    }
    if let Some(c) = value.chars().find(|c| matches!(c, '_' | '-' | '.' | '/' | '\\')) {
        return Err(Error::config(format!(
            "{name} '{value}' contains reserved character '{c}'"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// LogFileName
// ---------------------------------------------------------------------------

/// One parsed log file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileName {
    pub id: u32,
    pub role: Role,
    pub kind: String,
    pub datatype: Datatype,
    pub platform: String,
    pub multiproc: bool,
    pub sample_rate: u32,
    pub window_size: usize,
    raw: String,
}

impl LogFileName {
    pub fn parse(name: &str) -> Result<Self> {
        let bad = |reason: String| Error::BadFileName {
            name: name.to_string(),
            reason,
        };

        let stem = name
            .strip_suffix(".csv")
            .ok_or_else(|| bad("missing .csv extension".to_string()))?;
        let segments: Vec<&str> = stem.split('_').collect();
        if segments.len() != SEGMENT_KEYS.len() {
            return Err(bad(format!(
                "expected {} '_'-separated segments, found {}",
                SEGMENT_KEYS.len(),
                segments.len()
            )));
        }

        let mut pairs = Vec::with_capacity(segments.len());
        for (i, seg) in segments.iter().enumerate() {
            let (key, value) = seg
                .split_once('-')
                .ok_or_else(|| bad(format!("segment '{seg}' has no key-value separator")))?;
            if i != 1 && key != SEGMENT_KEYS[i] {
                return Err(bad(format!(
                    "segment {} should be '{}', found '{key}'",
                    i + 1,
                    SEGMENT_KEYS[i]
                )));
            }
            pairs.push((key, value));
        }

        let id = pairs[0]
            .1
            .parse()
            .map_err(|_| bad(format!("run id '{}' is not an integer", pairs[0].1)))?;
        let role = pairs[1]
            .0
            .parse::<Role>()
            .map_err(|_| bad(format!("'{}' is neither inlet nor outlet", pairs[1].0)))?;
        let kind = pairs[1].1.to_string();
        let datatype = pairs[2].1.parse::<Datatype>().map_err(|e| bad(e.to_string()))?;
        let platform = pairs[3].1.to_string();
        let multiproc = match pairs[4].1 {
            "True" | "true" => true,
            "False" | "false" => false,
            other => return Err(bad(format!("multiproc '{other}' is not True/False"))),
        };
        let sample_rate = pairs[5]
            .1
            .parse()
            .map_err(|_| bad(format!("fs '{}' is not an integer", pairs[5].1)))?;
        let window_size = pairs[6]
            .1
            .parse()
            .map_err(|_| bad(format!("window '{}' is not an integer", pairs[6].1)))?;

        Ok(Self {
            id,
            role,
            kind,
            datatype,
            platform,
            multiproc,
            sample_rate,
            window_size,
            raw: name.to_string(),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self::parse(&name)
    }
}

/// Run id prefix of a log file name (`id-<n>_...`), if present.
pub fn run_id_of(name: &str) -> Option<u32> {
    let first = name.split('_').next()?;
    first.strip_prefix("id-")?.parse().ok()
}

fn merge(
    outlet: &LogFileName,
    inlet: &LogFileName,
    files: impl Fn() -> Vec<PathBuf>,
) -> Result<RunMetadata> {
    if outlet.role != Role::Outlet || inlet.role != Role::Inlet {
        return Err(Error::IncompleteRun {
            id: outlet.id,
            files: files(),
        });
    }

    let id = outlet.id;
    let mismatch = |field: &'static str, o: String, i: String| Error::InconsistentRun {
        id,
        field,
        outlet: o,
        inlet: i,
    };
    if outlet.id != inlet.id {
        return Err(mismatch("id", outlet.id.to_string(), inlet.id.to_string()));
    }
    if outlet.datatype != inlet.datatype {
        return Err(mismatch(
            "datatype",
            outlet.datatype.to_string(),
            inlet.datatype.to_string(),
        ));
    }
    if outlet.platform != inlet.platform {
        return Err(mismatch("platform", outlet.platform.clone(), inlet.platform.clone()));
    }
    if outlet.multiproc != inlet.multiproc {
        return Err(mismatch(
            "multiproc",
            outlet.multiproc.to_string(),
            inlet.multiproc.to_string(),
        ));
    }
    if outlet.sample_rate != inlet.sample_rate {
        return Err(mismatch(
            "fs",
            outlet.sample_rate.to_string(),
            inlet.sample_rate.to_string(),
        ));
    }
    if outlet.window_size != inlet.window_size {
        return Err(mismatch(
            "window",
            outlet.window_size.to_string(),
            inlet.window_size.to_string(),
        ));
    }

    Ok(RunMetadata {
        id,
        outlet_kind: outlet.kind.clone(),
        inlet_kind: inlet.kind.clone(),
        datatype: outlet.datatype,
        platform: outlet.platform.clone(),
        multiproc: outlet.multiproc,
        sample_rate: outlet.sample_rate,
        window_size: outlet.window_size,
    })
}

// ---------------------------------------------------------------------------
// Pairing
// ---------------------------------------------------------------------------

/// The resolved outlet/inlet pair of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPair {
    pub meta: RunMetadata,
    pub outlet: PathBuf,
    pub inlet: PathBuf,
}

/// Resolve the files of one run into a [`RunPair`].
///
/// Exactly one outlet and one inlet log are required, and every field other
/// than the xlet kinds must agree between them.
pub fn pair_run(id: u32, files: &[PathBuf]) -> Result<RunPair> {
    let incomplete = || Error::IncompleteRun {
        id,
        files: files.to_vec(),
    };
    if files.len() != 2 {
        return Err(incomplete());
    }

    let parsed = files
        .iter()
        .map(|p| LogFileName::from_path(p).map(|n| (n, p.clone())))
        .collect::<Result<Vec<_>>>()?;

    let outlets: Vec<&(LogFileName, PathBuf)> =
        parsed.iter().filter(|(n, _)| n.role == Role::Outlet).collect();
    let inlets: Vec<&(LogFileName, PathBuf)> =
        parsed.iter().filter(|(n, _)| n.role == Role::Inlet).collect();
    if outlets.len() != 1 || inlets.len() != 1 {
        return Err(incomplete());
    }

    let (outlet_name, outlet_path) = outlets[0];
    let (inlet_name, inlet_path) = inlets[0];
    if outlet_name.id != id || inlet_name.id != id {
        return Err(Error::InconsistentRun {
            id,
            field: "id",
            outlet: outlet_name.id.to_string(),
            inlet: inlet_name.id.to_string(),
        });
    }
    let meta = merge(outlet_name, inlet_name, || files.to_vec())?;

    Ok(RunPair {
        meta,
        outlet: outlet_path.clone(),
        inlet: inlet_path.clone(),
    })
}

/// Group the `*.csv` files of a directory by run id, sorted by id then name.
pub fn group_runs(dir: &Path) -> Result<BTreeMap<u32, Vec<PathBuf>>> {
    let mut runs: BTreeMap<u32, Vec<PathBuf>> = BTreeMap::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().is_none_or(|e| e != "csv") {
            continue;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        match run_id_of(&name) {
            Some(id) => runs.entry(id).or_default().push(path),
            None => log::debug!("skipping {name}: no run id prefix"),
        }
    }

    for files in runs.values_mut() {
        files.sort();
    }
    Ok(runs)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> RunMetadata {
        RunMetadata {
            id: 4,
            outlet_kind: "tcpchunk".to_string(),
            inlet_kind: "tcppull".to_string(),
            datatype: Datatype::Counter,
            platform: "debian".to_string(),
            multiproc: true,
            sample_rate: 1000,
            window_size: 60,
        }
    }

    #[test]
    fn test_file_name_layout() {
        assert_eq!(
            meta().file_name(Role::Inlet).unwrap(),
            "id-4_inlet-tcppull_datatype-counter_platform-debian_multiproc-True_fs-1000_window-60.csv"
        );
        assert!(
            meta()
                .file_name(Role::Outlet)
                .unwrap()
                .starts_with("id-4_outlet-tcpchunk_")
        );
    }

    #[test]
    fn test_round_trip() {
        let m = meta();
        let outlet = m.file_name(Role::Outlet).unwrap();
        let inlet = m.file_name(Role::Inlet).unwrap();
        assert_eq!(RunMetadata::from_file_names(&outlet, &inlet).unwrap(), m);

        let mut single = m.clone();
        single.multiproc = false;
        single.window_size = 1;
        let outlet = single.file_name(Role::Outlet).unwrap();
        let inlet = single.file_name(Role::Inlet).unwrap();
        assert_eq!(
            RunMetadata::from_file_names(&outlet, &inlet).unwrap(),
            single
        );
    }

    #[test]
    fn test_encode_rejects_reserved_characters() {
        let mut m = meta();
        m.platform = "mac_os".to_string();
        assert!(matches!(m.file_name(Role::Outlet), Err(Error::Configuration(_))));
        m.platform = "macos".to_string();
        m.inlet_kind = "ez-lsl".to_string();
        assert!(m.file_name(Role::Outlet).is_err());
        m.inlet_kind = String::new();
        assert!(m.file_name(Role::Outlet).is_err());
    }

    #[test]
    fn test_encode_rejects_zero_window() {
        let mut m = meta();
        m.window_size = 0;
        assert!(matches!(m.file_name(Role::Inlet), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_parse_legacy_name() {
        let n = LogFileName::parse(
            "id-12_outlet-ezmsgpylsl_datatype-airsignal_platform-windows_multiproc-False_fs-1000_window-100.csv",
        )
        .unwrap();
        assert_eq!(n.id, 12);
        assert_eq!(n.role, Role::Outlet);
        assert_eq!(n.kind, "ezmsgpylsl");
        assert_eq!(n.datatype, Datatype::Airsignal);
        assert!(!n.multiproc);
        assert_eq!(n.window_size, 100);
    }

    #[test]
    fn test_parse_rejects_bad_names() {
        for name in [
            "id-1_outlet-x_datatype-counter_platform-p_multiproc-True_fs-10_window-1.txt",
            "id-1_outlet-x_datatype-counter_platform-p_multiproc-True_fs-10.csv",
            "id-1_sideways-x_datatype-counter_platform-p_multiproc-True_fs-10_window-1.csv",
            "id-1_outlet-x_datatype-noise_platform-p_multiproc-True_fs-10_window-1.csv",
            "id-1_outlet-x_datatype-counter_platform-p_multiproc-Maybe_fs-10_window-1.csv",
            "id-one_outlet-x_datatype-counter_platform-p_multiproc-True_fs-10_window-1.csv",
            "id-1_outlet-x_kind-counter_platform-p_multiproc-True_fs-10_window-1.csv",
        ] {
            assert!(
                matches!(LogFileName::parse(name), Err(Error::BadFileName { .. })),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_run_id_of() {
        assert_eq!(run_id_of("id-7_outlet-x.csv"), Some(7));
        assert_eq!(run_id_of("sweep.json"), None);
        assert_eq!(run_id_of("id-x_outlet"), None);
    }

    #[test]
    fn test_pair_run_resolves_roles() {
        let m = meta();
        let files = vec![
            PathBuf::from("logs").join(m.file_name(Role::Inlet).unwrap()),
            PathBuf::from("logs").join(m.file_name(Role::Outlet).unwrap()),
        ];
        let pair = pair_run(4, &files).unwrap();
        assert_eq!(pair.meta, m);
        assert_eq!(pair.inlet, files[0]);
        assert_eq!(pair.outlet, files[1]);
    }

    #[test]
    fn test_pair_run_needs_exactly_two_files() {
        let m = meta();
        let mut other = m.clone();
        other.inlet_kind = "tcppoll".to_string();
        let files = vec![
            PathBuf::from(m.file_name(Role::Outlet).unwrap()),
            PathBuf::from(m.file_name(Role::Inlet).unwrap()),
            PathBuf::from(other.file_name(Role::Inlet).unwrap()),
        ];
        assert!(matches!(
            pair_run(4, &files),
            Err(Error::IncompleteRun { id: 4, ref files }) if files.len() == 3
        ));
        assert!(matches!(
            pair_run(4, &files[..1]),
            Err(Error::IncompleteRun { .. })
        ));
    }

    #[test]
    fn test_pair_run_needs_one_file_per_role() {
        let m = meta();
        let mut other = m.clone();
        other.inlet_kind = "tcppoll".to_string();
        let files = vec![
            PathBuf::from(m.file_name(Role::Inlet).unwrap()),
            PathBuf::from(other.file_name(Role::Inlet).unwrap()),
        ];
        assert!(matches!(
            pair_run(4, &files),
            Err(Error::IncompleteRun { .. })
        ));
    }

    #[test]
    fn test_pair_run_detects_inconsistency() {
        let m = meta();
        let mut other = m.clone();
        other.sample_rate = 500;
        let files = vec![
            PathBuf::from(m.file_name(Role::Outlet).unwrap()),
            PathBuf::from(other.file_name(Role::Inlet).unwrap()),
        ];
        match pair_run(4, &files) {
            Err(Error::InconsistentRun {
                field, outlet, inlet, ..
            }) => {
                assert_eq!(field, "fs");
                assert_eq!(outlet, "1000");
                assert_eq!(inlet, "500");
            }
            other => panic!("expected inconsistent run, got {other:?}"),
        }
    }

    #[test]
    fn test_group_runs_by_id() {
        let tmp = tempfile::tempdir().unwrap();
        let mut m = meta();
        for id in [2, 10] {
            m.id = id;
            for role in [Role::Outlet, Role::Inlet] {
                std::fs::write(tmp.path().join(m.file_name(role).unwrap()), "x\n").unwrap();
            }
        }
        std::fs::write(tmp.path().join("sweep.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("notes.csv"), "").unwrap();

        let runs = group_runs(tmp.path()).unwrap();
        assert_eq!(runs.keys().copied().collect::<Vec<_>>(), vec![2, 10]);
        assert!(runs.values().all(|files| files.len() == 2));
    }
}
