//! `xletbench run`: execute a sweep plan, one outlet/inlet process pair per run.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use xletbench_core::{Datatype, Error, MachineInfo, Result, Role, RunMetadata, SweepPlan, detect_machine_info};

use super::exit_with;

/// Written to `<log_dir>/sweep.json` once the sweep stops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepRecord {
    pub id: String,
    pub started_unix_ms: u64,
    pub duration_ms: u64,
    pub platform: String,
    pub datatype: Datatype,
    pub plan: SweepPlan,
    pub machine: MachineInfo,
    pub runs: Vec<RunRecord>,
    /// Ctrl+C stopped the sweep before every run was launched.
    pub interrupted: bool,
    pub xletbench_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: u32,
    pub outlet_kind: String,
    pub inlet_kind: String,
    pub multiproc: bool,
    pub window_size: usize,
    pub port: u16,
    /// `None` when the process was killed by a signal or never started.
    pub outlet_exit: Option<i32>,
    pub inlet_exit: Option<i32>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

pub fn run(platform: &str, datatype: &str, plan_path: Option<&str>, log_dir: &str, dry_run: bool, verbose: bool) {
    let datatype: Datatype = datatype.parse().unwrap_or_else(|e| exit_with("run", e));
    let plan = match plan_path {
        Some(p) => SweepPlan::load(Path::new(p)).unwrap_or_else(|e| exit_with("run", e)),
        None => SweepPlan::default(),
    };
    let runs = plan
        .combos(datatype, platform)
        .unwrap_or_else(|e| exit_with("run", e));
    if runs.is_empty() {
        exit_with("run", "sweep plan yields no runs");
    }

    println!("Sweep: {} runs on {platform} ({datatype})", runs.len());
    print_plan(&runs, &plan);
    if dry_run {
        return;
    }

    let exe = std::env::current_exe().unwrap_or_else(|e| exit_with("cannot locate xletbench binary", e));
    let log_dir = PathBuf::from(log_dir);

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .unwrap_or_else(|e| exit_with("cannot set Ctrl+C handler", e));

    let started_unix_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    let start = Instant::now();
    let mut records = Vec::with_capacity(runs.len());
    let mut interrupted = false;

    for (i, meta) in runs.iter().enumerate() {
        if !running.load(Ordering::SeqCst) {
            interrupted = true;
            break;
        }
        let record = execute(&exe, meta, &plan, &log_dir, verbose);
        if record.success {
            log::info!("run {} finished in {} ms", record.id, record.duration_ms);
        } else {
            log::warn!(
                "run {} failed (outlet exit {:?}, inlet exit {:?}){}",
                record.id,
                record.outlet_exit,
                record.inlet_exit,
                record.error.as_deref().map(|e| format!(": {e}")).unwrap_or_default()
            );
        }
        records.push(record);

        if i + 1 < runs.len() && running.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(plan.pause_ms));
        }
    }
    if !running.load(Ordering::SeqCst) && records.len() == runs.len() {
        // The last run was still in flight when Ctrl+C arrived.
        interrupted = true;
    }

    let sweep = SweepRecord {
        id: Uuid::new_v4().to_string(),
        started_unix_ms,
        duration_ms: start.elapsed().as_millis() as u64,
        platform: platform.to_string(),
        datatype,
        plan,
        machine: detect_machine_info(),
        runs: records,
        interrupted,
        xletbench_version: xletbench_core::VERSION.to_string(),
    };
    let path = write_sweep(&log_dir, &sweep).unwrap_or_else(|e| exit_with("cannot write sweep record", e));

    let failed = sweep.runs.iter().filter(|r| !r.success).count();
    println!();
    println!(
        "{} of {} runs completed, {failed} failed{}",
        sweep.runs.len() - failed,
        runs.len(),
        if interrupted { " (interrupted)" } else { "" }
    );
    println!("Sweep record: {}", path.display());
    println!("Analyze with: xletbench analyze --dir {}", log_dir.display());
}

fn print_plan(runs: &[RunMetadata], plan: &SweepPlan) {
    println!(
        "{:>4}  {:<10} {:<10} {:<9} {:>6} {:>6}",
        "id", "outlet", "inlet", "multiproc", "window", "port"
    );
    for meta in runs {
        let port = plan
            .port_for(meta.id)
            .map(|p| p.to_string())
            .unwrap_or_else(|_| "-".to_string());
        println!(
            "{:>4}  {:<10} {:<10} {:<9} {:>6} {:>6}",
            meta.id, meta.outlet_kind, meta.inlet_kind, meta.multiproc, meta.window_size, port
        );
    }
}

/// Command-line arguments for one side of a run.
pub fn xlet_args(role: Role, meta: &RunMetadata, plan: &SweepPlan, port: u16, log_dir: &Path, verbose: bool) -> Vec<String> {
    let mut args = vec![
        role.to_string(),
        "--id".to_string(),
        meta.id.to_string(),
        "--kind".to_string(),
        meta.kind(role).to_string(),
        "--datatype".to_string(),
        meta.datatype.to_string(),
        "--platform".to_string(),
        meta.platform.clone(),
        "--multiproc".to_string(),
        meta.multiproc.to_string(),
        "--fs".to_string(),
        meta.sample_rate.to_string(),
        "--window".to_string(),
        meta.window_size.to_string(),
        "--port".to_string(),
        port.to_string(),
        "--log-dir".to_string(),
        log_dir.display().to_string(),
    ];
    match role {
        Role::Outlet => args.extend([
            "--total-count".to_string(),
            plan.total_count.to_string(),
            "--subscriber-wait-secs".to_string(),
            plan.ready_timeout_secs.to_string(),
        ]),
        Role::Inlet => args.extend([
            "--tail-policy".to_string(),
            plan.tail_policy.to_string(),
            "--ready-timeout-secs".to_string(),
            plan.ready_timeout_secs.to_string(),
        ]),
    }
    if verbose {
        args.push("--verbose".to_string());
    }
    args
}

fn spawn(exe: &Path, role: Role, meta: &RunMetadata, plan: &SweepPlan, port: u16, log_dir: &Path, verbose: bool) -> Result<Child> {
    Command::new(exe)
        .args(xlet_args(role, meta, plan, port, log_dir, verbose))
        .spawn()
        .map_err(|e| Error::config(format!("cannot start {role} for run {}: {e}", meta.id)))
}

fn wait(child: &mut Child, role: Role) -> (Option<i32>, Option<String>) {
    match child.wait() {
        Ok(status) => (status.code(), describe_failure(role, status)),
        Err(e) => (None, Some(format!("waiting for {role}: {e}"))),
    }
}

fn describe_failure(role: Role, status: ExitStatus) -> Option<String> {
    if status.success() {
        None
    } else {
        Some(format!("{role} {status}"))
    }
}

fn execute(exe: &Path, meta: &RunMetadata, plan: &SweepPlan, log_dir: &Path, verbose: bool) -> RunRecord {
    let started = Instant::now();
    let mut record = RunRecord {
        id: meta.id,
        outlet_kind: meta.outlet_kind.clone(),
        inlet_kind: meta.inlet_kind.clone(),
        multiproc: meta.multiproc,
        window_size: meta.window_size,
        port: 0,
        outlet_exit: None,
        inlet_exit: None,
        success: false,
        error: None,
        duration_ms: 0,
    };

    let port = match plan.port_for(meta.id) {
        Ok(p) => p,
        Err(e) => {
            record.error = Some(e.to_string());
            return record;
        }
    };
    record.port = port;
    println!(
        "\n[run {}] {} -> {}  multiproc={} window={} port={port}",
        meta.id, meta.outlet_kind, meta.inlet_kind, meta.multiproc, meta.window_size
    );

    let mut outlet = match spawn(exe, Role::Outlet, meta, plan, port, log_dir, verbose) {
        Ok(c) => c,
        Err(e) => {
            record.error = Some(e.to_string());
            return record;
        }
    };
    let mut inlet = match spawn(exe, Role::Inlet, meta, plan, port, log_dir, verbose) {
        Ok(c) => c,
        Err(e) => {
            // Without an inlet the outlet would stream into the void.
            let _ = outlet.kill();
            let _ = outlet.wait();
            record.error = Some(e.to_string());
            return record;
        }
    };

    let (inlet_exit, inlet_err) = wait(&mut inlet, Role::Inlet);
    let (outlet_exit, outlet_err) = wait(&mut outlet, Role::Outlet);
    record.outlet_exit = outlet_exit;
    record.inlet_exit = inlet_exit;
    let errors: Vec<String> = [outlet_err, inlet_err].into_iter().flatten().collect();
    record.success = errors.is_empty();
    record.error = (!errors.is_empty()).then(|| errors.join("; "));
    record.duration_ms = started.elapsed().as_millis() as u64;
    record
}

fn write_sweep(log_dir: &Path, sweep: &SweepRecord) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir)?;
    let path = log_dir.join("sweep.json");
    let json = serde_json::to_string_pretty(sweep)
        .map_err(|e| Error::config(format!("cannot serialize sweep record: {e}")))?;
    std::fs::write(&path, json)?;
    Ok(path)
}
