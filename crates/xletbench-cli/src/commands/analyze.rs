//! `xletbench analyze`: verify and summarize every run in a log directory.

use std::path::Path;

use xletbench_analysis::{AnalysisResult, BatchReport, analyze_dir};

use super::{exit_with, fmt_secs};

pub fn run(dir: &str, output: Option<&str>) {
    let report = analyze_dir(Path::new(dir)).unwrap_or_else(|e| exit_with(&format!("cannot analyze {dir}"), e));

    if report.results.is_empty() && report.failures.is_empty() {
        println!("No runs found in {dir}");
        return;
    }

    print_table(&report);

    for failure in &report.failures {
        eprintln!("run {}: {} error: {}", failure.id, failure.kind, failure.error);
    }

    let lossy = report.runs_with_loss().count();
    println!();
    println!(
        "{} runs analyzed, {lossy} with data loss, {} failed",
        report.results.len(),
        report.failures.len()
    );

    if let Some(path) = output {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    exit_with(&format!("cannot write {path}"), e);
                }
                println!("Report written to {path}");
            }
            Err(e) => exit_with("cannot serialize report", e),
        }
    }

    if report.all_failed() {
        std::process::exit(1);
    }
}

const HEADER: [&str; 11] = [
    "id", "inlet", "outlet", "datatype", "platform", "multiproc", "fs", "window", "loss", "window_dur", "latency",
];

fn print_table(report: &BatchReport) {
    println!("{}", format_row(&HEADER.map(str::to_string)));
    for result in &report.results {
        println!("{}", format_row(&row(result)));
    }
}

fn row(result: &AnalysisResult) -> [String; 11] {
    let meta = &result.meta;
    [
        result.run_id.to_string(),
        meta.inlet_kind.clone(),
        meta.outlet_kind.clone(),
        meta.datatype.to_string(),
        meta.platform.clone(),
        meta.multiproc.to_string(),
        meta.sample_rate.to_string(),
        meta.window_size.to_string(),
        if result.data_loss_detected { "yes" } else { "no" }.to_string(),
        fmt_secs(result.mean_window_duration),
        fmt_secs(Some(result.mean_latency)),
    ]
}

fn format_row(cells: &[String; 11]) -> String {
    format!(
        "{:>4}  {:<9} {:<10} {:<10} {:<9} {:<9} {:>6} {:>6} {:<4} {:>10} {:>10}",
        cells[0], cells[1], cells[2], cells[3], cells[4], cells[5], cells[6], cells[7], cells[8], cells[9], cells[10]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use xletbench_analysis::Consistency;
    use xletbench_core::{Datatype, RunMetadata};

    fn result(loss: bool, window_dur: Option<f64>, latency: f64) -> AnalysisResult {
        AnalysisResult {
            run_id: 3,
            meta: RunMetadata {
                id: 3,
                outlet_kind: "tcpchunk".to_string(),
                inlet_kind: "tcppoll".to_string(),
                datatype: Datatype::Counter,
                platform: "linux".to_string(),
                multiproc: false,
                sample_rate: 1000,
                window_size: 60,
            },
            data_loss_detected: loss,
            mean_window_duration: window_dur,
            mean_latency: latency,
            mean_corrected_latency: latency,
            samples_sent: 120,
            samples_received: 120,
            consistency: Consistency {
                loss_detected: loss,
                skipped_prefix: 0,
                compared: 120,
                first_mismatch: None,
            },
            latency: None,
        }
    }

    #[test]
    fn test_row_cells() {
        let cells = row(&result(false, Some(0.0595), 0.0002));
        assert_eq!(cells[0], "3");
        assert_eq!(cells[1], "tcppoll");
        assert_eq!(cells[2], "tcpchunk");
        assert_eq!(cells[5], "false");
        assert_eq!(cells[8], "no");
        assert_eq!(cells[9], "0.059500");
        assert_eq!(cells[10], "0.000200");
    }

    #[test]
    fn test_row_without_durations() {
        let cells = row(&result(true, None, f64::NAN));
        assert_eq!(cells[8], "yes");
        assert_eq!(cells[9], "-");
        assert_eq!(cells[10], "-");
    }

    #[test]
    fn test_header_lines_up_with_rows() {
        let header = format_row(&HEADER.map(str::to_string));
        let line = format_row(&row(&result(false, Some(0.05), 0.001)));
        assert_eq!(header.len(), line.len());
    }
}
