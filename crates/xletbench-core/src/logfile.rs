//! Per-run log files.
//!
//! Each xlet writes one CSV-like file named by [`RunMetadata::file_name`]:
//!
//! - producer: `t_gen_outlet,x`, one row per sample, or one `;`-joined row per
//!   chunk for chunked outlets;
//! - consumer: `t_gen_outlet,t_lsl_offset,t_arr_inlet,x`, one row per window
//!   in the field-major layout of [`Window::to_line`].
//!
//! The end-of-stream marker is never logged. Writers are buffered and are
//! flushed and closed exactly once by `finish(self)`; a process that dies
//! before that leaves a truncated log behind.
//!
//! [`RunMetadata::file_name`]: crate::meta::RunMetadata::file_name

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::sample::{SENTINEL, Sample};
use crate::window::{Window, parse_f64, parse_value};

pub const PRODUCER_HEADER: &str = "t_gen_outlet,x";
pub const CONSUMER_HEADER: &str = "t_gen_outlet,t_lsl_offset,t_arr_inlet,x";

fn create_with_header(path: &Path, header: &str) -> Result<BufWriter<File>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "{header}")?;
    Ok(writer)
}

// ---------------------------------------------------------------------------
// Producer log
// ---------------------------------------------------------------------------

/// Echo of everything the outlet handed to the Bus.
pub struct ProducerLogWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    samples_written: u64,
    rows_written: u64,
}

impl ProducerLogWriter {
    /// Create the file (and its directory) and write the header.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let writer = create_with_header(&path, PRODUCER_HEADER)?;
        log::debug!("producer log opened at {}", path.display());
        Ok(Self {
            path,
            writer,
            samples_written: 0,
            rows_written: 0,
        })
    }

    pub fn write_sample(&mut self, sample: &Sample) -> Result<()> {
        writeln!(self.writer, "{},{}", sample.t_generated, sample.value)?;
        self.samples_written += 1;
        self.rows_written += 1;
        Ok(())
    }

    /// One row for a whole chunk; an empty chunk writes nothing.
    pub fn write_chunk(&mut self, samples: &[Sample]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let stamps: Vec<String> = samples.iter().map(|s| s.t_generated.to_string()).collect();
        let values: Vec<String> = samples.iter().map(|s| s.value.to_string()).collect();
        writeln!(self.writer, "{},{}", stamps.join(";"), values.join(";"))?;
        self.samples_written += samples.len() as u64;
        self.rows_written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Flush and close the log. Returns its path.
    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer.flush()?;
        log::info!(
            "producer log closed: {} samples in {} rows -> {}",
            self.samples_written,
            self.rows_written,
            self.path.display()
        );
        Ok(self.path)
    }
}

// ---------------------------------------------------------------------------
// Consumer log
// ---------------------------------------------------------------------------

/// One row per window delivered by the accumulator.
pub struct ConsumerLogWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    windows_written: u64,
    records_written: u64,
}

impl ConsumerLogWriter {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let writer = create_with_header(&path, CONSUMER_HEADER)?;
        log::debug!("consumer log opened at {}", path.display());
        Ok(Self {
            path,
            writer,
            windows_written: 0,
            records_written: 0,
        })
    }

    pub fn write_window(&mut self, window: &Window) -> Result<()> {
        self.writer.write_all(window.to_line().as_bytes())?;
        self.windows_written += 1;
        self.records_written += window.len() as u64;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn windows_written(&self) -> u64 {
        self.windows_written
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer.flush()?;
        log::info!(
            "consumer log closed: {} records in {} windows -> {}",
            self.records_written,
            self.windows_written,
            self.path.display()
        );
        Ok(self.path)
    }
}

// ---------------------------------------------------------------------------
// Readers
// ---------------------------------------------------------------------------

fn malformed(path: &Path, line: usize, reason: impl Into<String>) -> Error {
    Error::Malformed {
        path: path.to_path_buf(),
        line,
        reason: reason.into(),
    }
}

/// Iterate the data rows of a log after checking its header.
/// Yields `(1-based line number, row)`; blank lines are skipped.
fn data_rows(path: &Path, header: &str) -> Result<Vec<(usize, String)>> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines();

    let first = match lines.next() {
        Some(line) => line?,
        None => return Err(malformed(path, 1, "empty file, missing header")),
    };
    if first.trim_end_matches('\r') != header {
        return Err(malformed(
            path,
            1,
            format!("expected header '{header}', found '{first}'"),
        ));
    }

    let mut rows = Vec::new();
    for (i, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        rows.push((i + 2, line));
    }
    Ok(rows)
}

/// Read a producer log, flattening chunk rows into individual samples.
pub fn read_producer_log(path: &Path) -> Result<Vec<Sample>> {
    let mut samples = Vec::new();

    for (n, row) in data_rows(path, PRODUCER_HEADER)? {
        let (stamps, values) = row
            .trim_end_matches('\r')
            .split_once(',')
            .ok_or_else(|| malformed(path, n, "expected 2 fields"))?;
        if values.contains(',') {
            return Err(malformed(path, n, "expected 2 fields"));
        }

        let stamps: Vec<&str> = stamps.split(';').collect();
        let values: Vec<&str> = values.split(';').collect();
        if stamps.len() != values.len() {
            return Err(malformed(
                path,
                n,
                format!(
                    "misaligned chunk: {} timestamps, {} values",
                    stamps.len(),
                    values.len()
                ),
            ));
        }

        for (t, x) in stamps.iter().zip(&values) {
            let t_generated = parse_f64(t.trim())
                .ok_or_else(|| malformed(path, n, format!("bad t_gen_outlet value '{t}'")))?;
            let value = parse_value(x.trim())
                .ok_or_else(|| malformed(path, n, format!("bad x value '{x}'")))?;
            if value == SENTINEL {
                return Err(malformed(path, n, "end-of-stream marker logged as data"));
            }
            samples.push(Sample::new(value, t_generated));
        }
    }

    log::debug!("read {} samples from {}", samples.len(), path.display());
    Ok(samples)
}

/// Read a consumer log back into its windows.
pub fn read_consumer_log(path: &Path) -> Result<Vec<Window>> {
    let mut windows = Vec::new();
    for (n, row) in data_rows(path, CONSUMER_HEADER)? {
        let window = Window::parse_line(&row).map_err(|reason| malformed(path, n, reason))?;
        windows.push(window);
    }
    log::debug!("read {} windows from {}", windows.len(), path.display());
    Ok(windows)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
