//! Inlet-side windowing of delivery records.
//!
//! The accumulator is a two-state machine:
//!
//! ```text
//!            push (k+1 < W)
//!           ┌──────────────┐
//!           ▼              │
//!   ┌──────────────┐  push (k+1 == W) → emit window, clear
//!   │ Filling(k)   │───────────────────────────────┐
//!   └──────────────┘◄──────────────────────────────┘
//!           │ end-of-stream → flush or drop tail, emit end
//!           ▼
//!   ┌──────────────┐
//!   │ Draining     │  terminal; any input is an error
//!   └──────────────┘
//! ```
//!
//! A window is serialized as one text line, field-major: each field's values
//! are `;`-joined and the four per-field strings `,`-joined, so columns stay
//! aligned whatever the window length.

use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sample::DeliveryRecord;

/// Fate of a partially filled buffer when end-of-stream arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TailPolicy {
    /// Emit the short final window; no records are lost.
    #[default]
    Flush,
    /// Discard up to `W - 1` trailing records.
    Drop,
}

impl fmt::Display for TailPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flush => write!(f, "flush"),
            Self::Drop => write!(f, "drop"),
        }
    }
}

impl FromStr for TailPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "flush" => Ok(Self::Flush),
            "drop" => Ok(Self::Drop),
            other => Err(Error::config(format!(
                "unknown tail policy '{other}' (expected flush or drop)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Window
// ---------------------------------------------------------------------------

/// Ordered, non-empty batch of delivery records.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    records: Vec<DeliveryRecord>,
}

impl Window {
    /// Build a window; `None` for an empty record list.
    pub fn from_records(records: Vec<DeliveryRecord>) -> Option<Self> {
        if records.is_empty() {
            None
        } else {
            Some(Self { records })
        }
    }

    pub fn records(&self) -> &[DeliveryRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<DeliveryRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn first(&self) -> &DeliveryRecord {
        &self.records[0]
    }

    pub fn last(&self) -> &DeliveryRecord {
        &self.records[self.records.len() - 1]
    }

    /// Generation-time span covered by the window.
    pub fn span(&self) -> f64 {
        self.last().t_generated - self.first().t_generated
    }

    pub fn values(&self) -> impl Iterator<Item = i64> + '_ {
        self.records.iter().map(|r| r.value)
    }

    /// Field-major log line, newline-terminated.
    pub fn to_line(&self) -> String {
        let mut line = String::with_capacity(self.records.len() * 64);
        join_field(&mut line, &self.records, |r| r.t_generated.to_string());
        line.push(',');
        join_field(&mut line, &self.records, |r| r.t_clock_offset.to_string());
        line.push(',');
        join_field(&mut line, &self.records, |r| r.t_arrived.to_string());
        line.push(',');
        join_field(&mut line, &self.records, |r| r.value.to_string());
        line.push('\n');
        line
    }

    /// Inverse of [`Window::to_line`]. Accepts a line with or without its
    /// trailing newline.
    pub fn parse_line(line: &str) -> std::result::Result<Self, String> {
        let line = line.trim_end_matches(['\n', '\r']);
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 4 {
            return Err(format!("expected 4 fields, found {}", fields.len()));
        }

        let t_gen = parse_list(fields[0], "t_gen_outlet", parse_f64)?;
        let t_off = parse_list(fields[1], "t_lsl_offset", parse_f64)?;
        let t_arr = parse_list(fields[2], "t_arr_inlet", parse_f64)?;
        let xs = parse_list(fields[3], "x", parse_value)?;

        let n = xs.len();
        if t_gen.len() != n || t_off.len() != n || t_arr.len() != n {
            return Err(format!(
                "misaligned window: {} / {} / {} / {} values per field",
                t_gen.len(),
                t_off.len(),
                t_arr.len(),
                n
            ));
        }

        let records = (0..n)
            .map(|i| DeliveryRecord {
                t_generated: t_gen[i],
                t_clock_offset: t_off[i],
                t_arrived: t_arr[i],
                value: xs[i],
            })
            .collect();
        Self::from_records(records).ok_or_else(|| "empty window".to_string())
    }
}

fn join_field(out: &mut String, records: &[DeliveryRecord], f: impl Fn(&DeliveryRecord) -> String) {
    for (i, r) in records.iter().enumerate() {
        if i > 0 {
            out.push(';');
        }
        let _ = write!(out, "{}", f(r));
    }
}

fn parse_list<T>(
    field: &str,
    name: &str,
    parse: fn(&str) -> Option<T>,
) -> std::result::Result<Vec<T>, String> {
    field
        .split(';')
        .map(|s| parse(s.trim()).ok_or_else(|| format!("bad {name} value '{s}'")))
        .collect()
}

pub(crate) fn parse_f64(s: &str) -> Option<f64> {
    s.parse().ok()
}

/// Sample values are integers, but tolerate `2.0` style renderings.
pub(crate) fn parse_value(s: &str) -> Option<i64> {
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    let f: f64 = s.parse().ok()?;
    (f.fract() == 0.0 && f.abs() < 9.0e15).then_some(f as i64)
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// Input to the accumulator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Delivery {
    Record(DeliveryRecord),
    EndOfStream,
}

/// Output of the accumulator, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Window(Window),
    EndOfStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Filling,
    Draining,
}

/// Batches delivery records into windows of `window_size` records.
#[derive(Debug)]
pub struct WindowAccumulator {
    window_size: usize,
    policy: TailPolicy,
    buffer: Vec<DeliveryRecord>,
    state: State,
    windows_emitted: u64,
    records_emitted: u64,
    records_dropped: u64,
}

impl WindowAccumulator {
    pub fn new(window_size: usize, policy: TailPolicy) -> Result<Self> {
        if window_size == 0 {
            return Err(Error::config("window size must be at least 1"));
        }
        Ok(Self {
            window_size,
            policy,
            buffer: Vec::with_capacity(window_size),
            state: State::Filling,
            windows_emitted: 0,
            records_emitted: 0,
            records_dropped: 0,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn policy(&self) -> TailPolicy {
        self.policy
    }

    /// Records currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_draining(&self) -> bool {
        self.state == State::Draining
    }

    pub fn windows_emitted(&self) -> u64 {
        self.windows_emitted
    }

    pub fn records_emitted(&self) -> u64 {
        self.records_emitted
    }

    pub fn records_dropped(&self) -> u64 {
        self.records_dropped
    }

    /// Append one record; returns the completed window when the buffer fills.
    pub fn push(&mut self, record: DeliveryRecord) -> Result<Option<Window>> {
        if self.state == State::Draining {
            return Err(Error::AccumulatorClosed);
        }
        self.buffer.push(record);
        if self.buffer.len() < self.window_size {
            return Ok(None);
        }

        let window = self.take_window();
        log::debug!(
            "window #{} full: {} records, values {}..{}",
            self.windows_emitted,
            window.len(),
            window.first().value,
            window.last().value
        );
        Ok(Some(window))
    }

    /// Handle end-of-stream: apply the tail policy and enter `Draining`.
    pub fn finish(&mut self) -> Result<Option<Window>> {
        if self.state == State::Draining {
            return Err(Error::AccumulatorClosed);
        }
        self.state = State::Draining;

        if self.buffer.is_empty() {
            return Ok(None);
        }
        match self.policy {
            TailPolicy::Flush => {
                let window = self.take_window();
                log::debug!("flushing final partial window of {} records", window.len());
                Ok(Some(window))
            }
            TailPolicy::Drop => {
                let n = self.buffer.len();
                log::warn!("dropping {n} trailing records that never filled a window");
                self.records_dropped += n as u64;
                self.buffer.clear();
                Ok(None)
            }
        }
    }

    /// Feed one delivery through the state machine.
    pub fn accept(&mut self, delivery: Delivery) -> Result<Vec<Output>> {
        match delivery {
            Delivery::Record(record) => Ok(self.push(record)?.map(Output::Window).into_iter().collect()),
            Delivery::EndOfStream => {
                let mut out = Vec::with_capacity(2);
                if let Some(window) = self.finish()? {
                    out.push(Output::Window(window));
                }
                out.push(Output::EndOfStream);
                Ok(out)
            }
        }
    }

    fn take_window(&mut self) -> Window {
        let records = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.window_size));
        self.windows_emitted += 1;
        self.records_emitted += records.len() as u64;
        Window { records }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn rec(value: i64) -> DeliveryRecord {
        DeliveryRecord {
            t_generated: value as f64 * 0.001,
            t_clock_offset: 0.0,
            t_arrived: value as f64 * 0.001 + 0.0005,
            value,
        }
    }

    fn run(n: usize, w: usize, policy: TailPolicy) -> (Vec<Window>, WindowAccumulator) {
        let mut acc = WindowAccumulator::new(w, policy).unwrap();
        let mut windows = Vec::new();
        for v in 0..n as i64 {
            if let Some(win) = acc.push(rec(v)).unwrap() {
                windows.push(win);
            }
        }
        if let Some(win) = acc.finish().unwrap() {
            windows.push(win);
        }
        (windows, acc)
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    #[test]
    fn test_zero_window_rejected() {
        assert!(matches!(
            WindowAccumulator::new(0, TailPolicy::Flush),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_tail_policy_parse() {
        assert_eq!("flush".parse::<TailPolicy>().unwrap(), TailPolicy::Flush);
        assert_eq!("drop".parse::<TailPolicy>().unwrap(), TailPolicy::Drop);
        assert!("keep".parse::<TailPolicy>().is_err());
        assert_eq!(TailPolicy::default(), TailPolicy::Flush);
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    #[test]
    fn test_window_of_one_emits_every_record() {
        let mut acc = WindowAccumulator::new(1, TailPolicy::Flush).unwrap();
        for v in 0..3 {
            let w = acc.push(rec(v)).unwrap().unwrap();
            assert_eq!(w.len(), 1);
            assert_eq!(w.first().value, v);
        }
        assert_eq!(acc.buffered(), 0);
        assert_eq!(acc.finish().unwrap(), None);
    }

    #[test]
    fn test_full_window_clears_buffer() {
        let mut acc = WindowAccumulator::new(3, TailPolicy::Flush).unwrap();
        assert!(acc.push(rec(0)).unwrap().is_none());
        assert!(acc.push(rec(1)).unwrap().is_none());
        let w = acc.push(rec(2)).unwrap().unwrap();
        assert_eq!(w.values().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(acc.buffered(), 0);
        assert_eq!(acc.windows_emitted(), 1);
    }

    #[test]
    fn test_flush_policy_emits_short_tail() {
        let (windows, acc) = run(7, 3, TailPolicy::Flush);
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[2].values().collect::<Vec<_>>(), vec![6]);
        assert_eq!(acc.records_emitted(), 7);
        assert_eq!(acc.records_dropped(), 0);
    }

    #[test]
    fn test_drop_policy_discards_tail() {
        let (windows, acc) = run(7, 3, TailPolicy::Drop);
        assert_eq!(windows.len(), 2);
        assert_eq!(acc.records_emitted(), 6);
        assert_eq!(acc.records_dropped(), 1);
    }

    #[test]
    fn test_input_after_end_is_rejected() {
        let mut acc = WindowAccumulator::new(2, TailPolicy::Flush).unwrap();
        acc.finish().unwrap();
        assert!(acc.is_draining());
        assert!(matches!(acc.push(rec(0)), Err(Error::AccumulatorClosed)));
        assert!(matches!(acc.finish(), Err(Error::AccumulatorClosed)));
        assert!(matches!(
            acc.accept(Delivery::EndOfStream),
            Err(Error::AccumulatorClosed)
        ));
    }

    #[test]
    fn test_accept_end_emits_tail_then_end_marker() {
        let mut acc = WindowAccumulator::new(4, TailPolicy::Flush).unwrap();
        assert!(acc.accept(Delivery::Record(rec(1))).unwrap().is_empty());
        assert!(acc.accept(Delivery::Record(rec(2))).unwrap().is_empty());
        let out = acc.accept(Delivery::EndOfStream).unwrap();
        assert_eq!(out.len(), 2);
        assert!(matches!(&out[0], Output::Window(w) if w.len() == 2));
        assert_eq!(out[1], Output::EndOfStream);
    }

    #[test]
    fn test_accept_end_with_drop_policy_still_emits_end_marker() {
        let mut acc = WindowAccumulator::new(4, TailPolicy::Drop).unwrap();
        acc.accept(Delivery::Record(rec(1))).unwrap();
        let out = acc.accept(Delivery::EndOfStream).unwrap();
        assert_eq!(out, vec![Output::EndOfStream]);
    }

    #[test]
    fn test_window_counts_for_random_lengths() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..200 {
            let n = rng.random_range(0..500usize);
            let w = rng.random_range(1..40usize);

            let (flushed, acc) = run(n, w, TailPolicy::Flush);
            assert_eq!(flushed.len(), n.div_ceil(w), "n={n} w={w}");
            assert_eq!(acc.records_emitted() as usize, n);
            let total: usize = flushed.iter().map(Window::len).sum();
            assert_eq!(total, n);
            assert!(flushed.iter().rev().skip(1).all(|win| win.len() == w));

            let (dropped, _) = run(n, w, TailPolicy::Drop);
            assert_eq!(dropped.len(), n / w, "n={n} w={w}");
        }
    }

    #[test]
    fn test_windows_preserve_arrival_order() {
        let (windows, _) = run(50, 7, TailPolicy::Flush);
        let flat: Vec<i64> = windows.iter().flat_map(|w| w.values().collect::<Vec<_>>()).collect();
        assert_eq!(flat, (0..50).collect::<Vec<_>>());
    }

    // -----------------------------------------------------------------------
    // Serialization
    // -----------------------------------------------------------------------

    #[test]
    fn test_line_is_field_major() {
        let w = Window::from_records(vec![
            DeliveryRecord {
                t_generated: 1.5,
                t_clock_offset: 0.0,
                t_arrived: 1.75,
                value: 2,
            },
            DeliveryRecord {
                t_generated: 2.5,
                t_clock_offset: 0.125,
                t_arrived: 2.75,
                value: 3,
            },
        ])
        .unwrap();
        assert_eq!(w.to_line(), "1.5;2.5,0;0.125,1.75;2.75,2;3\n");
    }

    #[test]
    fn test_single_record_line_has_no_separators() {
        let w = Window::from_records(vec![rec(9)]).unwrap();
        let line = w.to_line();
        assert!(!line.contains(';'));
        assert_eq!(line.matches(',').count(), 3);
    }

    #[test]
    fn test_parse_line_inverts_to_line() {
        let (windows, _) = run(10, 4, TailPolicy::Flush);
        for w in windows {
            assert_eq!(Window::parse_line(&w.to_line()).unwrap(), w);
        }
    }

    #[test]
    fn test_parse_line_rejects_misaligned_fields() {
        let err = Window::parse_line("1;2,0;0,1;2,5").unwrap_err();
        assert!(err.contains("misaligned"));
        assert!(Window::parse_line("1,2,3").is_err());
        assert!(Window::parse_line("a,0,1,2").is_err());
    }

    #[test]
    fn test_parse_value_accepts_float_rendering() {
        assert_eq!(parse_value("7"), Some(7));
        assert_eq!(parse_value("7.0"), Some(7));
        assert_eq!(parse_value("7.5"), None);
        assert_eq!(parse_value("x"), None);
    }

    #[test]
    fn test_span() {
        let w = Window::from_records(vec![rec(10), rec(11), rec(15)]).unwrap();
        assert!((w.span() - 0.005).abs() < 1e-12);
        assert!(Window::from_records(Vec::new()).is_none());
    }
}
