//! Latency analyzer.
//!
//! Latency is `t_arrived - t_generated` per delivery record, windows flattened
//! first. Both timestamps come from `local_clock()` on their own host; on one
//! machine the clocks coincide, across machines use the corrected latency,
//! which first shifts the outlet timestamp by the inlet's clock-offset
//! estimate.

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, OrderStatistics, Statistics};
use xletbench_core::{DeliveryRecord, Window};

fn records(windows: &[Window]) -> impl Iterator<Item = &DeliveryRecord> {
    windows.iter().flat_map(|w| w.records())
}

/// Mean raw latency in seconds. NaN when there are no records.
pub fn mean_latency(windows: &[Window]) -> f64 {
    records(windows).map(DeliveryRecord::latency).mean()
}

/// Mean latency after applying each record's clock-offset estimate.
pub fn mean_corrected_latency(windows: &[Window]) -> f64 {
    records(windows).map(DeliveryRecord::corrected_latency).mean()
}

/// Mean generation-time span of a window.
///
/// `None` for `window_size <= 1`, where a window has no internal span, and
/// when there are no windows at all.
pub fn mean_window_duration(windows: &[Window], window_size: usize) -> Option<f64> {
    if window_size <= 1 || windows.is_empty() {
        return None;
    }
    Some(windows.iter().map(Window::span).mean())
}

/// Distribution of raw latencies over a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; `None` for fewer than two records.
    pub std_dev: Option<f64>,
    pub min: f64,
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
}

/// `None` when there are no records.
pub fn latency_summary(windows: &[Window]) -> Option<LatencySummary> {
    let latencies: Vec<f64> = records(windows).map(DeliveryRecord::latency).collect();
    if latencies.is_empty() {
        return None;
    }

    let count = latencies.len();
    let mean = latencies.iter().mean();
    let std_dev = (count > 1).then(|| latencies.iter().std_dev());
    let min = latencies.iter().copied().fold(f64::INFINITY, f64::min);
    let max = latencies.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut data = Data::new(latencies);
    let median = data.median();
    let p95 = data.percentile(95);
    let p99 = data.percentile(99);

    Some(LatencySummary {
        count,
        mean,
        std_dev,
        min,
        median,
        p95,
        p99,
        max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use xletbench_core::Sample;

    fn windows(records: Vec<DeliveryRecord>, w: usize) -> Vec<Window> {
        records
            .chunks(w)
            .map(|c| Window::from_records(c.to_vec()).unwrap())
            .collect()
    }

    fn constant(n: usize, c: f64) -> Vec<DeliveryRecord> {
        (0..n)
            .map(|k| DeliveryRecord::new(Sample::new(k as i64, k as f64), 0.0, k as f64 + c))
            .collect()
    }

    #[test]
    fn test_constant_latency_mean_is_exact() {
        for w in [1, 3, 7] {
            assert_eq!(mean_latency(&windows(constant(50, 0.5), w)), 0.5);
        }
    }

    #[test]
    fn test_mean_latency_of_nothing_is_nan() {
        assert!(mean_latency(&[]).is_nan());
        assert!(latency_summary(&[]).is_none());
    }

    #[test]
    fn test_fixed_span_window_duration() {
        // Generation times 0.25 s apart, windows of 4: each spans 0.75 s.
        let records: Vec<DeliveryRecord> = (0..12)
            .map(|k| {
                let t = k as f64 * 0.25;
                DeliveryRecord::new(Sample::new(k, t), 0.0, t + 0.01)
            })
            .collect();
        let d = mean_window_duration(&windows(records, 4), 4).unwrap();
        assert!((d - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_window_duration_absent_for_single_record_windows() {
        let w = windows(constant(5, 0.5), 1);
        assert_eq!(mean_window_duration(&w, 1), None);
        assert_eq!(mean_window_duration(&[], 10), None);
    }

    #[test]
    fn test_corrected_latency_applies_offset() {
        let records: Vec<DeliveryRecord> = (0..4)
            .map(|k| DeliveryRecord::new(Sample::new(k, k as f64), 100.0, k as f64 + 100.5))
            .collect();
        let w = windows(records, 2);
        assert_eq!(mean_latency(&w), 100.5);
        assert_eq!(mean_corrected_latency(&w), 0.5);
    }

    #[test]
    fn test_summary_statistics() {
        let records: Vec<DeliveryRecord> = (1..=100)
            .map(|k| DeliveryRecord::new(Sample::new(k, 0.0), 0.0, k as f64))
            .collect();
        let s = latency_summary(&windows(records, 10)).unwrap();
        assert_eq!(s.count, 100);
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 100.0);
        assert!((s.mean - 50.5).abs() < 1e-9);
        assert!((s.median - 50.5).abs() < 1e-9);
        assert!(s.p95 > 90.0 && s.p95 <= 100.0);
        assert!(s.p99 >= s.p95);
        assert!(s.std_dev.unwrap() > 0.0);
    }

    #[test]
    fn test_summary_of_one_record_has_no_std_dev() {
        let s = latency_summary(&windows(constant(1, 0.5), 1)).unwrap();
        assert_eq!(s.count, 1);
        assert_eq!(s.std_dev, None);
        assert_eq!(s.median, 0.5);
    }
}
