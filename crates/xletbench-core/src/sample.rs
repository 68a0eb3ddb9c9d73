//! Stream data model: samples, the end-of-stream marker, and per-sample
//! delivery records as observed by the inlet.

use serde::{Deserialize, Serialize};

/// Wire/log encoding of end-of-stream. Never a legal data value.
pub const SENTINEL: i64 = -1;

/// One numbered sample as produced by the outlet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub value: i64,
    /// Outlet `local_clock()` reading at generation time, in seconds.
    pub t_generated: f64,
}

impl Sample {
    pub fn new(value: i64, t_generated: f64) -> Self {
        Self { value, t_generated }
    }
}

/// Item travelling from the generator through the Bus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StreamItem {
    Data(Sample),
    EndOfStream { t_generated: f64 },
}

impl StreamItem {
    /// Decode a `(value, timestamp)` pair as carried by the Bus.
    pub fn from_wire(value: i64, t_generated: f64) -> Self {
        if value == SENTINEL {
            Self::EndOfStream { t_generated }
        } else {
            Self::Data(Sample::new(value, t_generated))
        }
    }

    /// Encode into the `(value, timestamp)` pair carried by the Bus.
    pub fn to_wire(self) -> (i64, f64) {
        match self {
            Self::Data(s) => (s.value, s.t_generated),
            Self::EndOfStream { t_generated } => (SENTINEL, t_generated),
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Self::EndOfStream { .. })
    }
}

/// One sample as observed by the inlet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub t_generated: f64,
    /// Estimated outlet→inlet clock offset at arrival time.
    pub t_clock_offset: f64,
    /// Inlet `local_clock()` reading at receipt.
    pub t_arrived: f64,
    pub value: i64,
}

impl DeliveryRecord {
    pub fn new(sample: Sample, t_clock_offset: f64, t_arrived: f64) -> Self {
        Self {
            t_generated: sample.t_generated,
            t_clock_offset,
            t_arrived,
            value: sample.value,
        }
    }

    /// Raw transport latency, `t_arrived - t_generated`.
    pub fn latency(&self) -> f64 {
        self.t_arrived - self.t_generated
    }

    /// Latency after mapping the outlet timestamp onto the inlet clock.
    pub fn corrected_latency(&self) -> f64 {
        self.t_arrived - (self.t_generated + self.t_clock_offset)
    }
}
