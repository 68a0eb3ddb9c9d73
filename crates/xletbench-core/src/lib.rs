//! # xletbench-core
//!
//! Building blocks for benchmarking a numbered-sample stream carried between
//! an outlet (producer) process and an inlet (consumer) process.
//!
//! ## Quick Start
//!
//! ```
//! use xletbench_core::{DeliveryRecord, Sample, TailPolicy, WindowAccumulator};
//!
//! let mut acc = WindowAccumulator::new(2, TailPolicy::Flush).unwrap();
//! let rec = |v: i64| DeliveryRecord::new(Sample::new(v, v as f64), 0.0, v as f64 + 0.001);
//!
//! assert!(acc.push(rec(2)).unwrap().is_none());
//! let window = acc.push(rec(3)).unwrap().unwrap();
//! assert_eq!(window.values().collect::<Vec<_>>(), vec![2, 3]);
//! ```
//!
//! ## Architecture
//!
//! Generator → Bus → Window Accumulator → consumer log, and
//! Generator → Bus → producer log. Offline, the two logs are paired by the
//! metadata encoded in their names and handed to `xletbench-analysis`.
//!
//! Transports implement the [`Outlet`] and [`Inlet`] traits in [`bus`].

pub mod bus;
pub mod clock;
pub mod error;
pub mod generator;
pub mod logfile;
pub mod machine;
pub mod meta;
pub mod plan;
pub mod sample;
pub mod window;

pub use bus::{Inlet, Outlet};
pub use clock::{Clock, LocalClock, ManualClock, local_clock};
pub use error::{AlignmentError, Error, Result};
pub use generator::{Paced, SampleGenerator};
pub use logfile::{
    CONSUMER_HEADER, ConsumerLogWriter, PRODUCER_HEADER, ProducerLogWriter, read_consumer_log,
    read_producer_log,
};
pub use machine::{MachineInfo, detect_machine_info};
pub use meta::{Datatype, LogFileName, Role, RunMetadata, RunPair, group_runs, pair_run};
pub use plan::{RunConfig, SweepPlan};
pub use sample::{DeliveryRecord, SENTINEL, Sample, StreamItem};
pub use window::{Delivery, Output, TailPolicy, Window, WindowAccumulator};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
