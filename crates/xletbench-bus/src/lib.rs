//! # xletbench-bus
//!
//! Concrete transports behind the `Outlet`/`Inlet` traits of
//! `xletbench-core`, and the async pipelines that connect a generator or an
//! accumulator to them.
//!
//! - [`tcp`]: one listening outlet, any number of subscribing inlets, with a
//!   ping/pong clock-offset estimate at subscribe time.
//! - [`memory`]: a bounded channel pair for tests and in-process runs.
//! - [`pipeline`]: `run_producer` / `run_consumer`.

pub mod frame;
pub mod memory;
pub mod pipeline;
pub mod tcp;

pub use frame::{FRAME_LEN, Frame, FrameError};
pub use memory::{MemoryInlet, MemoryOutlet, memory_bus};
pub use pipeline::{
    ConsumerStats, ProducerStats, ReceiveMode, SendMode, run_consumer, run_producer,
};
pub use tcp::{ConnectOptions, TcpInlet, TcpOutlet};

/// Runtime for one xlet process: multi-threaded when `multiproc` is set,
/// otherwise everything runs on the calling thread.
pub fn build_runtime(multiproc: bool) -> std::io::Result<tokio::runtime::Runtime> {
    let mut builder = if multiproc {
        tokio::runtime::Builder::new_multi_thread()
    } else {
        tokio::runtime::Builder::new_current_thread()
    };
    builder.enable_all().build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_runtime_both_flavors() {
        for multiproc in [true, false] {
            let rt = build_runtime(multiproc).unwrap();
            assert_eq!(rt.block_on(async { 1 + 1 }), 2);
        }
    }
}
