//! Bus capability: the seam between the benchmark logic and a transport.
//!
//! The generator, accumulator and log writers only ever talk to these two
//! traits. Concrete adapters (TCP, in-memory) live in `xletbench-bus`.
//! Methods return `Send` futures so pipelines can spawn them on any runtime.

use std::future::Future;

use crate::error::Result;
use crate::sample::{Sample, StreamItem};

/// Publishing side of the Bus.
pub trait Outlet: Send {
    /// Publish one item. End-of-stream is published like any other item.
    fn send(&mut self, item: StreamItem) -> impl Future<Output = Result<()>> + Send;

    /// Publish a burst of samples. Adapters without a chunk primitive fall
    /// back to one `send` per sample.
    fn send_chunk(&mut self, samples: &[Sample]) -> impl Future<Output = Result<()>> + Send {
        async move {
            for sample in samples {
                self.send(StreamItem::Data(*sample)).await?;
            }
            Ok(())
        }
    }

    /// Number of currently attached consumers.
    fn subscribers(&self) -> usize;
}

/// Receiving side of the Bus.
pub trait Inlet: Send {
    /// Wait for the next item. Ordered; blocks until an item or an error.
    fn pull(&mut self) -> impl Future<Output = Result<StreamItem>> + Send;

    /// Non-blocking receive; `Ok(None)` when nothing is ready yet.
    fn try_receive(&mut self) -> Result<Option<StreamItem>>;

    /// Offset to add to an outlet timestamp to express it on the local clock.
    fn clock_offset_estimate(&self) -> f64;
}
