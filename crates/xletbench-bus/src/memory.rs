//! In-process bus over a bounded tokio channel.
//!
//! Used by tests and by single-binary runs. Exactly one inlet per outlet, no
//! clock skew (offset fixed at construction, 0 by default).

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use xletbench_core::{Error, Inlet, Outlet, Result, StreamItem};

pub struct MemoryOutlet {
    tx: mpsc::Sender<StreamItem>,
}

pub struct MemoryInlet {
    rx: mpsc::Receiver<StreamItem>,
    offset: f64,
}

/// Connected outlet/inlet pair holding up to `capacity` items in flight.
pub fn memory_bus(capacity: usize) -> (MemoryOutlet, MemoryInlet) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (MemoryOutlet { tx }, MemoryInlet { rx, offset: 0.0 })
}

impl MemoryInlet {
    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }
}

impl Outlet for MemoryOutlet {
    async fn send(&mut self, item: StreamItem) -> Result<()> {
        self.tx
            .send(item)
            .await
            .map_err(|_| Error::transport("memory inlet dropped"))
    }

    fn subscribers(&self) -> usize {
        if self.tx.is_closed() { 0 } else { 1 }
    }
}

impl Inlet for MemoryInlet {
    async fn pull(&mut self) -> Result<StreamItem> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| Error::transport("memory outlet dropped before end-of-stream"))
    }

    fn try_receive(&mut self) -> Result<Option<StreamItem>> {
        match self.rx.try_recv() {
            Ok(item) => Ok(Some(item)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(Error::transport(
                "memory outlet dropped before end-of-stream",
            )),
        }
    }

    fn clock_offset_estimate(&self) -> f64 {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xletbench_core::Sample;

    #[tokio::test]
    async fn test_items_arrive_in_order() {
        let (mut outlet, mut inlet) = memory_bus(4);
        outlet.send(StreamItem::Data(Sample::new(0, 1.0))).await.unwrap();
        outlet
            .send_chunk(&[Sample::new(1, 1.1), Sample::new(2, 1.2)])
            .await
            .unwrap();

        for v in 0..3 {
            match inlet.pull().await.unwrap() {
                StreamItem::Data(s) => assert_eq!(s.value, v),
                other => panic!("unexpected {other:?}"),
            }
        }
        assert_eq!(inlet.try_receive().unwrap(), None);
    }

    #[tokio::test]
    async fn test_disconnect_is_transport_error() {
        let (outlet, mut inlet) = memory_bus(1);
        drop(outlet);
        assert!(matches!(inlet.pull().await, Err(Error::Transport(_))));
        assert!(matches!(inlet.try_receive(), Err(Error::Transport(_))));

        let (mut outlet, inlet) = memory_bus(1);
        assert_eq!(outlet.subscribers(), 1);
        drop(inlet);
        assert_eq!(outlet.subscribers(), 0);
        assert!(outlet.send(StreamItem::EndOfStream { t_generated: 0.0 }).await.is_err());
    }

    #[test]
    fn test_offset() {
        let (_, inlet) = memory_bus(1);
        assert_eq!(inlet.clock_offset_estimate(), 0.0);
        assert_eq!(inlet.with_offset(0.25).clock_offset_estimate(), 0.25);
    }
}
