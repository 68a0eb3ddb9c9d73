//! TCP bus adapter.
//!
//! The outlet listens; every inlet connects, runs a few ping/pong rounds to
//! estimate the clock offset, then sends `subscribe` and only receives from
//! then on. Samples published while nobody is subscribed are dropped, so an
//! inlet that attaches late sees a suffix of the stream.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout, timeout_at};
use xletbench_core::{Clock, Error, Inlet, Outlet, Result, Sample, StreamItem};

use crate::frame::{FRAME_LEN, Frame, FrameError, read_frame, write_frame};

// ---------------------------------------------------------------------------
// Outlet
// ---------------------------------------------------------------------------

pub struct TcpOutlet {
    local_addr: SocketAddr,
    incoming: mpsc::Receiver<TcpStream>,
    subscribers: Vec<BufWriter<TcpStream>>,
    acceptor: JoinHandle<()>,
}

impl TcpOutlet {
    /// Bind the listener and start accepting subscribers in the background.
    pub async fn bind(addr: SocketAddr, clock: Arc<dyn Clock>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::transport(format!("cannot listen on {addr}: {e}")))?;
        let local_addr = listener.local_addr()?;
        let (tx, incoming) = mpsc::channel(16);
        let acceptor = tokio::spawn(accept_loop(listener, clock, tx));
        log::info!("outlet listening on {local_addr}");

        Ok(Self {
            local_addr,
            incoming,
            subscribers: Vec::new(),
            acceptor,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait until at least one inlet has subscribed. Returns false on timeout.
    pub async fn wait_for_subscriber(&mut self, limit: Duration) -> bool {
        self.adopt_new_subscribers();
        if !self.subscribers.is_empty() {
            return true;
        }
        match timeout(limit, self.incoming.recv()).await {
            Ok(Some(stream)) => {
                self.subscribers.push(BufWriter::new(stream));
                true
            }
            _ => false,
        }
    }

    fn adopt_new_subscribers(&mut self) {
        while let Ok(stream) = self.incoming.try_recv() {
            self.subscribers.push(BufWriter::new(stream));
            log::debug!("{} subscribers attached", self.subscribers.len());
        }
    }

    /// Write `frames` to every subscriber and flush; subscribers that fail
    /// are detached.
    async fn publish(&mut self, frames: &[Frame]) {
        self.adopt_new_subscribers();
        let mut kept = Vec::with_capacity(self.subscribers.len());
        for mut sub in std::mem::take(&mut self.subscribers) {
            match write_all_frames(&mut sub, frames).await {
                Ok(()) => kept.push(sub),
                Err(e) => log::warn!("detaching subscriber: {e}"),
            }
        }
        self.subscribers = kept;
    }
}

async fn write_all_frames(sub: &mut BufWriter<TcpStream>, frames: &[Frame]) -> std::result::Result<(), FrameError> {
    for frame in frames {
        write_frame(sub, frame).await?;
    }
    sub.flush().await?;
    Ok(())
}

impl Drop for TcpOutlet {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

impl Outlet for TcpOutlet {
    async fn send(&mut self, item: StreamItem) -> Result<()> {
        self.publish(&[Frame::from(item)]).await;
        Ok(())
    }

    async fn send_chunk(&mut self, samples: &[Sample]) -> Result<()> {
        let frames: Vec<Frame> = samples.iter().map(|&s| Frame::from(StreamItem::Data(s))).collect();
        self.publish(&frames).await;
        Ok(())
    }

    fn subscribers(&self) -> usize {
        self.subscribers.len()
    }
}

async fn accept_loop(listener: TcpListener, clock: Arc<dyn Clock>, tx: mpsc::Sender<TcpStream>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                log::warn!("accept failed: {e}");
                continue;
            }
        };
        let clock = Arc::clone(&clock);
        let tx = tx.clone();
        tokio::spawn(async move {
            match handshake(stream, clock.as_ref()).await {
                Ok(stream) => {
                    log::info!("inlet {peer} subscribed");
                    let _ = tx.send(stream).await;
                }
                Err(e) => log::warn!("handshake with {peer} failed: {e}"),
            }
        });
    }
}

/// Answer pings until the peer subscribes.
async fn handshake(mut stream: TcpStream, clock: &dyn Clock) -> std::result::Result<TcpStream, FrameError> {
    stream.set_nodelay(true)?;
    loop {
        match read_frame(&mut stream).await? {
            Frame::Ping { t_sent } => {
                let pong = Frame::Pong {
                    t_ping: t_sent,
                    t_remote: clock.now(),
                };
                write_frame(&mut stream, &pong).await?;
                stream.flush().await?;
            }
            Frame::Subscribe => return Ok(stream),
            other => log::debug!("ignoring {other:?} during handshake"),
        }
    }
}

// ---------------------------------------------------------------------------
// Inlet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Total budget for connecting and completing the handshake.
    pub ready_timeout: Duration,
    pub retry_interval: Duration,
    pub ping_rounds: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(30),
            retry_interval: Duration::from_millis(50),
            ping_rounds: 8,
        }
    }
}

pub struct TcpInlet {
    stream: TcpStream,
    buf: Vec<u8>,
    pos: usize,
    offset: f64,
    rtt: f64,
}

impl TcpInlet {
    /// Connect to an outlet, retrying until `ready_timeout`, and subscribe.
    pub async fn connect(addr: SocketAddr, clock: &dyn Clock, opts: &ConnectOptions) -> Result<Self> {
        let deadline = Instant::now() + opts.ready_timeout;
        let not_ready = || {
            Error::transport(format!(
                "outlet at {addr} not ready within {:?}",
                opts.ready_timeout
            ))
        };

        let stream = loop {
            match timeout_at(deadline, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => break stream,
                Ok(Err(e)) => {
                    log::debug!("connect to {addr} failed: {e}; retrying");
                    if Instant::now() + opts.retry_interval >= deadline {
                        return Err(not_ready());
                    }
                    tokio::time::sleep(opts.retry_interval).await;
                }
                Err(_) => return Err(not_ready()),
            }
        };
        stream.set_nodelay(true)?;

        let mut inlet = Self {
            stream,
            buf: Vec::with_capacity(64 * FRAME_LEN),
            pos: 0,
            offset: 0.0,
            rtt: f64::INFINITY,
        };
        timeout_at(deadline, inlet.sync_clock(clock, opts.ping_rounds.max(1)))
            .await
            .map_err(|_| not_ready())??;

        write_frame(&mut inlet.stream, &Frame::Subscribe).await?;
        inlet.stream.flush().await?;
        log::info!(
            "subscribed to {addr}: clock offset {:.6} s (rtt {:.6} s)",
            inlet.offset,
            inlet.rtt
        );
        Ok(inlet)
    }

    /// Keep the offset of the round with the smallest round-trip time.
    async fn sync_clock(&mut self, clock: &dyn Clock, rounds: usize) -> Result<()> {
        for _ in 0..rounds {
            let t0 = clock.now();
            write_frame(&mut self.stream, &Frame::Ping { t_sent: t0 }).await?;
            self.stream.flush().await?;
            match self.next_frame().await? {
                Frame::Pong { t_ping, t_remote } if t_ping.to_bits() == t0.to_bits() => {
                    let t3 = clock.now();
                    let rtt = t3 - t0;
                    if rtt < self.rtt {
                        self.rtt = rtt;
                        self.offset = (t0 + t3) / 2.0 - t_remote;
                    }
                }
                other => {
                    return Err(Error::transport(format!(
                        "expected pong during handshake, got {other:?}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Smallest observed handshake round trip, in seconds.
    pub fn round_trip(&self) -> f64 {
        self.rtt
    }

    fn take_buffered(&mut self) -> Result<Option<Frame>> {
        if self.buf.len() - self.pos < FRAME_LEN {
            return Ok(None);
        }
        let mut raw = [0u8; FRAME_LEN];
        raw.copy_from_slice(&self.buf[self.pos..self.pos + FRAME_LEN]);
        self.pos += FRAME_LEN;
        if self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        }
        Ok(Some(Frame::decode(&raw)?))
    }

    fn compact(&mut self) {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
    }

    async fn next_frame(&mut self) -> Result<Frame> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(frame) = self.take_buffered()? {
                return Ok(frame);
            }
            self.compact();
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(FrameError::Closed.into());
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn expect_item(frame: Frame) -> Result<StreamItem> {
        frame
            .into_item()
            .ok_or_else(|| Error::transport(format!("unexpected {frame:?} on a subscribed stream")))
    }
}

impl Inlet for TcpInlet {
    async fn pull(&mut self) -> Result<StreamItem> {
        let frame = self.next_frame().await?;
        Self::expect_item(frame)
    }

    fn try_receive(&mut self) -> Result<Option<StreamItem>> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(frame) = self.take_buffered()? {
                return Self::expect_item(frame).map(Some);
            }
            self.compact();
            match self.stream.try_read(&mut chunk) {
                Ok(0) => return Err(FrameError::Closed.into()),
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn clock_offset_estimate(&self) -> f64 {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xletbench_core::{LocalClock, ManualClock};

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_subscribe_and_receive() {
        let clock: Arc<dyn Clock> = Arc::new(LocalClock);
        let mut outlet = TcpOutlet::bind(loopback(), Arc::clone(&clock)).await.unwrap();
        let addr = outlet.local_addr();

        let connect = tokio::spawn(async move {
            TcpInlet::connect(addr, &LocalClock, &ConnectOptions::default()).await
        });
        assert!(outlet.wait_for_subscriber(Duration::from_secs(5)).await);
        let mut inlet = connect.await.unwrap().unwrap();
        assert_eq!(outlet.subscribers(), 1);

        // Same clock on both ends: the offset is within one round trip of zero.
        assert!(inlet.clock_offset_estimate().abs() <= inlet.round_trip() + 1e-3);

        outlet.send(StreamItem::Data(Sample::new(0, 1.0))).await.unwrap();
        outlet
            .send_chunk(&[Sample::new(1, 1.1), Sample::new(2, 1.2)])
            .await
            .unwrap();
        outlet.send(StreamItem::EndOfStream { t_generated: 1.3 }).await.unwrap();

        let mut values = Vec::new();
        loop {
            match inlet.pull().await.unwrap() {
                StreamItem::Data(s) => values.push(s.value),
                StreamItem::EndOfStream { t_generated } => {
                    assert_eq!(t_generated, 1.3);
                    break;
                }
            }
        }
        assert_eq!(values, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_offset_reflects_clock_skew() {
        // Outlet clock runs 100 s behind the inlet's.
        let outlet_clock: Arc<dyn Clock> = Arc::new(ManualClock::new(0.0));
        let inlet_clock = ManualClock::new(100.0);
        let mut outlet = TcpOutlet::bind(loopback(), outlet_clock).await.unwrap();
        let addr = outlet.local_addr();

        let connect = tokio::spawn(async move {
            TcpInlet::connect(addr, &inlet_clock, &ConnectOptions::default()).await
        });
        assert!(outlet.wait_for_subscriber(Duration::from_secs(5)).await);
        let inlet = connect.await.unwrap().unwrap();
        assert_eq!(inlet.clock_offset_estimate(), 100.0);
        assert_eq!(inlet.round_trip(), 0.0);
    }

    #[tokio::test]
    async fn test_try_receive_is_non_blocking() {
        let mut outlet = TcpOutlet::bind(loopback(), Arc::new(LocalClock)).await.unwrap();
        let addr = outlet.local_addr();
        let connect = tokio::spawn(async move {
            TcpInlet::connect(addr, &LocalClock, &ConnectOptions::default()).await
        });
        assert!(outlet.wait_for_subscriber(Duration::from_secs(5)).await);
        let mut inlet = connect.await.unwrap().unwrap();

        assert_eq!(inlet.try_receive().unwrap(), None);
        outlet.send(StreamItem::Data(Sample::new(7, 0.0))).await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let item = loop {
            if let Some(item) = inlet.try_receive().unwrap() {
                break item;
            }
            assert!(Instant::now() < deadline, "sample never arrived");
            tokio::time::sleep(Duration::from_millis(1)).await;
        };
        assert_eq!(item, StreamItem::Data(Sample::new(7, 0.0)));
    }

    #[tokio::test]
    async fn test_samples_without_subscriber_are_dropped() {
        let mut outlet = TcpOutlet::bind(loopback(), Arc::new(LocalClock)).await.unwrap();
        outlet.send(StreamItem::Data(Sample::new(0, 0.0))).await.unwrap();
        assert_eq!(outlet.subscribers(), 0);
        assert!(!outlet.wait_for_subscriber(Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_connect_times_out_without_outlet() {
        // Grab a free port, then release it so nothing is listening there.
        let addr = {
            let listener = TcpListener::bind(loopback()).await.unwrap();
            listener.local_addr().unwrap()
        };
        let opts = ConnectOptions {
            ready_timeout: Duration::from_millis(200),
            retry_interval: Duration::from_millis(20),
            ping_rounds: 1,
        };
        let err = TcpInlet::connect(addr, &LocalClock, &opts).await.err().unwrap();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_outlet_disconnect_is_transport_error() {
        let mut outlet = TcpOutlet::bind(loopback(), Arc::new(LocalClock)).await.unwrap();
        let addr = outlet.local_addr();
        let connect = tokio::spawn(async move {
            TcpInlet::connect(addr, &LocalClock, &ConnectOptions::default()).await
        });
        assert!(outlet.wait_for_subscriber(Duration::from_secs(5)).await);
        let mut inlet = connect.await.unwrap().unwrap();

        drop(outlet);
        assert!(matches!(inlet.pull().await, Err(Error::Transport(_))));
    }
}
