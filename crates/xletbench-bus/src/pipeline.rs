//! Outlet and inlet pipelines.
//!
//! Outlet: generate task → channel → publish (Bus send, then producer log).
//! Inlet: receive task (Bus pull or poll) → channel → accumulate (window
//! accumulator, then consumer log).
//!
//! Each channel has a single consumer that handles one message completely
//! before taking the next, so deliveries are windowed and written strictly in
//! arrival order. The only way a pipeline ends normally is end-of-stream
//! reaching the log writer, which then closes the log.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use xletbench_core::{
    Clock, ConsumerLogWriter, Delivery, DeliveryRecord, Error, Inlet, Outlet, Output,
    ProducerLogWriter, Result, Sample, SampleGenerator, StreamItem, WindowAccumulator,
};

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// How the outlet hands samples to the Bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendMode {
    /// One send per sample (`tcpsample`).
    Sample,
    /// One send per generator burst (`tcpchunk`).
    Chunk,
}

impl SendMode {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sample => "tcpsample",
            Self::Chunk => "tcpchunk",
        }
    }
}

impl fmt::Display for SendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

impl FromStr for SendMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tcpsample" => Ok(Self::Sample),
            "tcpchunk" => Ok(Self::Chunk),
            other => Err(Error::config(format!(
                "unknown outlet kind '{other}' (expected tcpsample or tcpchunk)"
            ))),
        }
    }
}

/// How the inlet takes items off the Bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveMode {
    /// Await each item (`tcppull`).
    Pull,
    /// Non-blocking receive, yielding to the scheduler when empty (`tcppoll`).
    Poll,
}

impl ReceiveMode {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pull => "tcppull",
            Self::Poll => "tcppoll",
        }
    }
}

impl fmt::Display for ReceiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

impl FromStr for ReceiveMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tcppull" => Ok(Self::Pull),
            "tcppoll" => Ok(Self::Poll),
            other => Err(Error::config(format!(
                "unknown inlet kind '{other}' (expected tcppull or tcppoll)"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Producer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ProducerStats {
    pub samples_sent: u64,
    pub sends: u64,
    pub log_path: PathBuf,
}

/// Generate, publish and log the whole stream, ending with end-of-stream.
pub async fn run_producer<O: Outlet>(
    outlet: &mut O,
    generator: SampleGenerator,
    clock: Arc<dyn Clock>,
    mut producer_log: ProducerLogWriter,
    mode: SendMode,
    capacity: usize,
) -> Result<ProducerStats> {
    let (tx, mut rx) = mpsc::channel::<Vec<StreamItem>>(capacity.max(1));
    let generator_task = tokio::spawn(generate(generator, clock, tx));
    let mut sends = 0u64;

    while let Some(burst) = rx.recv().await {
        let mut samples: Vec<Sample> = Vec::with_capacity(burst.len());
        let mut end = None;
        for item in burst {
            match item {
                StreamItem::Data(s) => samples.push(s),
                StreamItem::EndOfStream { .. } => end = Some(item),
            }
        }

        match mode {
            SendMode::Sample => {
                for s in &samples {
                    outlet.send(StreamItem::Data(*s)).await?;
                    producer_log.write_sample(s)?;
                    sends += 1;
                }
            }
            SendMode::Chunk if !samples.is_empty() => {
                outlet.send_chunk(&samples).await?;
                producer_log.write_chunk(&samples)?;
                sends += 1;
            }
            SendMode::Chunk => {}
        }

        if let Some(end) = end {
            outlet.send(end).await?;
            let samples_sent = producer_log.samples_written();
            let log_path = producer_log.finish()?;
            let _ = generator_task.await;
            log::info!("outlet done: {samples_sent} samples in {sends} sends");
            return Ok(ProducerStats {
                samples_sent,
                sends,
                log_path,
            });
        }
    }

    Err(Error::transport("generator stopped before end-of-stream"))
}

async fn generate(mut generator: SampleGenerator, clock: Arc<dyn Clock>, tx: mpsc::Sender<Vec<StreamItem>>) {
    let tick = generator.tick_interval();
    loop {
        let burst = generator.poll(clock.as_ref());
        if !burst.is_empty() && tx.send(burst).await.is_err() {
            return;
        }
        if generator.is_finished() {
            return;
        }
        tokio::time::sleep(tick).await;
    }
}

// ---------------------------------------------------------------------------
// Consumer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerStats {
    pub records: u64,
    pub windows: u64,
    pub records_dropped: u64,
    pub log_path: PathBuf,
}

/// Receive until end-of-stream, windowing and logging every delivery.
pub async fn run_consumer<I: Inlet + 'static>(
    inlet: I,
    clock: Arc<dyn Clock>,
    accumulator: WindowAccumulator,
    consumer_log: ConsumerLogWriter,
    mode: ReceiveMode,
    capacity: usize,
    idle_timeout: Option<Duration>,
) -> Result<ConsumerStats> {
    let (tx, rx) = mpsc::channel::<Delivery>(capacity.max(1));
    let receiver: JoinHandle<Result<()>> = tokio::spawn(receive(inlet, clock, tx, mode, idle_timeout));

    match accumulate(rx, accumulator, consumer_log).await {
        Ok(Some(stats)) => {
            log::info!(
                "inlet done: {} records in {} windows ({} dropped)",
                stats.records,
                stats.windows,
                stats.records_dropped
            );
            Ok(stats)
        }
        // The receiver gave up before end-of-stream; surface its error.
        Ok(None) => match receiver.await {
            Ok(Err(e)) => Err(e),
            Ok(Ok(())) => Err(Error::transport("receiver stopped before end-of-stream")),
            Err(e) => Err(Error::transport(format!("receiver task failed: {e}"))),
        },
        Err(e) => {
            receiver.abort();
            Err(e)
        }
    }
}

/// `Ok(None)` when the channel closed without end-of-stream.
async fn accumulate(
    mut rx: mpsc::Receiver<Delivery>,
    mut accumulator: WindowAccumulator,
    mut consumer_log: ConsumerLogWriter,
) -> Result<Option<ConsumerStats>> {
    while let Some(delivery) = rx.recv().await {
        for output in accumulator.accept(delivery)? {
            match output {
                Output::Window(window) => consumer_log.write_window(&window)?,
                Output::EndOfStream => {
                    return Ok(Some(ConsumerStats {
                        records: consumer_log.records_written(),
                        windows: consumer_log.windows_written(),
                        records_dropped: accumulator.records_dropped(),
                        log_path: consumer_log.finish()?,
                    }));
                }
            }
        }
    }
    Ok(None)
}

async fn receive<I: Inlet>(
    mut inlet: I,
    clock: Arc<dyn Clock>,
    tx: mpsc::Sender<Delivery>,
    mode: ReceiveMode,
    idle_timeout: Option<Duration>,
) -> Result<()> {
    loop {
        let item = next_item(&mut inlet, mode, idle_timeout).await?;
        let t_arrived = clock.now();
        let delivery = match item {
            StreamItem::Data(sample) => Delivery::Record(DeliveryRecord::new(
                sample,
                inlet.clock_offset_estimate(),
                t_arrived,
            )),
            StreamItem::EndOfStream { .. } => Delivery::EndOfStream,
        };
        let end = matches!(delivery, Delivery::EndOfStream);
        if tx.send(delivery).await.is_err() || end {
            return Ok(());
        }
    }
}

async fn next_item<I: Inlet>(inlet: &mut I, mode: ReceiveMode, idle_timeout: Option<Duration>) -> Result<StreamItem> {
    let idle = |d: Duration| Error::transport(format!("no data received for {d:?}"));
    match mode {
        ReceiveMode::Pull => match idle_timeout {
            Some(d) => tokio::time::timeout(d, inlet.pull()).await.map_err(|_| idle(d))?,
            None => inlet.pull().await,
        },
        ReceiveMode::Poll => {
            let started = tokio::time::Instant::now();
            loop {
                if let Some(item) = inlet.try_receive()? {
                    return Ok(item);
                }
                if let Some(d) = idle_timeout {
                    if started.elapsed() >= d {
                        return Err(idle(d));
                    }
                }
                tokio::task::yield_now().await;
            }
        }
    }
}
