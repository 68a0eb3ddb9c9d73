//! Rate-paced counter source.
//!
//! At every scheduling tick the generator works out how many samples are due
//! since it started (`floor(fs * elapsed) - already_sent`) and emits all of
//! them at once, then the caller sleeps for `1/fs`. Output is bursty but the
//! average rate is exact and timer overhead stays at one sleep per tick.
//!
//! Values run `0..total_count`; a single end-of-stream item follows the last
//! one and the generator then refuses to produce anything else.

use std::collections::VecDeque;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::sample::{Sample, StreamItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GeneratorState {
    Idle,
    Running,
    Finished,
}

/// Paced generator of the sequence `0, 1, ..., total_count - 1, <end>`.
#[derive(Debug, Clone)]
pub struct SampleGenerator {
    fs: u32,
    total_count: u64,
    sent: u64,
    started_at: f64,
    state: GeneratorState,
}

impl SampleGenerator {
    pub fn new(fs: u32, total_count: u64) -> Result<Self> {
        if fs == 0 {
            return Err(Error::config("sample rate must be at least 1 Hz"));
        }
        if total_count > i64::MAX as u64 {
            return Err(Error::config(format!(
                "total count {total_count} does not fit the sample value range"
            )));
        }
        Ok(Self {
            fs,
            total_count,
            sent: 0,
            started_at: 0.0,
            state: GeneratorState::Idle,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.fs
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Samples emitted so far (excluding the end-of-stream item).
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Sleep between scheduling ticks.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fs))
    }

    pub fn is_finished(&self) -> bool {
        self.state == GeneratorState::Finished
    }

    /// Run one scheduling tick and return everything that is due.
    ///
    /// The first call starts the stream clock. Each sample is stamped with
    /// its own clock reading. Once the last value has been produced the
    /// returned burst ends with [`StreamItem::EndOfStream`].
    pub fn poll<C: Clock + ?Sized>(&mut self, clock: &C) -> Vec<StreamItem> {
        let now = clock.now();
        match self.state {
            GeneratorState::Finished => return Vec::new(),
            GeneratorState::Idle => {
                self.started_at = now;
                self.state = GeneratorState::Running;
            }
            GeneratorState::Running => {}
        }

        let elapsed = (now - self.started_at).max(0.0);
        let due = ((f64::from(self.fs) * elapsed).floor() as u64).min(self.total_count);
        let required = due.saturating_sub(self.sent);

        let mut burst = Vec::with_capacity(required as usize + 1);
        for _ in 0..required {
            burst.push(StreamItem::Data(Sample::new(self.sent as i64, clock.now())));
            self.sent += 1;
        }

        if self.sent >= self.total_count {
            burst.push(StreamItem::EndOfStream {
                t_generated: clock.now(),
            });
            self.state = GeneratorState::Finished;
        }
        burst
    }

    /// Blocking, lazily paced iterator over the whole stream.
    pub fn paced<C: Clock>(self, clock: C) -> Paced<C> {
        Paced {
            generator: self,
            clock,
            pending: VecDeque::new(),
            ticked: false,
        }
    }
}

/// Iterator returned by [`SampleGenerator::paced`]; sleeps the calling thread
/// between ticks.
pub struct Paced<C: Clock> {
    generator: SampleGenerator,
    clock: C,
    pending: VecDeque<StreamItem>,
    ticked: bool,
}

impl<C: Clock> Iterator for Paced<C> {
    type Item = StreamItem;

    fn next(&mut self) -> Option<StreamItem> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some(item);
            }
            if self.generator.is_finished() {
                return None;
            }
            if self.ticked {
                std::thread::sleep(self.generator.tick_interval());
            }
            self.ticked = true;
            self.pending.extend(self.generator.poll(&self.clock));
        }
    }
}
