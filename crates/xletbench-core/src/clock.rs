//! Local clock used to timestamp samples on both sides of the Bus.
//!
//! On unix the reading is `CLOCK_MONOTONIC` in seconds, which is shared by
//! every process on the machine, so outlet and inlet timestamps taken on one
//! host are directly comparable.

use std::sync::atomic::{AtomicU64, Ordering};

/// Source of monotonic time in seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// The machine's monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> f64 {
        local_clock()
    }
}

/// Seconds on the machine-wide monotonic clock.
#[cfg(unix)]
pub fn local_clock() -> f64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, writable timespec and CLOCK_MONOTONIC is always supported.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    if rc != 0 {
        return fallback_clock();
    }
    ts.tv_sec as f64 + ts.tv_nsec as f64 * 1e-9
}

#[cfg(not(unix))]
pub fn local_clock() -> f64 {
    fallback_clock()
}

/// Process-relative monotonic seconds. Not comparable across processes.
fn fallback_clock() -> f64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static ORIGIN: OnceLock<Instant> = OnceLock::new();
    ORIGIN.get_or_init(Instant::now).elapsed().as_secs_f64()
}

/// Hand-driven clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: AtomicU64::new(start.to_bits()),
        }
    }

    pub fn set(&self, t: f64) {
        self.bits.store(t.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, dt: f64) {
        self.set(self.now() + dt);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}
