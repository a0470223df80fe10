//! Time source seam so dwell/liveness logic is testable without wall time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Monotonic-enough microsecond time source.
pub trait Clock: Send + Sync {
    /// Current time in microseconds since the unix epoch.
    fn now_us(&self) -> u64;
}

/// Wall-clock implementation used in production.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_us(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
    }
}

/// Hand-advanced clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    us: AtomicU64,
}

impl ManualClock {
    /// Clock starting at `start_us`.
    pub fn new(start_us: u64) -> Self {
        Self {
            us: AtomicU64::new(start_us),
        }
    }

    /// Advance by `delta_us` microseconds.
    pub fn advance_us(&self, delta_us: u64) {
        self.us.fetch_add(delta_us, Ordering::SeqCst);
    }

    /// Advance by `delta_ms` milliseconds.
    pub fn advance_ms(&self, delta_ms: u64) {
        self.advance_us(delta_ms * 1_000);
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.us.load(Ordering::SeqCst)
    }
}
