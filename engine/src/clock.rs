//! Clocks for stamping outbox records.
//!
//! Wall-clock milliseconds are not enough to order records: two edits in the
//! same millisecond, or a clock stepping backwards, would tie or invert.
//! [`MonotonicClock`] turns wall time into strictly increasing stamps.

use crate::Timestamp;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock time in milliseconds since epoch.
pub trait WallClock: Send + Sync {
    fn now_ms(&self) -> Timestamp;
}

/// The operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_ms(&self) -> Timestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as Timestamp)
            .unwrap_or(0)
    }
}

/// A clock that always reports the same instant. Useful in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Timestamp);

impl WallClock for FixedClock {
    fn now_ms(&self) -> Timestamp {
        self.0
    }
}

/// Strictly increasing stamp generator.
///
/// Each stamp is `max(now, last + 1)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonotonicClock {
    /// Last stamp handed out
    pub last: Timestamp,
}

impl MonotonicClock {
    /// Create a clock that has not issued anything yet.
    pub fn new() -> Self {
        Self { last: 0 }
    }

    /// Create a clock resuming after a previously issued stamp.
    pub fn resume_after(last: Timestamp) -> Self {
        Self { last }
    }

    /// Issue the next stamp for the given wall time.
    pub fn tick(&mut self, now: Timestamp) -> Timestamp {
        self.last = now.max(self.last.saturating_add(1));
        self.last
    }

    /// Make sure future stamps come after `seen`.
    pub fn merge(&mut self, seen: Timestamp) {
        self.last = self.last.max(seen);
    }
}
