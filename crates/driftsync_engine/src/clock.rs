//! Clock abstraction.

use driftsync_core::Timestamp;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A monotonic-enough timestamp source.
///
/// The engine stamps merged records, queue items, and the watermark
/// through this seam so every time-dependent behavior is deterministic
/// under test.
pub trait Clock: Send + Sync {
    /// Returns the current logical time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock implementation for production use.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Timestamp::new(millis as i64)
    }
}

/// A hand-advanced clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Creates a clock starting at the given time.
    #[must_use]
    pub fn starting_at(millis: i64) -> Self {
        Self {
            now: AtomicI64::new(millis),
        }
    }

    /// Sets the current time.
    pub fn set(&self, millis: i64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    /// Advances the current time.
    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.now.load(Ordering::SeqCst))
    }
}
