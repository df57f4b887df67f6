//! Configuration for the sync engine.

use driftsync_core::ResolutionStrategy;
use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the remote authority.
    pub api_endpoint: String,
    /// Logical collection this engine instance synchronizes. Used as
    /// the store kind for every local read/write.
    pub collection: String,
    /// Strategy applied to detected conflicts unless a sync call
    /// overrides it.
    pub conflict_resolution: ResolutionStrategy,
    /// Upload attempts per item before it is dropped as a permanent
    /// failure.
    pub max_retries: u32,
    /// Base delay for exponential upload backoff.
    pub retry_delay: Duration,
    /// Maximum items per upload batch and records per download batch.
    pub batch_size: usize,
    /// Interval between automatic sync cycles.
    pub sync_interval: Duration,
    /// Debounce window coalescing bursts of queued edits into one
    /// network round trip.
    pub debounce: Duration,
    /// Whether `init` arms the periodic sync trigger.
    pub enable_auto_sync: bool,
    /// Per-operation network timeout.
    pub timeout: Duration,
}

impl SyncConfig {
    /// Creates a configuration with defaults for everything but the
    /// endpoint.
    pub fn new(api_endpoint: impl Into<String>) -> Self {
        Self {
            api_endpoint: api_endpoint.into(),
            collection: "records".into(),
            conflict_resolution: ResolutionStrategy::default(),
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            batch_size: 100,
            sync_interval: Duration::from_secs(30),
            debounce: Duration::from_secs(2),
            enable_auto_sync: true,
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the synchronized collection.
    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    /// Sets the default conflict resolution strategy.
    #[must_use]
    pub fn with_conflict_resolution(mut self, strategy: ResolutionStrategy) -> Self {
        self.conflict_resolution = strategy;
        self
    }

    /// Sets the upload retry ceiling.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the base retry delay.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the automatic sync interval.
    #[must_use]
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the debounce window for queued-edit triggers.
    #[must_use]
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Enables or disables the periodic sync trigger.
    #[must_use]
    pub fn with_auto_sync(mut self, enabled: bool) -> Self {
        self.enable_auto_sync = enabled;
        self
    }

    /// Sets the per-operation network timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Backoff delay before retry attempt `retry_count` (1-indexed,
    /// already incremented for the failed attempt).
    #[must_use]
    pub fn retry_backoff(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(16);
        self.retry_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}
