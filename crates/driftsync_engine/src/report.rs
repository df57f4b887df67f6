//! Sync call options, state, and result types.

use driftsync_core::{ConflictRecord, RecordId, ResolutionStrategy, Timestamp};
use std::time::Duration;

/// The current state of the sync coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No cycle is running.
    Idle,
    /// Draining the local queue to the remote authority.
    SyncingUp,
    /// Pulling remote changes since the watermark.
    SyncingDown,
}

impl SyncState {
    /// Returns true if a sync cycle is running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncState::Idle)
    }
}

/// Which phases a sync call executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncDirection {
    /// Upload phase only.
    Up,
    /// Download phase only.
    Down,
    /// Upload then download.
    #[default]
    Bidirectional,
}

impl SyncDirection {
    /// Returns true if the upload phase runs.
    #[must_use]
    pub fn includes_up(&self) -> bool {
        matches!(self, SyncDirection::Up | SyncDirection::Bidirectional)
    }

    /// Returns true if the download phase runs.
    #[must_use]
    pub fn includes_down(&self) -> bool {
        matches!(self, SyncDirection::Down | SyncDirection::Bidirectional)
    }
}

/// Options for a single sync call.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Which phases to run.
    pub direction: SyncDirection,
    /// Batch size override; the configured default applies when unset.
    pub batch_size: Option<usize>,
    /// Strategy override; the configured default applies when unset.
    pub conflict_resolution: Option<ResolutionStrategy>,
    /// Bypasses the single-flight guard. Diagnostics only.
    pub force: bool,
}

impl SyncOptions {
    /// Creates options with every default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the direction.
    #[must_use]
    pub fn with_direction(mut self, direction: SyncDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Overrides the batch size for this call.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Overrides the conflict resolution strategy for this call.
    #[must_use]
    pub fn with_conflict_resolution(mut self, strategy: ResolutionStrategy) -> Self {
        self.conflict_resolution = Some(strategy);
        self
    }

    /// Bypasses the single-flight guard.
    #[must_use]
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// How a contained per-item failure was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemErrorKind {
    /// Transport failure that exhausted its retries.
    Transport,
    /// The security layer rejected the write.
    PolicyDenied,
    /// Local storage failed for another reason.
    Storage,
}

/// A per-item failure contained within a phase.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemError {
    /// Identity of the affected record.
    pub entity_id: RecordId,
    /// Failure classification.
    pub kind: ItemErrorKind,
    /// Error message.
    pub message: String,
}

/// Counters for one phase of a sync cycle.
#[derive(Debug, Clone, Default)]
pub struct PhaseReport {
    /// Items uploaded or records downloaded and applied.
    pub synced: u64,
    /// Divergences detected in this phase.
    pub conflicts: u64,
    /// Contained per-item failures.
    pub errors: Vec<ItemError>,
}

/// The value returned from each sync call. Not persisted.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Upload phase counters.
    pub up: PhaseReport,
    /// Download phase counters.
    pub down: PhaseReport,
    /// Conflicts detected this cycle, whether auto-resolved or left
    /// pending for an explicit decision.
    pub conflicts: Vec<ConflictRecord>,
    /// True when the call coalesced into an already-running cycle and
    /// did nothing itself.
    pub deferred: bool,
    /// Duration of the cycle.
    pub duration: Duration,
}

impl SyncReport {
    /// A report for a call coalesced into a running cycle.
    #[must_use]
    pub fn deferred() -> Self {
        Self {
            deferred: true,
            ..Self::default()
        }
    }
}

/// A consistent snapshot of engine statistics.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Pending local mutations.
    pub queue_size: usize,
    /// Pending unresolved conflicts.
    pub conflict_queue_size: usize,
    /// Completed sync cycles.
    pub sync_count: u64,
    /// Failed sync cycles.
    pub error_count: u64,
    /// Mean duration of completed cycles, in milliseconds.
    pub average_latency_ms: f64,
    /// Completion time of the most recent successful cycle.
    pub last_sync_at: Option<Timestamp>,
}
