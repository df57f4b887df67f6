//! The orchestrating sync state machine.

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::report::{
    ItemError, ItemErrorKind, PhaseReport, SyncOptions, SyncReport, SyncState, SyncStats,
};
use crate::scheduler::{DueTask, SyncTrigger, TaskScheduler};
use crate::storage::{Storage, StorageError};
use crate::transport::{SendOutcome, Transport};
use driftsync_core::{
    auto_merge, divergent, resolve, ConflictId, ConflictKind, ConflictRecord, ConflictStore,
    Operation, Record, RecordId, Resolution, ResolutionDecision, ResolutionStrategy, SyncQueue,
    SyncQueueItem, Timestamp,
};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Cycle counters behind one lock so `get_stats` sees a consistent
/// snapshot.
#[derive(Debug, Default)]
struct Metrics {
    sync_count: u64,
    error_count: u64,
    total_latency: Duration,
    last_sync_at: Option<Timestamp>,
}

/// Restores `Idle` on drop, so a failed cycle can never leave the
/// engine locked out of future syncs.
struct IdleGuard<'a> {
    state: &'a RwLock<SyncState>,
}

impl Drop for IdleGuard<'_> {
    fn drop(&mut self) {
        *self.state.write() = SyncState::Idle;
    }
}

/// The sync coordinator reconciles locally queued mutations against a
/// remote authority and pulls remote changes back down.
///
/// # State machine
///
/// `Idle → SyncingUp → SyncingDown → Idle`, with at most one cycle
/// executing at a time. Callers arriving while a cycle runs set the
/// `resync_requested` flag instead of starting a second cycle; the
/// engine runs exactly one follow-up cycle after the current one
/// completes, however many callers were coalesced.
pub struct SyncCoordinator<T: Transport, S: Storage, C: Clock> {
    config: SyncConfig,
    transport: Arc<T>,
    storage: Arc<S>,
    clock: Arc<C>,
    state: RwLock<SyncState>,
    resync_requested: AtomicBool,
    ready: AtomicBool,
    queue: Mutex<SyncQueue>,
    conflicts: Mutex<ConflictStore>,
    scheduler: Mutex<TaskScheduler>,
    /// Millisecond watermark; monotonic except via `reset_watermark`.
    watermark: AtomicI64,
    metrics: Mutex<Metrics>,
}

impl<T: Transport, S: Storage, C: Clock> SyncCoordinator<T, S, C> {
    /// Creates a coordinator. Call [`SyncCoordinator::init`] before
    /// syncing.
    pub fn new(config: SyncConfig, transport: T, storage: S, clock: C) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            storage: Arc::new(storage),
            clock: Arc::new(clock),
            state: RwLock::new(SyncState::Idle),
            resync_requested: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            queue: Mutex::new(SyncQueue::new()),
            conflicts: Mutex::new(ConflictStore::new()),
            scheduler: Mutex::new(TaskScheduler::new()),
            watermark: AtomicI64::new(Timestamp::ZERO.as_millis()),
            metrics: Mutex::new(Metrics::default()),
        }
    }

    /// Readies the engine and arms the periodic sync trigger.
    ///
    /// Idempotent: calling again while ready is a no-op.
    pub fn init(&self) {
        if self.ready.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.config.enable_auto_sync {
            self.scheduler.lock().schedule_trigger(
                SyncTrigger::Interval,
                self.config.sync_interval,
                self.clock.now(),
            );
        }
        debug!(endpoint = %self.config.api_endpoint, "sync engine initialized");
    }

    /// Cancels pending timers and stops reacting to triggers.
    ///
    /// Items awaiting a retry go back to the queue so stopping loses no
    /// mutations. Safe to call when not running.
    pub fn stop(&self) {
        if !self.ready.swap(false, Ordering::SeqCst) {
            return;
        }
        let recovered = {
            let mut scheduler = self.scheduler.lock();
            let recovered = scheduler.take_retry_payloads();
            scheduler.cancel_all();
            recovered
        };
        let mut queue = self.queue.lock();
        for item in recovered {
            queue.push_back(item);
        }
        debug!("sync engine stopped");
    }

    /// Returns the current state machine position.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Returns the transport collaborator.
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Returns the storage collaborator.
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Returns the clock collaborator.
    pub fn clock(&self) -> &Arc<C> {
        &self.clock
    }

    /// Returns the current sync watermark.
    pub fn watermark(&self) -> Timestamp {
        Timestamp::new(self.watermark.load(Ordering::SeqCst))
    }

    /// Explicitly rolls the watermark back to zero, forcing the next
    /// download phase to re-fetch everything.
    pub fn reset_watermark(&self) {
        self.watermark
            .store(Timestamp::ZERO.as_millis(), Ordering::SeqCst);
    }

    /// Registers a local mutation for upload and arms the debounced
    /// sync trigger, so bursts of edits coalesce into one round trip.
    ///
    /// An entity with an unresolved conflict is not queued: resolving
    /// the conflict is the only path that may re-queue it.
    pub fn queue_entity_for_sync(&self, record: Record, operation: Operation) {
        if self.conflicts.lock().contains_entity(&record.id) {
            warn!(entity = %record.id, "entity has an unresolved conflict, not queued");
            return;
        }
        let now = self.clock.now();
        self.queue
            .lock()
            .push_back(SyncQueueItem::new(record, operation, now));
        if self.ready.load(Ordering::SeqCst) {
            self.scheduler
                .lock()
                .schedule_trigger(SyncTrigger::Debounce, self.config.debounce, now);
        }
    }

    /// Signals a network-online transition, scheduling an immediate
    /// sync on the next tick.
    pub fn notify_online(&self) {
        if !self.ready.load(Ordering::SeqCst) {
            return;
        }
        debug!("network online, sync scheduled");
        self.scheduler.lock().schedule_trigger(
            SyncTrigger::Online,
            Duration::ZERO,
            self.clock.now(),
        );
    }

    /// Drives the deadline scheduler: re-queues due retries, then runs
    /// at most one sync cycle if any trigger is due.
    ///
    /// Returns the cycle's report when one ran. Call this from a timer
    /// wheel, an event loop turn, or a test clock.
    pub fn tick(&self) -> SyncResult<Option<SyncReport>> {
        if !self.ready.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let now = self.clock.now();
        let due = self.scheduler.lock().drain_due(now);

        let mut fired: Option<SyncTrigger> = None;
        let mut interval_fired = false;
        for task in due {
            match task {
                DueTask::Requeue(item) => {
                    debug!(entity = %item.id, retry = item.retry_count, "retry due, item re-queued");
                    self.queue.lock().push_back(item);
                }
                DueTask::Sync(trigger) => {
                    interval_fired |= trigger == SyncTrigger::Interval;
                    fired.get_or_insert(trigger);
                }
            }
        }

        if interval_fired && self.config.enable_auto_sync {
            self.scheduler.lock().schedule_trigger(
                SyncTrigger::Interval,
                self.config.sync_interval,
                now,
            );
        }

        match fired {
            Some(trigger) => {
                debug!(?trigger, "scheduled sync starting");
                self.perform_sync(SyncOptions::default()).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Runs a sync cycle, or coalesces into the one already running.
    ///
    /// When a cycle is active and `force` is unset, this sets the
    /// `resync_requested` flag and returns a deferred report without
    /// side effects; the running cycle re-runs once after it completes.
    /// Phase-level failures abort the cycle and propagate, but the
    /// engine always returns to `Idle`.
    pub fn perform_sync(&self, options: SyncOptions) -> SyncResult<SyncReport> {
        self.check_ready()?;

        if !self.enter(options.force) {
            debug!("sync already running, coalescing into one pending re-run");
            self.resync_requested.store(true, Ordering::SeqCst);
            return Ok(SyncReport::deferred());
        }

        let result = self.run_cycle(&options);
        if result.is_err() {
            self.metrics.lock().error_count += 1;
        }

        // Bounded re-trigger: exactly one follow-up cycle per call,
        // however many callers were coalesced while we ran.
        if self.resync_requested.swap(false, Ordering::SeqCst) {
            if self.enter(false) {
                debug!("running coalesced follow-up sync");
                if let Err(error) = self.run_cycle(&SyncOptions::default()) {
                    self.metrics.lock().error_count += 1;
                    warn!(%error, "coalesced follow-up sync failed");
                }
            } else {
                // Another (forced) cycle raced in; it owns the re-run.
                self.resync_requested.store(true, Ordering::SeqCst);
            }
        }

        result
    }

    /// Returns a snapshot of the pending conflicts awaiting an
    /// explicit decision.
    pub fn get_pending_conflicts(&self) -> Vec<ConflictRecord> {
        self.conflicts.lock().pending().to_vec()
    }

    /// Completes a deferred conflict with an explicit decision.
    ///
    /// The winning record is applied through the same storage
    /// collaborator as the download phase, and the pending entry is
    /// removed exactly once. `UseCustom` requires `custom`; a missing
    /// record fails with a configuration error and leaves the entry
    /// untouched. Unless the decision is `UseRemote`, the winner is a
    /// new local version and is re-queued for upload.
    pub fn resolve_conflict(
        &self,
        conflict_id: ConflictId,
        decision: ResolutionDecision,
        custom: Option<Record>,
    ) -> SyncResult<Record> {
        self.check_ready()?;

        let conflict = self
            .conflicts
            .lock()
            .get(&conflict_id)
            .cloned()
            .ok_or_else(|| SyncError::UnknownConflict(conflict_id.to_string()))?;

        let winner = match decision {
            ResolutionDecision::UseLocal => conflict.local.clone(),
            ResolutionDecision::UseRemote => conflict.remote.clone(),
            ResolutionDecision::MergeAuto => {
                auto_merge(&conflict.local, &conflict.remote, self.clock.now())
            }
            ResolutionDecision::UseCustom => {
                let mut custom = custom.ok_or_else(|| {
                    SyncError::Configuration("use_custom requires a replacement record".into())
                })?;
                custom.id = conflict.entity_id.clone();
                custom.updated_at = self.clock.now();
                custom
            }
        };

        self.storage
            .put(&self.config.collection, &winner)
            .map_err(|error| self.storage_error(&winner.id, error))?;

        // The entry stays pending if the write above failed; past this
        // point it is removed exactly once.
        self.conflicts.lock().remove(&conflict_id);
        debug!(entity = %conflict.entity_id, ?decision, "conflict resolved");

        if decision != ResolutionDecision::UseRemote {
            let now = self.clock.now();
            self.queue
                .lock()
                .push_back(SyncQueueItem::new(winner.clone(), Operation::Upsert, now));
            self.scheduler
                .lock()
                .schedule_trigger(SyncTrigger::Debounce, self.config.debounce, now);
        }

        Ok(winner)
    }

    /// Returns a consistent snapshot of engine statistics.
    pub fn get_stats(&self) -> SyncStats {
        let metrics = self.metrics.lock();
        let average_latency_ms = if metrics.sync_count == 0 {
            0.0
        } else {
            metrics.total_latency.as_secs_f64() * 1000.0 / metrics.sync_count as f64
        };
        SyncStats {
            queue_size: self.queue.lock().len(),
            conflict_queue_size: self.conflicts.lock().len(),
            sync_count: metrics.sync_count,
            error_count: metrics.error_count,
            average_latency_ms,
            last_sync_at: metrics.last_sync_at,
        }
    }

    fn check_ready(&self) -> SyncResult<()> {
        if self.ready.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::Configuration(
                "engine not initialized; call init() first".into(),
            ))
        }
    }

    /// Claims the state machine for a new cycle. Returns false if one
    /// is already running and `force` is unset.
    fn enter(&self, force: bool) -> bool {
        let mut state = self.state.write();
        if state.is_active() && !force {
            return false;
        }
        *state = SyncState::SyncingUp;
        true
    }

    fn run_cycle(&self, options: &SyncOptions) -> SyncResult<SyncReport> {
        let started = Instant::now();
        let _guard = IdleGuard { state: &self.state };

        let batch_size = options.batch_size.unwrap_or(self.config.batch_size);
        let strategy = options
            .conflict_resolution
            .unwrap_or(self.config.conflict_resolution);

        let mut report = SyncReport::default();
        let mut detected: Vec<ConflictRecord> = Vec::new();

        if options.direction.includes_up() {
            self.sync_up(batch_size, &mut report.up, &mut detected);
        }

        *self.state.write() = SyncState::SyncingDown;
        let mut max_applied = self.watermark();
        if options.direction.includes_down() {
            self.sync_down(batch_size, &mut report.down, &mut detected, &mut max_applied)?;
        }

        self.route_conflicts(detected, strategy, &mut report, &mut max_applied);
        if options.direction.includes_down() {
            self.advance_watermark(max_applied);
        }

        report.duration = started.elapsed();
        {
            let mut metrics = self.metrics.lock();
            metrics.sync_count += 1;
            metrics.total_latency += report.duration;
            metrics.last_sync_at = Some(self.clock.now());
        }
        debug!(
            uploaded = report.up.synced,
            downloaded = report.down.synced,
            conflicts = report.conflicts.len(),
            "sync cycle completed"
        );
        Ok(report)
    }

    /// Upload phase: drains up to `batch_size` items FIFO and sends
    /// each to the remote authority. Per-item failures are contained;
    /// they never abort the rest of the batch.
    fn sync_up(
        &self,
        batch_size: usize,
        phase: &mut PhaseReport,
        detected: &mut Vec<ConflictRecord>,
    ) {
        let batch = self.queue.lock().drain_front(batch_size);
        if batch.is_empty() {
            return;
        }
        debug!(items = batch.len(), "upload phase started");

        for mut item in batch {
            match self.transport.send(&item) {
                Ok(SendOutcome::Accepted) => {
                    phase.synced += 1;
                }
                Ok(SendOutcome::Conflict { remote }) => {
                    phase.conflicts += 1;
                    detected.push(ConflictRecord::new(
                        &self.config.collection,
                        ConflictKind::Upload,
                        item.record.clone(),
                        remote,
                        self.clock.now(),
                    ));
                }
                Err(error) if error.is_retryable() => {
                    item.retry_count += 1;
                    if item.retry_count < self.config.max_retries {
                        let delay = self.config.retry_backoff(item.retry_count);
                        debug!(
                            entity = %item.id,
                            retry = item.retry_count,
                            delay_ms = delay.as_millis() as u64,
                            "upload failed, retry scheduled"
                        );
                        self.scheduler
                            .lock()
                            .schedule_retry(item, delay, self.clock.now());
                    } else {
                        warn!(entity = %item.id, %error, "upload failed permanently");
                        phase.errors.push(ItemError {
                            entity_id: item.id.clone(),
                            kind: ItemErrorKind::Transport,
                            message: error.to_string(),
                        });
                    }
                }
                Err(error) => {
                    warn!(entity = %item.id, %error, "upload rejected, not retried");
                    phase.errors.push(ItemError {
                        entity_id: item.id.clone(),
                        kind: ItemErrorKind::Transport,
                        message: error.to_string(),
                    });
                }
            }
        }
    }

    /// Download phase: pulls records changed since the watermark and
    /// applies or conflicts each one. A fetch failure aborts the cycle;
    /// per-record failures are contained.
    fn sync_down(
        &self,
        batch_size: usize,
        phase: &mut PhaseReport,
        detected: &mut Vec<ConflictRecord>,
        max_applied: &mut Timestamp,
    ) -> SyncResult<()> {
        let since = self.watermark();
        let records = self.transport.fetch(since, batch_size)?;
        if !records.is_empty() {
            debug!(records = records.len(), since = %since, "download phase started");
        }

        for remote in records {
            let local = match self.storage.get(&self.config.collection, &remote.id) {
                Ok(local) => local,
                Err(error) => {
                    warn!(entity = %remote.id, %error, "local lookup failed");
                    phase.errors.push(ItemError {
                        entity_id: remote.id.clone(),
                        kind: ItemErrorKind::Storage,
                        message: error.to_string(),
                    });
                    continue;
                }
            };

            match local {
                Some(local) if divergent(&local, &remote, since) => {
                    phase.conflicts += 1;
                    detected.push(ConflictRecord::new(
                        &self.config.collection,
                        ConflictKind::Update,
                        local,
                        remote,
                        self.clock.now(),
                    ));
                }
                _ => {
                    if self.apply_record(&remote, phase) {
                        phase.synced += 1;
                        *max_applied = max_applied.later(remote.updated_at);
                    }
                }
            }
        }
        Ok(())
    }

    /// Routes detected conflicts through the strategy: auto strategies
    /// apply their winner immediately, `UserGuided` queues the conflict
    /// for an explicit decision.
    fn route_conflicts(
        &self,
        detected: Vec<ConflictRecord>,
        strategy: ResolutionStrategy,
        report: &mut SyncReport,
        max_applied: &mut Timestamp,
    ) {
        for conflict in detected {
            match resolve(strategy, &conflict, self.clock.now()) {
                Resolution::Resolved(winner) => {
                    let phase = match conflict.kind {
                        ConflictKind::Upload => &mut report.up,
                        ConflictKind::Update => &mut report.down,
                    };
                    if self.apply_record(&winner, phase) && conflict.kind == ConflictKind::Update {
                        // The remote change is reconciled; the download
                        // stream need not serve it again.
                        *max_applied = max_applied.later(conflict.remote.updated_at);
                    }
                    report.conflicts.push(conflict);
                }
                Resolution::Deferred => {
                    debug!(entity = %conflict.entity_id, kind = ?conflict.kind, "conflict queued for user resolution");
                    // An unresolved conflict must not leave a pending
                    // upload behind for the same entity.
                    self.queue.lock().remove_entity(&conflict.entity_id);
                    if self.conflicts.lock().insert(conflict.clone()).is_some() {
                        debug!(entity = %conflict.entity_id, "replaced earlier pending conflict");
                    }
                    report.conflicts.push(conflict);
                }
            }
        }
    }

    /// Writes a record through the storage collaborator. Policy
    /// denials are logged and skipped, never retried: retrying would
    /// repeat the same denial.
    fn apply_record(&self, record: &Record, phase: &mut PhaseReport) -> bool {
        match self.storage.put(&self.config.collection, record) {
            Ok(()) => true,
            Err(StorageError::PolicyDenied { message }) => {
                warn!(entity = %record.id, %message, "write denied by policy, skipped");
                phase.errors.push(ItemError {
                    entity_id: record.id.clone(),
                    kind: ItemErrorKind::PolicyDenied,
                    message,
                });
                false
            }
            Err(error) => {
                warn!(entity = %record.id, %error, "storage write failed");
                phase.errors.push(ItemError {
                    entity_id: record.id.clone(),
                    kind: ItemErrorKind::Storage,
                    message: error.to_string(),
                });
                false
            }
        }
    }

    fn advance_watermark(&self, candidate: Timestamp) {
        let current = self.watermark();
        if candidate > current {
            self.watermark
                .store(candidate.as_millis(), Ordering::SeqCst);
            debug!(watermark = %candidate, "watermark advanced");
        }
    }

    fn storage_error(&self, entity_id: &RecordId, error: StorageError) -> SyncError {
        match error {
            StorageError::PolicyDenied { message } => SyncError::PolicyDenied {
                entity_id: entity_id.clone(),
                message,
            },
            other => SyncError::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::report::SyncDirection;
    use crate::storage::MemoryStorage;
    use crate::transport::MockTransport;

    fn make_engine() -> SyncCoordinator<MockTransport, MemoryStorage, ManualClock> {
        let config = SyncConfig::new("https://sync.example.com")
            .with_collection("notes")
            .with_auto_sync(false);
        SyncCoordinator::new(
            config,
            MockTransport::new(),
            MemoryStorage::new(),
            ManualClock::starting_at(1_000),
        )
    }

    #[test]
    fn perform_sync_requires_init() {
        let engine = make_engine();
        let result = engine.perform_sync(SyncOptions::default());
        assert!(matches!(result, Err(SyncError::Configuration(_))));
    }

    #[test]
    fn init_is_idempotent() {
        let engine = make_engine();
        engine.init();
        engine.init();
        assert_eq!(engine.state(), SyncState::Idle);
        assert!(engine.perform_sync(SyncOptions::default()).is_ok());
    }

    #[test]
    fn upload_accepted_drains_queue() {
        let engine = make_engine();
        engine.init();
        engine.queue_entity_for_sync(Record::new("42", Timestamp::new(10)), Operation::Upsert);

        let report = engine
            .perform_sync(SyncOptions::new().with_direction(SyncDirection::Up))
            .unwrap();

        assert_eq!(report.up.synced, 1);
        assert_eq!(engine.get_stats().queue_size, 0);
    }

    #[test]
    fn busy_engine_coalesces_into_one_rerun() {
        let engine = make_engine();
        engine.init();

        // Pin the state machine as if a cycle were running on another
        // thread.
        *engine.state.write() = SyncState::SyncingUp;

        for _ in 0..3 {
            let report = engine.perform_sync(SyncOptions::default()).unwrap();
            assert!(report.deferred);
        }
        assert_eq!(engine.get_stats().sync_count, 0);

        // The running cycle "completes"; the next call runs its own
        // cycle plus exactly one coalesced follow-up, not one per
        // deferred caller.
        *engine.state.write() = SyncState::Idle;
        let report = engine.perform_sync(SyncOptions::default()).unwrap();
        assert!(!report.deferred);
        assert_eq!(engine.get_stats().sync_count, 2);
    }

    #[test]
    fn force_bypasses_single_flight() {
        let engine = make_engine();
        engine.init();
        *engine.state.write() = SyncState::SyncingUp;

        let report = engine
            .perform_sync(SyncOptions::new().with_force(true))
            .unwrap();
        assert!(!report.deferred);
        assert_eq!(engine.state(), SyncState::Idle);
    }

    #[test]
    fn fetch_failure_aborts_cycle_but_returns_to_idle() {
        let engine = make_engine();
        engine.init();
        engine.transport.fail_fetch(true);

        let result = engine.perform_sync(SyncOptions::default());
        assert!(result.is_err());
        assert_eq!(engine.state(), SyncState::Idle);
        assert_eq!(engine.get_stats().error_count, 1);

        // A later cycle is not locked out.
        engine.transport.fail_fetch(false);
        assert!(engine.perform_sync(SyncOptions::default()).is_ok());
    }

    #[test]
    fn retry_ceiling_is_exact() {
        let engine = make_engine();
        engine.init();
        engine.transport.fail_sends(u32::MAX);
        engine.queue_entity_for_sync(Record::new("a", Timestamp::new(10)), Operation::Upsert);

        let up_only = || SyncOptions::new().with_direction(SyncDirection::Up);

        // Attempt 1: fails, handed to the retry scheduler.
        let report = engine.perform_sync(up_only()).unwrap();
        assert!(report.up.errors.is_empty());
        assert_eq!(engine.scheduler.lock().pending_retries(), 1);

        // Backoff and the debounce window elapse; the tick re-queues
        // the item and the debounced trigger runs attempt 2, which
        // fails and is scheduled again.
        engine.clock.advance(10_000);
        let report = engine.tick().unwrap().unwrap();
        assert!(report.up.errors.is_empty());
        assert_eq!(engine.scheduler.lock().pending_retries(), 1);

        // Attempt 3 hits the ceiling: dropped, reported exactly once.
        engine.clock.advance(10_000);
        assert!(engine.tick().unwrap().is_none());
        assert_eq!(engine.get_stats().queue_size, 1);
        let report = engine.perform_sync(up_only()).unwrap();
        assert_eq!(report.up.errors.len(), 1);
        assert_eq!(report.up.errors[0].kind, ItemErrorKind::Transport);
        assert_eq!(engine.scheduler.lock().pending_retries(), 0);
        assert_eq!(engine.get_stats().queue_size, 0);

        // Never attempted a fourth time.
        assert_eq!(engine.transport.sent_items().len(), 3);
    }

    #[test]
    fn download_applies_new_records_and_advances_watermark() {
        let engine = make_engine();
        engine.init();
        engine.transport.set_remote_records(vec![
            Record::new("a", Timestamp::new(100)),
            Record::new("b", Timestamp::new(150)),
        ]);

        let report = engine.perform_sync(SyncOptions::default()).unwrap();
        assert_eq!(report.down.synced, 2);
        assert_eq!(engine.watermark(), Timestamp::new(150));

        // Idempotent: nothing newer, watermark unchanged.
        let report = engine.perform_sync(SyncOptions::default()).unwrap();
        assert_eq!(report.down.synced, 0);
        assert_eq!(engine.watermark(), Timestamp::new(150));
    }

    #[test]
    fn policy_denied_download_is_contained() {
        let engine = make_engine();
        engine.init();
        engine
            .storage
            .deny_writes_for(&RecordId::from("secret"));
        engine.transport.set_remote_records(vec![
            Record::new("secret", Timestamp::new(100)),
            Record::new("open", Timestamp::new(150)),
        ]);

        let report = engine.perform_sync(SyncOptions::default()).unwrap();

        // The denial is an item error, not a conflict and not a crash;
        // the rest of the batch still applies.
        assert_eq!(report.down.synced, 1);
        assert_eq!(report.down.conflicts, 0);
        assert_eq!(report.down.errors.len(), 1);
        assert_eq!(report.down.errors[0].kind, ItemErrorKind::PolicyDenied);
        assert_eq!(engine.watermark(), Timestamp::new(150));
    }

    #[test]
    fn queueing_a_conflicted_entity_is_refused() {
        let engine = make_engine();
        engine.init();

        engine
            .storage
            .put("notes", &Record::new("a", Timestamp::new(100)))
            .unwrap();
        engine
            .transport
            .set_remote_records(vec![Record::new("a", Timestamp::new(150))]);
        engine.perform_sync(SyncOptions::default()).unwrap();
        assert_eq!(engine.get_pending_conflicts().len(), 1);

        engine.queue_entity_for_sync(Record::new("a", Timestamp::new(200)), Operation::Upsert);
        assert_eq!(engine.get_stats().queue_size, 0);
    }

    #[test]
    fn stop_recovers_pending_retries() {
        let engine = make_engine();
        engine.init();
        engine.transport.fail_sends(1);
        engine.queue_entity_for_sync(Record::new("a", Timestamp::new(10)), Operation::Upsert);
        engine
            .perform_sync(SyncOptions::new().with_direction(SyncDirection::Up))
            .unwrap();
        assert_eq!(engine.scheduler.lock().pending_retries(), 1);
        assert_eq!(engine.get_stats().queue_size, 0);

        engine.stop();
        assert_eq!(engine.get_stats().queue_size, 1);

        // Safe to call again when not running.
        engine.stop();
        assert_eq!(engine.get_stats().queue_size, 1);
    }

    #[test]
    fn stats_track_cycles_and_latency() {
        let engine = make_engine();
        engine.init();

        engine.perform_sync(SyncOptions::default()).unwrap();
        engine.perform_sync(SyncOptions::default()).unwrap();

        let stats = engine.get_stats();
        assert_eq!(stats.sync_count, 2);
        assert_eq!(stats.error_count, 0);
        assert!(stats.average_latency_ms >= 0.0);
        assert_eq!(stats.last_sync_at, Some(Timestamp::new(1_000)));
    }

    #[test]
    fn lww_strategy_resolves_download_conflict_in_place() {
        let engine = make_engine();
        engine.init();

        engine
            .storage
            .put("notes", &Record::new("7", Timestamp::new(100)))
            .unwrap();
        engine
            .transport
            .set_remote_records(vec![Record::new("7", Timestamp::new(150))]);

        let report = engine
            .perform_sync(
                SyncOptions::new()
                    .with_direction(SyncDirection::Down)
                    .with_conflict_resolution(ResolutionStrategy::LastWriteWins),
            )
            .unwrap();

        assert_eq!(report.down.conflicts, 1);
        assert_eq!(report.conflicts.len(), 1);
        // Remote won; nothing is left pending.
        let stored = engine
            .storage
            .get("notes", &RecordId::from("7"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.updated_at, Timestamp::new(150));
        assert!(engine.get_pending_conflicts().is_empty());
        assert_eq!(engine.watermark(), Timestamp::new(150));
    }
}
