//! Deadline-based task scheduling.
//!
//! Debounce, periodic, and retry timers are modeled as explicit
//! deadlines drained by the engine's `tick`, so the engine works under
//! any concurrency model (timer wheel, delayed channel send, or a
//! cooperative scheduler tick) instead of binding to a runtime's timer
//! primitives.

use driftsync_core::{SyncQueueItem, Timestamp};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

/// What caused a scheduled sync trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SyncTrigger {
    /// Debounced "entity queued" signal.
    Debounce,
    /// Periodic timer.
    Interval,
    /// Network-online transition.
    Online,
}

/// Key identifying a scheduled task.
///
/// Trigger keys coalesce: scheduling the same trigger again supersedes
/// the earlier deadline. Retry keys are unique per scheduled retry so
/// retries for distinct items run independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum TaskKey {
    Trigger(SyncTrigger),
    Retry(u64),
}

/// A task whose deadline has passed.
#[derive(Debug, Clone, PartialEq)]
pub enum DueTask {
    /// Run a sync cycle.
    Sync(SyncTrigger),
    /// Re-append a previously failed upload to the queue.
    Requeue(SyncQueueItem),
}

/// Schedules deadline-driven work: debounced sync triggers, the
/// periodic sync interval, and per-item upload retries.
///
/// Rescheduling a trigger never shortens its deadline (debounce
/// semantics: a burst of signals coalesces into one firing at
/// `last_signal + delay`). Stale heap entries left behind by
/// supersession are discarded on drain.
#[derive(Debug, Default)]
pub struct TaskScheduler {
    /// Live deadlines; the heap may hold superseded entries.
    pending: HashMap<TaskKey, Timestamp>,
    /// Queue items carried by pending retries.
    retry_payloads: HashMap<u64, SyncQueueItem>,
    heap: BinaryHeap<Reverse<(Timestamp, TaskKey)>>,
    next_retry_seq: u64,
}

impl TaskScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules a sync trigger to fire `delay` after `now`.
    ///
    /// If the trigger is already pending, the later deadline wins.
    pub fn schedule_trigger(&mut self, trigger: SyncTrigger, delay: Duration, now: Timestamp) {
        let key = TaskKey::Trigger(trigger);
        let candidate = Timestamp::new(now.as_millis() + delay.as_millis() as i64);
        let fire_at = self
            .pending
            .get(&key)
            .copied()
            .map(|existing| existing.later(candidate))
            .unwrap_or(candidate);

        if self.pending.get(&key).copied() == Some(fire_at) {
            return;
        }
        self.pending.insert(key, fire_at);
        self.heap.push(Reverse((fire_at, key)));
    }

    /// Schedules a failed upload for re-enqueue after `delay`.
    pub fn schedule_retry(&mut self, item: SyncQueueItem, delay: Duration, now: Timestamp) {
        let seq = self.next_retry_seq;
        self.next_retry_seq += 1;

        let fire_at = Timestamp::new(now.as_millis() + delay.as_millis() as i64);
        self.pending.insert(TaskKey::Retry(seq), fire_at);
        self.retry_payloads.insert(seq, item);
        self.heap.push(Reverse((fire_at, TaskKey::Retry(seq))));
    }

    /// Removes and returns every task due at `now`, in deadline order.
    pub fn drain_due(&mut self, now: Timestamp) -> Vec<DueTask> {
        let mut due = Vec::new();
        loop {
            self.pop_stale();
            let Some(Reverse((fire_at, key))) = self.heap.peek().copied() else {
                break;
            };
            if fire_at > now {
                break;
            }
            let _ = self.heap.pop();
            if self.pending.get(&key).copied() != Some(fire_at) {
                continue;
            }
            self.pending.remove(&key);
            match key {
                TaskKey::Trigger(trigger) => due.push(DueTask::Sync(trigger)),
                TaskKey::Retry(seq) => {
                    if let Some(item) = self.retry_payloads.remove(&seq) {
                        due.push(DueTask::Requeue(item));
                    }
                }
            }
        }
        due
    }

    /// Returns the earliest pending deadline, if any.
    pub fn next_deadline(&mut self) -> Option<Timestamp> {
        self.pop_stale();
        self.heap.peek().map(|Reverse((fire_at, _))| *fire_at)
    }

    /// Returns true if the trigger has a pending deadline.
    #[must_use]
    pub fn is_pending(&self, trigger: SyncTrigger) -> bool {
        self.pending.contains_key(&TaskKey::Trigger(trigger))
    }

    /// Returns the number of pending retries.
    #[must_use]
    pub fn pending_retries(&self) -> usize {
        self.retry_payloads.len()
    }

    /// Removes every pending retry and returns the carried items in
    /// scheduling order. Used on shutdown so stopping the engine loses
    /// no queued mutations.
    pub fn take_retry_payloads(&mut self) -> Vec<SyncQueueItem> {
        let mut entries: Vec<(u64, SyncQueueItem)> = self.retry_payloads.drain().collect();
        for (seq, _) in &entries {
            self.pending.remove(&TaskKey::Retry(*seq));
        }
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, item)| item).collect()
    }

    /// Cancels every pending task.
    pub fn cancel_all(&mut self) {
        self.pending.clear();
        self.retry_payloads.clear();
        self.heap.clear();
    }

    fn pop_stale(&mut self) {
        while let Some(Reverse((fire_at, key))) = self.heap.peek() {
            match self.pending.get(key).copied() {
                Some(current) if current == *fire_at => break,
                _ => {
                    let _ = self.heap.pop();
                }
            }
        }
    }
}
