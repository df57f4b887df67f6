//! Pending-mutation queue.

use crate::record::{Operation, Record, RecordId, Timestamp};
use std::collections::VecDeque;

/// A local mutation awaiting upload.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncQueueItem {
    /// Identity of the mutated record.
    pub id: RecordId,
    /// The record as it stood when the mutation was registered.
    pub record: Record,
    /// Upsert or delete.
    pub operation: Operation,
    /// When the mutation was queued.
    pub queued_at: Timestamp,
    /// How many upload attempts have failed so far.
    pub retry_count: u32,
}

impl SyncQueueItem {
    /// Creates a fresh queue item with no failed attempts.
    pub fn new(record: Record, operation: Operation, queued_at: Timestamp) -> Self {
        Self {
            id: record.id.clone(),
            record,
            operation,
            queued_at,
            retry_count: 0,
        }
    }
}

/// FIFO queue of pending local mutations.
///
/// # Invariants
///
/// - Items drain from the front in queue order, preserving the causal
///   order of sequential edits to the same record.
/// - An entity with an unresolved conflict has no item here; conflict
///   insertion evicts its pending items via [`SyncQueue::remove_entity`].
#[derive(Debug, Default)]
pub struct SyncQueue {
    items: VecDeque<SyncQueueItem>,
}

impl SyncQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    /// Appends an item at the back of the queue.
    pub fn push_back(&mut self, item: SyncQueueItem) {
        self.items.push_back(item);
    }

    /// Removes and returns up to `limit` items from the front.
    pub fn drain_front(&mut self, limit: usize) -> Vec<SyncQueueItem> {
        let take = limit.min(self.items.len());
        self.items.drain(..take).collect()
    }

    /// Removes every pending item for the given entity.
    ///
    /// Returns the number of items removed.
    pub fn remove_entity(&mut self, id: &RecordId) -> usize {
        let before = self.items.len();
        self.items.retain(|item| &item.id != id);
        before - self.items.len()
    }

    /// Returns true if the entity has a pending item.
    #[must_use]
    pub fn contains_entity(&self, id: &RecordId) -> bool {
        self.items.iter().any(|item| &item.id == id)
    }

    /// Returns the number of pending items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if no items are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
