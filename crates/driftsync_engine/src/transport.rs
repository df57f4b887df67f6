//! Transport layer abstraction for the remote authority.

use crate::error::{SyncError, SyncResult};
use driftsync_core::{Record, SyncQueueItem, Timestamp};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// The remote authority's answer to an uploaded mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// The mutation was accepted and persisted.
    Accepted,
    /// The remote holds a newer or different version; the upload was
    /// rejected and the remote copy is returned for reconciliation.
    Conflict {
        /// The remote's current version of the record.
        remote: Record,
    },
}

/// Network communication with the remote authority.
///
/// This trait abstracts the wire layer, allowing different
/// implementations (HTTP, WebSocket, mock for testing, etc.).
/// Implementations own the per-operation timeout; a timed-out call
/// returns [`SyncError::Timeout`] and is handled like any other
/// transport failure.
pub trait Transport: Send + Sync {
    /// Uploads a single queued mutation.
    fn send(&self, item: &SyncQueueItem) -> SyncResult<SendOutcome>;

    /// Fetches up to `limit` remote records changed since `since`.
    fn fetch(&self, since: Timestamp, limit: usize) -> SyncResult<Vec<Record>>;
}

/// A scriptable transport for tests.
#[derive(Debug, Default)]
pub struct MockTransport {
    /// Entities whose uploads the "server" answers with a conflict.
    conflicts: Mutex<HashMap<String, Record>>,
    /// Remote records served by `fetch`, filtered by `since`.
    remote_records: Mutex<Vec<Record>>,
    /// Fail this many upcoming `send` calls with a retryable error.
    failing_sends: AtomicU32,
    /// Fail every `fetch` call with a retryable error.
    failing_fetch: AtomicBool,
    /// Log of every item passed to `send`.
    sent: Mutex<Vec<SyncQueueItem>>,
}

impl MockTransport {
    /// Creates a transport that accepts every upload and serves no
    /// remote records.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers uploads of `remote.id` with a conflict carrying `remote`.
    pub fn set_conflict(&self, remote: Record) {
        self.conflicts
            .lock()
            .insert(remote.id.as_str().to_owned(), remote);
    }

    /// Serves `records` from subsequent `fetch` calls.
    pub fn set_remote_records(&self, records: Vec<Record>) {
        *self.remote_records.lock() = records;
    }

    /// Fails the next `count` send calls with a retryable error.
    pub fn fail_sends(&self, count: u32) {
        self.failing_sends.store(count, Ordering::SeqCst);
    }

    /// Makes every fetch call fail with a retryable error.
    pub fn fail_fetch(&self, failing: bool) {
        self.failing_fetch.store(failing, Ordering::SeqCst);
    }

    /// Returns every item passed to `send`, in call order.
    #[must_use]
    pub fn sent_items(&self) -> Vec<SyncQueueItem> {
        self.sent.lock().clone()
    }
}

impl Transport for MockTransport {
    fn send(&self, item: &SyncQueueItem) -> SyncResult<SendOutcome> {
        self.sent.lock().push(item.clone());

        let remaining = self.failing_sends.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_sends.store(remaining - 1, Ordering::SeqCst);
            return Err(SyncError::transport_retryable("connection reset"));
        }

        if let Some(remote) = self.conflicts.lock().get(item.id.as_str()) {
            return Ok(SendOutcome::Conflict {
                remote: remote.clone(),
            });
        }
        Ok(SendOutcome::Accepted)
    }

    fn fetch(&self, since: Timestamp, limit: usize) -> SyncResult<Vec<Record>> {
        if self.failing_fetch.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("remote unreachable"));
        }
        Ok(self
            .remote_records
            .lock()
            .iter()
            .filter(|record| record.updated_at > since)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_core::Operation;

    fn make_item(id: &str) -> SyncQueueItem {
        SyncQueueItem::new(
            Record::new(id, Timestamp::new(10)),
            Operation::Upsert,
            Timestamp::new(10),
        )
    }

    #[test]
    fn accepts_by_default() {
        let transport = MockTransport::new();
        let outcome = transport.send(&make_item("a")).unwrap();
        assert_eq!(outcome, SendOutcome::Accepted);
        assert_eq!(transport.sent_items().len(), 1);
    }

    #[test]
    fn scripted_conflict_returns_remote_copy() {
        let transport = MockTransport::new();
        transport.set_conflict(Record::new("a", Timestamp::new(99)));

        match transport.send(&make_item("a")).unwrap() {
            SendOutcome::Conflict { remote } => {
                assert_eq!(remote.updated_at, Timestamp::new(99));
            }
            SendOutcome::Accepted => panic!("expected a conflict"),
        }
    }

    #[test]
    fn failing_sends_are_consumed() {
        let transport = MockTransport::new();
        transport.fail_sends(1);

        assert!(transport.send(&make_item("a")).is_err());
        assert!(transport.send(&make_item("a")).is_ok());
    }

    #[test]
    fn fetch_filters_by_watermark_and_limit() {
        let transport = MockTransport::new();
        transport.set_remote_records(vec![
            Record::new("a", Timestamp::new(10)),
            Record::new("b", Timestamp::new(20)),
            Record::new("c", Timestamp::new(30)),
        ]);

        let records = transport.fetch(Timestamp::new(10), 10).unwrap();
        assert_eq!(records.len(), 2);

        let records = transport.fetch(Timestamp::new(0), 1).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id.as_str(), "a");
    }
}
