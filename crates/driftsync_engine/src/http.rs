//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so different
//! implementations (reqwest, hyper, ureq, a platform webview bridge)
//! can be plugged in without this crate taking a network dependency.

use crate::error::{SyncError, SyncResult};
use crate::transport::{SendOutcome, Transport};
use driftsync_core::{Operation, Record, SyncQueueItem, Timestamp};
use serde::{Deserialize, Serialize};

/// HTTP client abstraction.
///
/// Implementations own connection management and the per-request
/// timeout; a timed-out request should surface as an `Err`.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request with a JSON body and returns the response
    /// body.
    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;
}

/// Wire form of an uploaded mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PushBody {
    record: Record,
    operation: Operation,
    queued_at: Timestamp,
}

/// Wire form of the remote authority's answer to an upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
enum PushReply {
    Accepted,
    Conflict { remote: Record },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PullBody {
    since: Timestamp,
    limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PullReply {
    records: Vec<Record>,
}

/// JSON-over-HTTP sync transport.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a transport against `base_url`
    /// (e.g. `https://sync.example.com`).
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> SyncResult<R> {
        let url = format!("{}{path}", self.base_url);
        let encoded = serde_json::to_vec(body)
            .map_err(|e| SyncError::transport_fatal(format!("encode request: {e}")))?;
        let response = self
            .client
            .post(&url, encoded)
            .map_err(SyncError::transport_retryable)?;
        serde_json::from_slice(&response)
            .map_err(|e| SyncError::transport_fatal(format!("decode response: {e}")))
    }
}

impl<C: HttpClient> Transport for HttpTransport<C> {
    fn send(&self, item: &SyncQueueItem) -> SyncResult<SendOutcome> {
        let body = PushBody {
            record: item.record.clone(),
            operation: item.operation,
            queued_at: item.queued_at,
        };
        let reply: PushReply = self.post("/sync/push", &body)?;
        Ok(match reply {
            PushReply::Accepted => SendOutcome::Accepted,
            PushReply::Conflict { remote } => SendOutcome::Conflict { remote },
        })
    }

    fn fetch(&self, since: Timestamp, limit: usize) -> SyncResult<Vec<Record>> {
        let reply: PullReply = self.post("/sync/pull", &PullBody { since, limit })?;
        Ok(reply.records)
    }
}
