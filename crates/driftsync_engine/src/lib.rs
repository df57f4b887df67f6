//! # driftsync engine
//!
//! Offline-first bidirectional sync engine.
//!
//! This crate provides:
//! - `SyncCoordinator`, the single-flight sync state machine
//! - Upload and download phases with watermark-based conflict detection
//! - Retry scheduling with exponential backoff
//! - Deadline-based debounce/interval triggers driven by `tick`
//! - Collaborator traits for storage, transport, and the clock
//!
//! ## Architecture
//!
//! The engine implements an **upload-then-download** cycle:
//! 1. Drain queued local mutations to the remote authority
//! 2. Pull remote changes since the sync watermark
//! 3. Route detected conflicts through the configured strategy
//!
//! ## Key invariants
//!
//! - At most one sync cycle executes at a time; concurrent callers are
//!   coalesced into one pending re-run
//! - The engine always returns to `Idle`, even when a cycle fails
//! - The watermark is monotonic except via explicit reset
//! - An upload item is attempted at most `max_retries` times
//! - Policy-denied writes are logged and skipped, never retried

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod config;
mod coordinator;
mod error;
mod http;
mod report;
mod scheduler;
mod storage;
mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SyncConfig;
pub use coordinator::SyncCoordinator;
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpTransport};
pub use report::{
    ItemError, ItemErrorKind, PhaseReport, SyncDirection, SyncOptions, SyncReport, SyncState,
    SyncStats,
};
pub use scheduler::{DueTask, SyncTrigger, TaskScheduler};
pub use storage::{MemoryStorage, Storage, StorageError};
pub use transport::{MockTransport, SendOutcome, Transport};
