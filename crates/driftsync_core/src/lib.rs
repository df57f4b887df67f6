//! # driftsync core
//!
//! Data model and conflict arithmetic for the driftsync engine.
//!
//! This crate provides:
//! - `Record` and the logical timestamp/identity types
//! - `SyncQueue` for pending local mutations
//! - `ConflictStore` for detected-but-unresolved divergences
//! - Watermark-based conflict detection
//! - The four resolution strategies
//!
//! This is a pure data crate with no I/O; the orchestrating state
//! machine lives in `driftsync_engine`.
//!
//! ## Key invariants
//!
//! - The queue drains FIFO, preserving causal order of sequential edits
//! - An entity appears at most once in the conflict store
//! - Detection compares logical timestamps against the sync watermark,
//!   never against wall-clock time
//! - Resolution is deterministic for a given strategy and input pair

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod detect;
mod queue;
mod record;
mod resolve;

pub use conflict::{ConflictId, ConflictKind, ConflictRecord, ConflictStore};
pub use detect::divergent;
pub use queue::{SyncQueue, SyncQueueItem};
pub use record::{Operation, Record, RecordId, Timestamp};
pub use resolve::{
    auto_merge, first_write_wins, last_write_wins, resolve, Resolution, ResolutionDecision,
    ResolutionStrategy,
};
