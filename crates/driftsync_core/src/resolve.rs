//! Conflict resolution strategies.

use crate::conflict::ConflictRecord;
use crate::record::{Record, Timestamp};
use serde::{Deserialize, Serialize};

/// How conflicts are resolved, selected globally or per sync call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// The record with the greater `updated_at` wins; remote wins ties.
    LastWriteWins,
    /// The record with the lesser `updated_at` wins; remote wins ties.
    FirstWriteWins,
    /// Deterministic field-by-field union; see [`auto_merge`].
    AutoMerge,
    /// Defer to an explicit per-conflict decision.
    #[default]
    UserGuided,
}

impl ResolutionStrategy {
    /// Returns true if this strategy resolves conflicts without a
    /// per-conflict decision.
    #[must_use]
    pub fn auto_resolves(&self) -> bool {
        !matches!(self, ResolutionStrategy::UserGuided)
    }
}

/// An explicit decision for a deferred conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionDecision {
    /// Keep the local copy.
    UseLocal,
    /// Accept the remote copy.
    UseRemote,
    /// Apply [`auto_merge`] to the pair.
    MergeAuto,
    /// Apply a caller-supplied replacement record.
    UseCustom,
}

/// Outcome of applying a strategy to a conflict.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The strategy produced a single winning record.
    Resolved(Record),
    /// The strategy defers to a later explicit decision.
    Deferred,
}

/// Applies a resolution strategy to a conflict.
///
/// `now` stamps the merged record when the strategy is
/// [`ResolutionStrategy::AutoMerge`]; the other strategies ignore it.
#[must_use]
pub fn resolve(strategy: ResolutionStrategy, conflict: &ConflictRecord, now: Timestamp) -> Resolution {
    match strategy {
        ResolutionStrategy::LastWriteWins => {
            Resolution::Resolved(last_write_wins(&conflict.local, &conflict.remote))
        }
        ResolutionStrategy::FirstWriteWins => {
            Resolution::Resolved(first_write_wins(&conflict.local, &conflict.remote))
        }
        ResolutionStrategy::AutoMerge => {
            Resolution::Resolved(auto_merge(&conflict.local, &conflict.remote, now))
        }
        ResolutionStrategy::UserGuided => Resolution::Deferred,
    }
}

/// Picks the record with the greater `updated_at`; remote wins ties.
#[must_use]
pub fn last_write_wins(local: &Record, remote: &Record) -> Record {
    if local.updated_at > remote.updated_at {
        local.clone()
    } else {
        remote.clone()
    }
}

/// Picks the record with the lesser `updated_at`; remote wins ties.
#[must_use]
pub fn first_write_wins(local: &Record, remote: &Record) -> Record {
    if local.updated_at < remote.updated_at {
        local.clone()
    } else {
        remote.clone()
    }
}

/// Deterministic field-by-field union of a local/remote pair.
///
/// Every field present in the remote record takes the remote value,
/// whether the local value is absent, null, or populated; fields only
/// the local side has are kept. `created_at` keeps the later of the two
/// timestamps. The merged record's `updated_at` is reset to `now`,
/// marking it as a new, locally-authored version.
///
/// This is not a three-way merge and arrays are not unioned.
#[must_use]
pub fn auto_merge(local: &Record, remote: &Record, now: Timestamp) -> Record {
    let mut merged = local.clone();

    for (name, value) in &remote.fields {
        merged.fields.insert(name.clone(), value.clone());
    }

    merged.created_at = match (local.created_at, remote.created_at) {
        (Some(ours), Some(theirs)) => Some(ours.later(theirs)),
        (ours, theirs) => ours.or(theirs),
    };
    merged.updated_at = now;
    merged
}
