//! Watermark-based divergence detection.

use crate::record::{Record, Timestamp};

/// Returns true iff the local and remote copies of a record diverge.
///
/// A conflict exists iff the local copy was modified after `watermark`
/// (the last point the remote is known to have agreed with us) and the
/// two timestamps now disagree. Simultaneous agreement is not a
/// conflict, even if both sides changed: there is nothing to reconcile.
#[must_use]
pub fn divergent(local: &Record, remote: &Record, watermark: Timestamp) -> bool {
    local.updated_at > watermark && local.updated_at != remote.updated_at
}
