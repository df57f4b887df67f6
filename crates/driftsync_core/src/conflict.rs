//! Detected divergences awaiting a resolution decision.

use crate::record::{Record, RecordId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of a pending conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConflictId(pub Uuid);

impl ConflictId {
    /// Creates a fresh random conflict ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the divergence was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// A downloaded remote record disagreed with a locally-modified copy.
    Update,
    /// The remote authority rejected an upload because it holds a
    /// different version.
    Upload,
}

/// A detected-but-unresolved divergence between a local and remote copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Unique conflict identity.
    pub id: ConflictId,
    /// Identity of the diverged record.
    pub entity_id: RecordId,
    /// Logical collection the record belongs to.
    pub entity_type: String,
    /// How the divergence was discovered.
    pub kind: ConflictKind,
    /// The local copy at detection time.
    pub local: Record,
    /// The remote copy at detection time.
    pub remote: Record,
    /// When the divergence was detected.
    pub detected_at: Timestamp,
}

impl ConflictRecord {
    /// Creates a conflict record for a local/remote pair.
    pub fn new(
        entity_type: impl Into<String>,
        kind: ConflictKind,
        local: Record,
        remote: Record,
        detected_at: Timestamp,
    ) -> Self {
        Self {
            id: ConflictId::generate(),
            entity_id: local.id.clone(),
            entity_type: entity_type.into(),
            kind,
            local,
            remote,
            detected_at,
        }
    }
}

/// Pending conflicts, at most one per entity.
///
/// # Invariants
///
/// - A given `entity_id` appears at most once; a second detection for
///   the same entity replaces the pending entry rather than duplicating
///   it.
/// - Entries leave the store exactly once, through [`ConflictStore::remove`].
#[derive(Debug, Default)]
pub struct ConflictStore {
    entries: Vec<ConflictRecord>,
}

impl ConflictStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Inserts a conflict, replacing any pending entry for the same entity.
    ///
    /// Returns the replaced entry, if there was one.
    pub fn insert(&mut self, conflict: ConflictRecord) -> Option<ConflictRecord> {
        let replaced = self
            .entries
            .iter()
            .position(|entry| entry.entity_id == conflict.entity_id)
            .map(|index| self.entries.remove(index));
        self.entries.push(conflict);
        replaced
    }

    /// Returns the pending conflict with the given ID.
    #[must_use]
    pub fn get(&self, id: &ConflictId) -> Option<&ConflictRecord> {
        self.entries.iter().find(|entry| &entry.id == id)
    }

    /// Removes and returns the conflict with the given ID.
    ///
    /// A second call for the same ID returns `None`.
    pub fn remove(&mut self, id: &ConflictId) -> Option<ConflictRecord> {
        self.entries
            .iter()
            .position(|entry| &entry.id == id)
            .map(|index| self.entries.remove(index))
    }

    /// Returns true if the entity has a pending conflict.
    #[must_use]
    pub fn contains_entity(&self, id: &RecordId) -> bool {
        self.entries.iter().any(|entry| &entry.entity_id == id)
    }

    /// Returns the pending conflicts in detection order.
    #[must_use]
    pub fn pending(&self) -> &[ConflictRecord] {
        &self.entries
    }

    /// Returns the number of pending conflicts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no conflicts are pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_conflict(entity: &str, local_ts: i64, remote_ts: i64) -> ConflictRecord {
        ConflictRecord::new(
            "notes",
            ConflictKind::Update,
            Record::new(entity, Timestamp::new(local_ts)),
            Record::new(entity, Timestamp::new(remote_ts)),
            Timestamp::new(local_ts.max(remote_ts)),
        )
    }

    #[test]
    fn insert_replaces_same_entity() {
        let mut store = ConflictStore::new();

        let first = make_conflict("a", 10, 20);
        let first_id = first.id;
        assert!(store.insert(first).is_none());

        let second = make_conflict("a", 30, 40);
        let replaced = store.insert(second).unwrap();
        assert_eq!(replaced.id, first_id);
        assert_eq!(store.len(), 1);
        assert_eq!(store.pending()[0].local.updated_at, Timestamp::new(30));
    }

    #[test]
    fn distinct_entities_coexist() {
        let mut store = ConflictStore::new();
        store.insert(make_conflict("a", 10, 20));
        store.insert(make_conflict("b", 10, 20));

        assert_eq!(store.len(), 2);
        assert!(store.contains_entity(&RecordId::from("a")));
        assert!(store.contains_entity(&RecordId::from("b")));
    }

    #[test]
    fn remove_is_exactly_once() {
        let mut store = ConflictStore::new();
        let conflict = make_conflict("a", 10, 20);
        let id = conflict.id;
        store.insert(conflict);

        assert!(store.remove(&id).is_some());
        assert!(store.remove(&id).is_none());
        assert!(store.is_empty());
    }
}
