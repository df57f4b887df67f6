//! Local record store abstraction.

use driftsync_core::{Record, RecordId};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Errors reported by the storage collaborator.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The security/classification layer rejected the write. Distinct
    /// from backend failures: the engine logs and skips these, never
    /// retries them.
    #[error("policy denied: {message}")]
    PolicyDenied {
        /// Denial reason reported by the policy layer.
        message: String,
    },

    /// Any other backend failure.
    #[error("storage backend error: {message}")]
    Backend {
        /// Error message.
        message: String,
    },
}

impl StorageError {
    /// Creates a policy-denial error.
    pub fn policy_denied(message: impl Into<String>) -> Self {
        Self::PolicyDenied {
            message: message.into(),
        }
    }

    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// The persistent local record store.
///
/// The engine requires, but does not implement, this collaborator.
/// `kind` selects the logical store (collection) a record lives in.
pub trait Storage: Send + Sync {
    /// Looks up a record by identity.
    fn get(&self, kind: &str, id: &RecordId) -> Result<Option<Record>, StorageError>;

    /// Writes a record, overwriting any existing copy.
    fn put(&self, kind: &str, record: &Record) -> Result<(), StorageError>;

    /// Removes a record. Removing a missing record is not an error.
    fn delete(&self, kind: &str, id: &RecordId) -> Result<(), StorageError>;
}

/// An in-memory store for tests, with per-entity policy-denial
/// injection standing in for the external security layer.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: RwLock<HashMap<(String, String), Record>>,
    denied: RwLock<HashSet<String>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an entity so that writes to it are policy-denied.
    pub fn deny_writes_for(&self, id: &RecordId) {
        self.denied.write().insert(id.as_str().to_owned());
    }

    /// Lifts a previously injected denial.
    pub fn allow_writes_for(&self, id: &RecordId) {
        self.denied.write().remove(id.as_str());
    }

    /// Returns the number of stored records across all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if no records are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, kind: &str, id: &RecordId) -> Result<Option<Record>, StorageError> {
        Ok(self
            .records
            .read()
            .get(&(kind.to_owned(), id.as_str().to_owned()))
            .cloned())
    }

    fn put(&self, kind: &str, record: &Record) -> Result<(), StorageError> {
        if self.denied.read().contains(record.id.as_str()) {
            return Err(StorageError::policy_denied(format!(
                "write to {} rejected",
                record.id
            )));
        }
        self.records.write().insert(
            (kind.to_owned(), record.id.as_str().to_owned()),
            record.clone(),
        );
        Ok(())
    }

    fn delete(&self, kind: &str, id: &RecordId) -> Result<(), StorageError> {
        if self.denied.read().contains(id.as_str()) {
            return Err(StorageError::policy_denied(format!(
                "delete of {id} rejected"
            )));
        }
        self.records
            .write()
            .remove(&(kind.to_owned(), id.as_str().to_owned()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftsync_core::Timestamp;

    #[test]
    fn put_get_delete() {
        let storage = MemoryStorage::new();
        let record = Record::new("a", Timestamp::new(1));

        storage.put("notes", &record).unwrap();
        assert_eq!(
            storage.get("notes", &RecordId::from("a")).unwrap(),
            Some(record)
        );

        // Kinds are separate namespaces.
        assert_eq!(storage.get("tasks", &RecordId::from("a")).unwrap(), None);

        storage.delete("notes", &RecordId::from("a")).unwrap();
        assert_eq!(storage.get("notes", &RecordId::from("a")).unwrap(), None);
    }

    #[test]
    fn injected_denial_rejects_writes_only() {
        let storage = MemoryStorage::new();
        let id = RecordId::from("secret");
        storage.deny_writes_for(&id);

        let record = Record::new("secret", Timestamp::new(1));
        let err = storage.put("notes", &record).unwrap_err();
        assert!(matches!(err, StorageError::PolicyDenied { .. }));

        // Reads are unaffected.
        assert_eq!(storage.get("notes", &id).unwrap(), None);

        storage.allow_writes_for(&id);
        storage.put("notes", &record).unwrap();
    }
}
