//! Record identity and payload types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A logical timestamp in milliseconds since the Unix epoch.
///
/// Timestamps are set by whichever side last wrote the record. They are
/// compared against each other and against the sync watermark, never
/// against wall-clock time on the reading side.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// The zero timestamp (epoch). Used as the initial sync watermark.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Creates a timestamp from milliseconds since the epoch.
    #[must_use]
    pub const fn new(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the raw millisecond value.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Returns the later of two timestamps.
    #[must_use]
    pub const fn later(self, other: Self) -> Self {
        if self.0 >= other.0 {
            self
        } else {
            other
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identity of a logical record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    /// Creates a record ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

/// The mutation kind carried by a queued local edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Create or replace the record.
    Upsert,
    /// Remove the record.
    Delete,
}

/// A replicated record.
///
/// The engine treats records as opaque except for two fields used in
/// conflict arithmetic: `id` (stable identity) and `updated_at` (logical
/// timestamp stamped by the last writer). Everything else lives in the
/// generic `fields` map, which field-level auto-merge iterates without
/// assuming any per-field semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Stable identity.
    pub id: RecordId,
    /// Logical timestamp of the last write.
    pub updated_at: Timestamp,
    /// Logical timestamp of record creation, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    /// Opaque payload fields.
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Creates a record with an empty payload.
    pub fn new(id: impl Into<RecordId>, updated_at: Timestamp) -> Self {
        Self {
            id: id.into(),
            updated_at,
            created_at: None,
            fields: Map::new(),
        }
    }

    /// Sets the creation timestamp.
    #[must_use]
    pub fn with_created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Adds a payload field.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Returns a payload field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
