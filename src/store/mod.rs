//! Record store interface
//!
//! The store provides atomic single-key reads and conditional writes, deletes and
//! query-by-field. Optimistic concurrency is expressed through record versions:
//! every write bumps the version, and a write carrying a stale [`Precondition`]
//! fails with [`StoreError::Conflict`].

pub mod memory;
pub mod transaction;

use std::fmt;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

pub use memory::InMemoryRecordStore;
pub use transaction::{run_in_transaction, TransactionPolicy};

/// Record kinds known to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Item,
    Group,
    User,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::Item => "Item",
            Kind::Group => "Group",
            Kind::User => "User",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of a record being written: either store-assigned or caller-chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKey {
    Incomplete,
    Complete(String),
}

/// Condition a write must satisfy to commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Unconditional write.
    None,
    /// The record must not exist yet.
    Absent,
    /// The record must still be at this version.
    Version(u64),
}

/// A stored record together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub id: String,
    pub version: u64,
    pub body: serde_json::Value,
}

impl Versioned {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: Kind, id: String },

    #[error("concurrent modification of {kind} {id}")]
    Conflict { kind: Kind, id: String },

    #[error("record store unavailable: {message}")]
    Unavailable { message: String },

    #[error("record encoding failed: {0}")]
    Codec(#[from] serde_json::Error),
}

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ───────────────────────────── Reads ─────────────────────────────

    /// Read one record with its current version.
    async fn get(&self, kind: Kind, id: &str) -> Result<Versioned, StoreError>;

    /// All records of `kind` whose top-level `field` equals `value`.
    async fn query_by_field(
        &self,
        kind: Kind,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<Vec<Versioned>, StoreError>;

    /// All records of `kind`.
    async fn list(&self, kind: Kind) -> Result<Vec<Versioned>, StoreError>;

    // ───────────────────────────── Writes ────────────────────────────

    /// Write a record and return its id.
    async fn put(
        &self,
        kind: Kind,
        key: RecordKey,
        body: serde_json::Value,
        precondition: Precondition,
    ) -> Result<String, StoreError>;

    /// Delete a record. Deleting a missing record without a precondition is `NotFound`.
    async fn delete(&self, kind: Kind, id: &str, precondition: Precondition) -> Result<(), StoreError>;
}
