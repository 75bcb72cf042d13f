//! Relation rows - the persisted dependency edges.
//!
//! Two tables hold the same edges indexed from both ends:
//! - `Requires`: partition = task, row = the task it requires
//! - `WaitsOn`: partition = task, row = a task waiting for it
//!
//! Invariant: `Requires(A, B)` is written together with `WaitsOn(B, A)`, with
//! the same expiry (the deadline of A).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;

/// Unique key of a row: (partition, row).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationKey {
    pub partition: TaskId,
    pub row: TaskId,
}

impl RelationKey {
    pub fn new(partition: TaskId, row: TaskId) -> Self {
        Self { partition, row }
    }
}

/// A single persisted fact: "partition requires / is waited on by row,
/// until `expires`".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRow {
    pub partition: TaskId,
    pub row: TaskId,
    pub expires: DateTime<Utc>,
}

impl RelationRow {
    /// `Requires(task, required)`.
    pub fn requires(task: TaskId, required: TaskId, expires: DateTime<Utc>) -> Self {
        Self {
            partition: task,
            row: required,
            expires,
        }
    }

    /// `WaitsOn(required, dependent)`.
    pub fn waits_on(required: TaskId, dependent: TaskId, expires: DateTime<Utc>) -> Self {
        Self {
            partition: required,
            row: dependent,
            expires,
        }
    }

    pub fn key(&self) -> RelationKey {
        RelationKey::new(self.partition.clone(), self.row.clone())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }
}

/// Opaque marker telling the caller more rows may follow a scan page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Continuation(pub String);

/// One page of a partition scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub rows: Vec<RelationRow>,
    pub continuation: Option<Continuation>,
}

impl ScanPage {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
