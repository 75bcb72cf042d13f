//! RelationTable port - one index table of the relation store.
//!
//! Each relation (`Requires`, `WaitsOn`) lives in its own table. Rows are
//! partitioned by task id so all rows of a task are colocated and can be
//! enumerated with a partition scan.
//!
//! # Consistency
//! - Writes to the two tables are independent; no cross-table atomicity.
//! - Rows past their expiry may disappear at any time.

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::{Continuation, RelationKey, RelationRow, ScanPage, TaskId, TetherError};

#[async_trait]
pub trait RelationTable: Send + Sync {
    /// Table name, for logs.
    fn name(&self) -> &str;

    /// Create or overwrite a row. Never fails because the row exists.
    async fn upsert(&self, row: RelationRow) -> Result<(), TetherError>;

    /// Delete a row; returns whether a row was actually removed.
    async fn delete_if_exists(&self, key: &RelationKey) -> Result<bool, TetherError>;

    /// Return at most `limit` rows of `partition`, starting after
    /// `continuation` when given.
    async fn scan(
        &self,
        partition: &TaskId,
        limit: usize,
        continuation: Option<&Continuation>,
    ) -> Result<ScanPage, TetherError>;
}

/// The two tables of the relation store.
#[derive(Clone)]
pub struct Relations {
    pub requires: Arc<dyn RelationTable>,
    pub waits_on: Arc<dyn RelationTable>,
}

impl Relations {
    pub fn new(requires: Arc<dyn RelationTable>, waits_on: Arc<dyn RelationTable>) -> Self {
        Self { requires, waits_on }
    }
}
