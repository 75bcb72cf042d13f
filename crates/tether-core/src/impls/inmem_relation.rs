//! InMemoryRelationTable - development / test relation table.
//!
//! # Implementation
//! - `BTreeMap<partition, BTreeMap<row, expires>>`, so scans come back in
//!   row order and a continuation is simply "the last row returned"
//! - Rows past their expiry (per `Clock`) are invisible; `purge_expired`
//!   physically removes them, like the store's own expiry sweep
//! - `std::sync::Mutex`, never held across an await

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::{Continuation, RelationKey, RelationRow, ScanPage, TaskId, TetherError};
use crate::ports::{Clock, RelationTable, SystemClock};

type Partitions = BTreeMap<TaskId, BTreeMap<TaskId, DateTime<Utc>>>;

pub struct InMemoryRelationTable {
    name: String,
    partitions: Mutex<Partitions>,
    clock: Arc<dyn Clock>,
}

impl InMemoryRelationTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_clock(name, Arc::new(SystemClock))
    }

    pub fn with_clock(name: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            name: name.into(),
            partitions: Mutex::new(BTreeMap::new()),
            clock,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Partitions>, TetherError> {
        self.partitions
            .lock()
            .map_err(|e| TetherError::store(&self.name, format!("lock poisoned: {e}")))
    }

    /// Remove every expired row; returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize, TetherError> {
        let now = self.clock.now();
        let mut partitions = self.lock()?;
        let mut purged = 0;
        partitions.retain(|_, rows| {
            let before = rows.len();
            rows.retain(|_, expires| *expires > now);
            purged += before - rows.len();
            !rows.is_empty()
        });
        Ok(purged)
    }

    /// All live rows, in key order (for assertions).
    pub fn rows(&self) -> Result<Vec<RelationRow>, TetherError> {
        let now = self.clock.now();
        let partitions = self.lock()?;
        Ok(partitions
            .iter()
            .flat_map(|(partition, rows)| {
                rows.iter().map(move |(row, expires)| RelationRow {
                    partition: partition.clone(),
                    row: row.clone(),
                    expires: *expires,
                })
            })
            .filter(|row| !row.is_expired(now))
            .collect())
    }

    pub fn contains(&self, key: &RelationKey) -> Result<bool, TetherError> {
        let now = self.clock.now();
        let partitions = self.lock()?;
        Ok(partitions
            .get(&key.partition)
            .and_then(|rows| rows.get(&key.row))
            .is_some_and(|expires| *expires > now))
    }

    pub fn len(&self) -> Result<usize, TetherError> {
        Ok(self.rows()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, TetherError> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl RelationTable for InMemoryRelationTable {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(&self, row: RelationRow) -> Result<(), TetherError> {
        let mut partitions = self.lock()?;
        partitions
            .entry(row.partition)
            .or_default()
            .insert(row.row, row.expires);
        Ok(())
    }

    async fn delete_if_exists(&self, key: &RelationKey) -> Result<bool, TetherError> {
        let now = self.clock.now();
        let mut partitions = self.lock()?;
        let Some(rows) = partitions.get_mut(&key.partition) else {
            return Ok(false);
        };
        let removed = rows.remove(&key.row);
        if rows.is_empty() {
            partitions.remove(&key.partition);
        }
        // an expired row is already gone as far as callers can tell
        Ok(removed.is_some_and(|expires| expires > now))
    }

    async fn scan(
        &self,
        partition: &TaskId,
        limit: usize,
        continuation: Option<&Continuation>,
    ) -> Result<ScanPage, TetherError> {
        let now = self.clock.now();
        let partitions = self.lock()?;
        let Some(rows) = partitions.get(partition) else {
            return Ok(ScanPage::default());
        };

        let start = match continuation {
            Some(Continuation(after)) => {
                let after = TaskId::parse(after).map_err(|e| {
                    TetherError::store(&self.name, format!("bad continuation: {e}"))
                })?;
                Bound::Excluded(after)
            }
            None => Bound::Unbounded,
        };

        let mut live = rows
            .range((start, Bound::Unbounded))
            .filter(|(_, expires)| **expires > now)
            .map(|(row, expires)| RelationRow {
                partition: partition.clone(),
                row: row.clone(),
                expires: *expires,
            });

        let page: Vec<RelationRow> = live.by_ref().take(limit).collect();
        let continuation = match (page.last(), live.next()) {
            (Some(last), Some(_)) => Some(Continuation(last.row.to_string())),
            _ => None,
        };
        Ok(ScanPage {
            rows: page,
            continuation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use chrono::{Duration, TimeZone};

    fn clock() -> Arc<FixedClock> {
        Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        ))
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let clock = clock();
        let table = InMemoryRelationTable::with_clock("RequiredTasks", clock.clone());
        let (a, b) = (TaskId::generate(), TaskId::generate());
        let expires = clock.now() + Duration::minutes(3);

        table.upsert(RelationRow::requires(a.clone(), b.clone(), expires)).await.unwrap();
        table.upsert(RelationRow::requires(a.clone(), b.clone(), expires)).await.unwrap();

        assert_eq!(table.len().unwrap(), 1);
        assert!(table.contains(&RelationKey::new(a, b)).unwrap());
    }

    #[tokio::test]
    async fn delete_reports_first_observer_only() {
        let table = InMemoryRelationTable::new("RequiredTasks");
        let (a, b) = (TaskId::generate(), TaskId::generate());
        let key = RelationKey::new(a.clone(), b.clone());
        table
            .upsert(RelationRow::requires(a, b, Utc::now() + Duration::minutes(3)))
            .await
            .unwrap();

        assert!(table.delete_if_exists(&key).await.unwrap());
        assert!(!table.delete_if_exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn scan_pages_through_partition() {
        let clock = clock();
        let table = InMemoryRelationTable::with_clock("DependentTasks", clock.clone());
        let task = TaskId::generate();
        let expires = clock.now() + Duration::minutes(3);
        for _ in 0..5 {
            table
                .upsert(RelationRow::waits_on(task.clone(), TaskId::generate(), expires))
                .await
                .unwrap();
        }
        // another partition must not leak into the scan
        table
            .upsert(RelationRow::waits_on(TaskId::generate(), TaskId::generate(), expires))
            .await
            .unwrap();

        let mut seen = Vec::new();
        let mut continuation = None;
        loop {
            let page = table.scan(&task, 2, continuation.as_ref()).await.unwrap();
            assert!(page.rows.len() <= 2);
            seen.extend(page.rows.into_iter().map(|r| r.row));
            match page.continuation {
                Some(c) => continuation = Some(c),
                None => break,
            }
        }
        assert_eq!(seen.len(), 5);
        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(seen, sorted);
    }

    #[tokio::test]
    async fn scan_last_page_has_no_continuation() {
        let table = InMemoryRelationTable::new("DependentTasks");
        let task = TaskId::generate();
        table
            .upsert(RelationRow::waits_on(task.clone(), TaskId::generate(), Utc::now() + Duration::minutes(3)))
            .await
            .unwrap();

        let page = table.scan(&task, 1, None).await.unwrap();
        assert_eq!(page.rows.len(), 1);
        assert!(page.continuation.is_none());
    }

    #[tokio::test]
    async fn expired_rows_are_invisible_and_purgeable() {
        let clock = clock();
        let table = InMemoryRelationTable::with_clock("RequiredTasks", clock.clone());
        let (a, b) = (TaskId::generate(), TaskId::generate());
        table
            .upsert(RelationRow::requires(a.clone(), b.clone(), clock.now() + Duration::minutes(3)))
            .await
            .unwrap();

        clock.advance(Duration::minutes(4));

        assert!(table.scan(&a, 1, None).await.unwrap().is_empty());
        assert!(!table.contains(&RelationKey::new(a.clone(), b.clone())).unwrap());
        assert_eq!(table.purge_expired().unwrap(), 1);
        assert!(!table.delete_if_exists(&RelationKey::new(a, b)).await.unwrap());
    }
}
