//! Readiness - "does this task still wait on anything?"

use std::sync::Arc;
use tracing::error;

use crate::domain::{TaskId, TetherError};
use crate::ports::RelationTable;

/// Emptiness probe over the `Requires` partition of a task. Never cached.
#[derive(Clone)]
pub struct ReadinessOracle {
    requires: Arc<dyn RelationTable>,
}

impl ReadinessOracle {
    pub fn new(requires: Arc<dyn RelationTable>) -> Self {
        Self { requires }
    }

    /// True iff at least one `Requires(task_id, *)` row exists.
    ///
    /// An empty page with a continuation marker counts as "still waiting".
    pub async fn has_outstanding_dependency(&self, task_id: &TaskId) -> Result<bool, TetherError> {
        let page = self.requires.scan(task_id, 1, None).await?;
        if page.rows.is_empty() && page.continuation.is_some() {
            error!(
                alert = "operator",
                task_id = %task_id,
                table = self.requires.name(),
                continuation = ?page.continuation,
                "received continuation without rows while probing partition emptiness"
            );
            return Ok(true);
        }
        Ok(!page.rows.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Continuation, RelationKey, RelationRow, ScanPage};
    use crate::impls::InMemoryRelationTable;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    /// Always answers with an empty page that claims more rows follow.
    struct ContinuationOnly;

    #[async_trait]
    impl RelationTable for ContinuationOnly {
        fn name(&self) -> &str {
            "ContinuationOnly"
        }
        async fn upsert(&self, _row: RelationRow) -> Result<(), TetherError> {
            Ok(())
        }
        async fn delete_if_exists(&self, _key: &RelationKey) -> Result<bool, TetherError> {
            Ok(false)
        }
        async fn scan(
            &self,
            _partition: &TaskId,
            _limit: usize,
            _continuation: Option<&Continuation>,
        ) -> Result<ScanPage, TetherError> {
            Ok(ScanPage {
                rows: vec![],
                continuation: Some(Continuation("next".into())),
            })
        }
    }

    #[tokio::test]
    async fn reflects_rows_in_requires_partition() {
        let table = Arc::new(InMemoryRelationTable::new("RequiredTasks"));
        let oracle = ReadinessOracle::new(table.clone());
        let (task, required) = (TaskId::generate(), TaskId::generate());

        assert!(!oracle.has_outstanding_dependency(&task).await.unwrap());

        table
            .upsert(RelationRow::requires(task.clone(), required.clone(), Utc::now() + Duration::minutes(3)))
            .await
            .unwrap();
        assert!(oracle.has_outstanding_dependency(&task).await.unwrap());
        // the probe is per partition
        assert!(!oracle.has_outstanding_dependency(&required).await.unwrap());

        table.delete_if_exists(&RelationKey::new(task.clone(), required)).await.unwrap();
        assert!(!oracle.has_outstanding_dependency(&task).await.unwrap());
    }

    #[tokio::test]
    async fn continuation_without_rows_is_not_ready() {
        let oracle = ReadinessOracle::new(Arc::new(ContinuationOnly));
        assert!(oracle.has_outstanding_dependency(&TaskId::generate()).await.unwrap());
    }
}
