//! CompletionPropagator - reacts to task-completed events.
//!
//! Walks `WaitsOn(completed, *)` page by page. For every waiting task:
//! 1. delete `Requires(dependent, completed)`
//! 2. ask the gate about `dependent`
//! 3. delete the `WaitsOn` row itself
//!
//! Rows are independent. A failing row is logged and counted, the walk goes
//! on, and the event only fails after the whole partition was visited.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{Continuation, RelationKey, RelationRow, TaskId, TetherError};
use crate::ports::Relations;

use super::gate::{GateDecision, SchedulingGate};

/// Upper bound on rows fetched per page, whatever the parallelism.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Summary of one completion walk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationReport {
    pub dependents: usize,
    pub scheduled: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct CompletionPropagator {
    relations: Relations,
    gate: SchedulingGate,
    parallelism: usize,
}

impl CompletionPropagator {
    pub fn new(relations: Relations, gate: SchedulingGate, parallelism: usize) -> Self {
        Self {
            relations,
            gate,
            parallelism: parallelism.max(1),
        }
    }

    fn page_size(&self) -> usize {
        self.parallelism.min(MAX_PAGE_SIZE)
    }

    pub async fn on_task_completed(&self, task_id: &TaskId) -> Result<PropagationReport, TetherError> {
        debug!(task_id = %task_id, "task is completed");
        let mut report = PropagationReport::default();
        let mut continuation: Option<Continuation> = None;

        loop {
            let page = self
                .relations
                .waits_on
                .scan(task_id, self.page_size(), continuation.as_ref())
                .await?;

            let results: Vec<(TaskId, Result<GateDecision, TetherError>)> = stream::iter(page.rows)
                .map(|row| async move {
                    let dependent = row.row.clone();
                    (dependent, self.release(task_id, row).await)
                })
                .buffer_unordered(self.parallelism)
                .collect()
                .await;

            for (dependent, result) in results {
                report.dependents += 1;
                match result {
                    Ok(GateDecision::Scheduled) => report.scheduled += 1,
                    Ok(_) => {}
                    Err(err) => {
                        report.failed += 1;
                        warn!(
                            task_id = %task_id,
                            dependent_task_id = %dependent,
                            error = %err,
                            "failed to release dependent task"
                        );
                    }
                }
            }

            match page.continuation {
                Some(next) => continuation = Some(next),
                None => break,
            }
        }

        if report.failed > 0 {
            return Err(TetherError::FanOut {
                failed: report.failed,
                total: report.dependents,
            });
        }
        Ok(report)
    }

    async fn release(&self, task_id: &TaskId, row: RelationRow) -> Result<GateDecision, TetherError> {
        let dependent = row.row.clone();
        debug!(
            task_id = %task_id,
            dependent_task_id = %dependent,
            "removing completed task as requirement"
        );
        self.relations
            .requires
            .delete_if_exists(&RelationKey::new(dependent.clone(), task_id.clone()))
            .await?;

        let decision = self.gate.schedule_if_ready(&dependent).await?;

        // the inverse row has served its purpose
        self.relations.waits_on.delete_if_exists(&row.key()).await?;
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::readiness::ReadinessOracle;
    use crate::domain::TaskDefinition;
    use crate::impls::{InMemoryRelationTable, InMemoryTaskService};
    use crate::ports::RelationTable;
    use chrono::{Duration, Utc};
    use rstest::rstest;

    struct Fixture {
        service: Arc<InMemoryTaskService>,
        requires: Arc<InMemoryRelationTable>,
        waits_on: Arc<InMemoryRelationTable>,
        propagator: CompletionPropagator,
    }

    fn fixture(parallelism: usize) -> Fixture {
        let service = Arc::new(InMemoryTaskService::new());
        let requires = Arc::new(InMemoryRelationTable::new("RequiredTasks"));
        let waits_on = Arc::new(InMemoryRelationTable::new("DependentTasks"));
        let relations = Relations::new(requires.clone(), waits_on.clone());
        let gate = SchedulingGate::new(ReadinessOracle::new(requires.clone()), service.clone());
        Fixture {
            service,
            requires,
            waits_on,
            propagator: CompletionPropagator::new(relations, gate, parallelism),
        }
    }

    async fn link(f: &Fixture, dependent: &TaskId, required: &TaskId) {
        let expires = Utc::now() + Duration::minutes(3);
        f.requires
            .upsert(RelationRow::requires(dependent.clone(), required.clone(), expires))
            .await
            .unwrap();
        f.waits_on
            .upsert(RelationRow::waits_on(required.clone(), dependent.clone(), expires))
            .await
            .unwrap();
    }

    #[rstest]
    #[case::single_page(16)]
    #[case::many_pages(2)]
    #[case::one_by_one(1)]
    #[tokio::test]
    async fn releases_every_dependent(#[case] parallelism: usize) {
        let f = fixture(parallelism);
        let done = TaskId::generate();
        let dependents: Vec<TaskId> = (0..7).map(|_| TaskId::generate()).collect();
        for dependent in &dependents {
            f.service
                .define(dependent, TaskDefinition::new(Utc::now() + Duration::minutes(3)))
                .unwrap();
            link(&f, dependent, &done).await;
        }

        let report = f.propagator.on_task_completed(&done).await.unwrap();
        assert_eq!(report.dependents, 7);
        assert_eq!(report.scheduled, 7);
        assert!(f.requires.is_empty().unwrap());
        assert!(f.waits_on.is_empty().unwrap());
        for dependent in &dependents {
            assert!(f.service.is_scheduled(dependent).unwrap());
        }
    }

    #[tokio::test]
    async fn dependent_with_other_requirements_stays_blocked() {
        let f = fixture(4);
        let (a, b, c) = (TaskId::generate(), TaskId::generate(), TaskId::generate());
        f.service
            .define(&c, TaskDefinition::new(Utc::now() + Duration::minutes(3)))
            .unwrap();
        link(&f, &c, &a).await;
        link(&f, &c, &b).await;

        let report = f.propagator.on_task_completed(&a).await.unwrap();
        assert_eq!(report.scheduled, 0);
        assert!(!f.service.is_scheduled(&c).unwrap());
        assert!(f.requires.contains(&RelationKey::new(c.clone(), b.clone())).unwrap());
        assert!(f.waits_on.contains(&RelationKey::new(b.clone(), c.clone())).unwrap());

        let report = f.propagator.on_task_completed(&b).await.unwrap();
        assert_eq!(report.scheduled, 1);
        assert!(f.service.is_scheduled(&c).unwrap());
    }

    #[tokio::test]
    async fn completion_without_dependents_is_a_no_op() {
        let f = fixture(4);
        let report = f.propagator.on_task_completed(&TaskId::generate()).await.unwrap();
        assert_eq!(report, PropagationReport::default());
    }

    #[tokio::test]
    async fn duplicate_completion_event_is_harmless() {
        let f = fixture(4);
        let (a, c) = (TaskId::generate(), TaskId::generate());
        f.service
            .define(&c, TaskDefinition::new(Utc::now() + Duration::minutes(3)))
            .unwrap();
        link(&f, &c, &a).await;

        f.propagator.on_task_completed(&a).await.unwrap();
        let again = f.propagator.on_task_completed(&a).await.unwrap();
        assert_eq!(again.dependents, 0);
        assert_eq!(f.service.schedule_calls(&c).unwrap(), 1);
    }

    #[test]
    fn page_size_is_capped() {
        let f = fixture(5000);
        assert_eq!(f.propagator.page_size(), MAX_PAGE_SIZE);
    }
}
