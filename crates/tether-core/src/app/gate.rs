//! SchedulingGate - the only caller of the scheduler endpoint.

use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::{TaskId, TetherError};
use crate::ports::SchedulerEndpoint;

use super::readiness::ReadinessOracle;

/// What the gate did for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Outstanding dependencies remain; nothing was called.
    Blocked,
    /// The schedule call was accepted.
    Scheduled,
    /// The endpoint rejected the call with a 4xx/5xx status, usually because
    /// a concurrent trigger scheduled the task first.
    AlreadyHandled { status: u16 },
}

/// Schedules a task once the readiness oracle says nothing is outstanding.
///
/// Safe to call redundantly: every path that might have unblocked a task
/// funnels through here, and the endpoint's conflict answers are absorbed.
#[derive(Clone)]
pub struct SchedulingGate {
    oracle: ReadinessOracle,
    scheduler: Arc<dyn SchedulerEndpoint>,
}

impl SchedulingGate {
    pub fn new(oracle: ReadinessOracle, scheduler: Arc<dyn SchedulerEndpoint>) -> Self {
        Self { oracle, scheduler }
    }

    pub async fn schedule_if_ready(&self, task_id: &TaskId) -> Result<GateDecision, TetherError> {
        if self.oracle.has_outstanding_dependency(task_id).await? {
            debug!(task_id = %task_id, "task still has outstanding dependencies");
            return Ok(GateDecision::Blocked);
        }

        info!(task_id = %task_id, "scheduling task");
        let err = match self.scheduler.schedule(task_id).await {
            Ok(()) => return Ok(GateDecision::Scheduled),
            Err(err) => err,
        };
        match err.conflict_status() {
            Some(status) => {
                debug!(
                    task_id = %task_id,
                    status,
                    error = %err,
                    "[expected] failed to schedule, task was perhaps already scheduled"
                );
                Ok(GateDecision::AlreadyHandled { status })
            }
            None => Err(TetherError::SchedulerTransport(format!(
                "scheduling {task_id}: {err}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RelationRow, TaskDefinition};
    use crate::impls::{InMemoryRelationTable, InMemoryTaskService};
    use crate::ports::{RelationTable, ScheduleError};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    struct Unreachable;

    #[async_trait]
    impl SchedulerEndpoint for Unreachable {
        async fn schedule(&self, _task_id: &TaskId) -> Result<(), ScheduleError> {
            Err(ScheduleError::Transport("connection reset".into()))
        }
    }

    struct Overloaded;

    #[async_trait]
    impl SchedulerEndpoint for Overloaded {
        async fn schedule(&self, _task_id: &TaskId) -> Result<(), ScheduleError> {
            Err(ScheduleError::Rejected {
                status: 503,
                message: "try later".into(),
            })
        }
    }

    fn gate_with(
        table: Arc<InMemoryRelationTable>,
        scheduler: Arc<dyn SchedulerEndpoint>,
    ) -> SchedulingGate {
        SchedulingGate::new(ReadinessOracle::new(table), scheduler)
    }

    #[tokio::test]
    async fn blocked_task_is_not_scheduled() {
        let table = Arc::new(InMemoryRelationTable::new("RequiredTasks"));
        let service = Arc::new(InMemoryTaskService::new());
        let task = TaskId::generate();
        service.define(&task, TaskDefinition::new(Utc::now() + Duration::minutes(3))).unwrap();
        table
            .upsert(RelationRow::requires(task.clone(), TaskId::generate(), Utc::now() + Duration::minutes(3)))
            .await
            .unwrap();

        let gate = gate_with(table, service.clone());
        assert_eq!(gate.schedule_if_ready(&task).await.unwrap(), GateDecision::Blocked);
        assert_eq!(service.schedule_calls(&task).unwrap(), 0);
    }

    #[tokio::test]
    async fn redundant_calls_never_raise() {
        let table = Arc::new(InMemoryRelationTable::new("RequiredTasks"));
        let service = Arc::new(InMemoryTaskService::new());
        let task = TaskId::generate();
        service.define(&task, TaskDefinition::new(Utc::now() + Duration::minutes(3))).unwrap();

        let gate = gate_with(table, service.clone());
        assert_eq!(gate.schedule_if_ready(&task).await.unwrap(), GateDecision::Scheduled);
        assert_eq!(
            gate.schedule_if_ready(&task).await.unwrap(),
            GateDecision::AlreadyHandled { status: 409 }
        );
        assert!(service.is_scheduled(&task).unwrap());
    }

    #[tokio::test]
    async fn server_errors_are_absorbed() {
        let gate = gate_with(Arc::new(InMemoryRelationTable::new("RequiredTasks")), Arc::new(Overloaded));
        assert_eq!(
            gate.schedule_if_ready(&TaskId::generate()).await.unwrap(),
            GateDecision::AlreadyHandled { status: 503 }
        );
    }

    #[tokio::test]
    async fn transport_errors_propagate() {
        let gate = gate_with(Arc::new(InMemoryRelationTable::new("RequiredTasks")), Arc::new(Unreachable));
        let err = gate.schedule_if_ready(&TaskId::generate()).await.unwrap_err();
        assert!(matches!(err, TetherError::SchedulerTransport(_)));
    }

    struct Redirecting;

    #[async_trait]
    impl SchedulerEndpoint for Redirecting {
        async fn schedule(&self, _task_id: &TaskId) -> Result<(), ScheduleError> {
            Err(ScheduleError::Rejected {
                status: 302,
                message: "moved".into(),
            })
        }
    }

    #[tokio::test]
    async fn non_error_status_is_not_absorbed() {
        let gate = gate_with(Arc::new(InMemoryRelationTable::new("RequiredTasks")), Arc::new(Redirecting));
        let err = gate.schedule_if_ready(&TaskId::generate()).await.unwrap_err();
        assert!(matches!(err, TetherError::SchedulerTransport(_)));
    }
}
