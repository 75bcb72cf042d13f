//! InMemoryTaskService - development / test task registry and scheduler.
//!
//! Plays the role of the remote task service: it stores definitions, keeps
//! run history, accepts `schedule` calls, and (optionally) publishes
//! task-defined / task-completed events to an event source, so the whole
//! define -> schedule -> complete cycle can run in one process.
//!
//! Scheduling semantics are intentionally minimal:
//! - unknown task: rejected with 404
//! - task that already has a run: rejected with 409
//! - otherwise a `pending` run is added

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::{
    Exchanges, RunState, RunStatus, StatusPayload, TaskDefinition, TaskId, TaskStatus, TetherError,
};
use crate::impls::InMemoryEventSource;
use crate::ports::{ScheduleError, SchedulerEndpoint, TaskRegistry};

#[derive(Debug, Clone)]
struct TaskEntry {
    definition: TaskDefinition,
    status: TaskStatus,
    schedule_calls: usize,
}

#[derive(Debug, Default)]
struct ServiceState {
    tasks: HashMap<TaskId, TaskEntry>,
}

#[derive(Default)]
pub struct InMemoryTaskService {
    state: Mutex<ServiceState>,
    events: Option<(Arc<InMemoryEventSource>, Exchanges)>,
}

impl InMemoryTaskService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish lifecycle events to `source` on the given exchanges.
    pub fn publishing_to(source: Arc<InMemoryEventSource>, exchanges: Exchanges) -> Self {
        Self {
            state: Mutex::new(ServiceState::default()),
            events: Some((source, exchanges)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, ServiceState>, TetherError> {
        self.state
            .lock()
            .map_err(|e| TetherError::Registry(format!("lock poisoned: {e}")))
    }

    fn publish(&self, pick: fn(&Exchanges) -> &str, task_id: &TaskId) -> Result<(), TetherError> {
        if let Some((source, exchanges)) = &self.events {
            source.publish(pick(exchanges), StatusPayload::for_task(task_id))?;
        }
        Ok(())
    }

    /// Define (or redefine) a task; emits task-defined.
    pub fn define(&self, task_id: &TaskId, definition: TaskDefinition) -> Result<(), TetherError> {
        {
            let mut state = self.lock()?;
            state
                .tasks
                .entry(task_id.clone())
                .and_modify(|entry| entry.definition = definition.clone())
                .or_insert(TaskEntry {
                    definition,
                    status: TaskStatus::default(),
                    schedule_calls: 0,
                });
        }
        self.publish(|ex| ex.task_defined.as_str(), task_id)
    }

    /// Move the latest pending run to running.
    pub fn claim(&self, task_id: &TaskId) -> Result<(), TetherError> {
        self.transition(task_id, RunState::Pending, RunState::Running)
    }

    /// Complete the running run (claiming it first if needed); emits
    /// task-completed.
    pub fn report_completed(&self, task_id: &TaskId) -> Result<(), TetherError> {
        let claimed = self.transition(task_id, RunState::Pending, RunState::Running);
        if let Err(e) = claimed
            && self.latest_state(task_id)? != Some(RunState::Running)
        {
            return Err(e);
        }
        self.transition(task_id, RunState::Running, RunState::Completed)?;
        self.publish(|ex| ex.task_completed.as_str(), task_id)
    }

    fn transition(&self, task_id: &TaskId, from: RunState, to: RunState) -> Result<(), TetherError> {
        let mut state = self.lock()?;
        let entry = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| TetherError::Registry(format!("task {task_id} not found")))?;
        match entry.status.runs.last_mut() {
            Some(run) if run.state == from => {
                run.state = to;
                Ok(())
            }
            other => Err(TetherError::Registry(format!(
                "task {task_id}: expected latest run {from:?}, found {:?}",
                other.map(|r| r.state)
            ))),
        }
    }

    fn latest_state(&self, task_id: &TaskId) -> Result<Option<RunState>, TetherError> {
        let state = self.lock()?;
        Ok(state
            .tasks
            .get(task_id)
            .and_then(|entry| entry.status.runs.last())
            .map(|run| run.state))
    }

    /// Whether at least one run was ever created by `schedule`.
    pub fn is_scheduled(&self, task_id: &TaskId) -> Result<bool, TetherError> {
        Ok(self.latest_state(task_id)?.is_some())
    }

    /// Number of `schedule` calls received for `task_id`, accepted or not.
    pub fn schedule_calls(&self, task_id: &TaskId) -> Result<usize, TetherError> {
        let state = self.lock()?;
        Ok(state.tasks.get(task_id).map_or(0, |entry| entry.schedule_calls))
    }
}

#[async_trait]
impl TaskRegistry for InMemoryTaskService {
    async fn get_definition(&self, task_id: &TaskId) -> Result<TaskDefinition, TetherError> {
        let state = self.lock()?;
        state
            .tasks
            .get(task_id)
            .map(|entry| entry.definition.clone())
            .ok_or_else(|| TetherError::Registry(format!("task {task_id} not found")))
    }

    async fn get_status(&self, task_id: &TaskId) -> Result<TaskStatus, TetherError> {
        let state = self.lock()?;
        state
            .tasks
            .get(task_id)
            .map(|entry| entry.status.clone())
            .ok_or_else(|| TetherError::Registry(format!("task {task_id} not found")))
    }
}

#[async_trait]
impl SchedulerEndpoint for InMemoryTaskService {
    async fn schedule(&self, task_id: &TaskId) -> Result<(), ScheduleError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| ScheduleError::Transport(format!("lock poisoned: {e}")))?;
        let Some(entry) = state.tasks.get_mut(task_id) else {
            return Err(ScheduleError::Rejected {
                status: 404,
                message: format!("task {task_id} not found"),
            });
        };
        entry.schedule_calls += 1;
        if !entry.status.runs.is_empty() {
            return Err(ScheduleError::Rejected {
                status: 409,
                message: format!("task {task_id} is already scheduled"),
            });
        }
        entry.status.runs.push(RunStatus {
            state: RunState::Pending,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::EventSource;
    use chrono::{Duration, Utc};

    fn definition() -> TaskDefinition {
        TaskDefinition::new(Utc::now() + Duration::minutes(3))
    }

    #[tokio::test]
    async fn schedule_twice_is_a_conflict() {
        let service = InMemoryTaskService::new();
        let id = TaskId::generate();
        service.define(&id, definition()).unwrap();

        service.schedule(&id).await.unwrap();
        let err = service.schedule(&id).await.unwrap_err();
        assert!(matches!(err, ScheduleError::Rejected { status: 409, .. }));
        assert_eq!(service.schedule_calls(&id).unwrap(), 2);
    }

    #[tokio::test]
    async fn schedule_unknown_task_is_not_found() {
        let service = InMemoryTaskService::new();
        let err = service.schedule(&TaskId::generate()).await.unwrap_err();
        assert!(matches!(err, ScheduleError::Rejected { status: 404, .. }));
    }

    #[tokio::test]
    async fn completion_shows_in_status() {
        let service = InMemoryTaskService::new();
        let id = TaskId::generate();
        service.define(&id, definition()).unwrap();
        service.schedule(&id).await.unwrap();
        assert!(!service.get_status(&id).await.unwrap().is_completed());

        service.claim(&id).unwrap();
        service.report_completed(&id).unwrap();
        assert!(service.get_status(&id).await.unwrap().is_completed());
    }

    #[tokio::test]
    async fn completing_unscheduled_task_fails() {
        let service = InMemoryTaskService::new();
        let id = TaskId::generate();
        service.define(&id, definition()).unwrap();
        assert!(service.report_completed(&id).is_err());
    }

    #[tokio::test]
    async fn publishes_lifecycle_events() {
        let source = Arc::new(InMemoryEventSource::new());
        let exchanges = Exchanges::with_prefix("q/");
        let service = InMemoryTaskService::publishing_to(source.clone(), exchanges.clone());
        let id = TaskId::generate();

        service.define(&id, definition()).unwrap();
        service.schedule(&id).await.unwrap();
        service.report_completed(&id).unwrap();

        let defined = source.next().await.unwrap();
        assert_eq!(defined.exchange, exchanges.task_defined);
        let completed = source.next().await.unwrap();
        assert_eq!(completed.exchange, exchanges.task_completed);
        assert_eq!(completed.payload, StatusPayload::for_task(&id));
    }
}
