//! DependencyMaintainer - reacts to task-defined events.
//!
//! # Flow
//! 1. Load the definition; read `extra[extra_key]`
//! 2. Undeclared field: nothing to wait for, go to the gate
//! 3. Malformed field: log and stop, nothing is written
//! 4. Upsert `Requires(task, req)` + `WaitsOn(req, task)` for every entry
//! 5. Re-check every required task; drop both rows for the ones that
//!    already completed (their completion event may have been handled
//!    before our rows existed)
//! 6. Empty list, or anything dropped in 5: ask the gate

use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::{DeclaredDependencies, RelationKey, RelationRow, TaskId, TetherError};
use crate::ports::{Relations, TaskRegistry};

use super::gate::{GateDecision, SchedulingGate};

/// Result of handling one task-defined event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefineOutcome {
    /// The dependency field was malformed; nothing was written.
    Rejected,
    /// Rows are recorded and the task still waits; the gate was not asked.
    Waiting { dependencies: usize },
    /// The gate was asked.
    Gated(GateDecision),
}

#[derive(Clone)]
pub struct DependencyMaintainer {
    registry: Arc<dyn TaskRegistry>,
    relations: Relations,
    gate: SchedulingGate,
    extra_key: String,
    parallelism: usize,
}

impl DependencyMaintainer {
    pub fn new(
        registry: Arc<dyn TaskRegistry>,
        relations: Relations,
        gate: SchedulingGate,
        extra_key: impl Into<String>,
        parallelism: usize,
    ) -> Self {
        Self {
            registry,
            relations,
            gate,
            extra_key: extra_key.into(),
            parallelism: parallelism.max(1),
        }
    }

    pub async fn on_task_defined(&self, task_id: &TaskId) -> Result<DefineOutcome, TetherError> {
        let definition = self.registry.get_definition(task_id).await?;

        let required = match definition.dependencies(&self.extra_key) {
            DeclaredDependencies::Undeclared => {
                debug!(task_id = %task_id, "task doesn't declare any dependencies");
                let decision = self.gate.schedule_if_ready(task_id).await?;
                return Ok(DefineOutcome::Gated(decision));
            }
            DeclaredDependencies::Malformed(value) => {
                warn!(
                    task_id = %task_id,
                    extra_key = %self.extra_key,
                    value = %value,
                    "task has an invalid dependency list"
                );
                return Ok(DefineOutcome::Rejected);
            }
            DeclaredDependencies::List(required) => required,
        };
        debug!(task_id = %task_id, dependencies = required.len(), "task has dependencies");

        // relations are useless once the task can no longer be scheduled
        let expires = definition.deadline;

        stream::iter(required.iter().cloned())
            .map(|required_task_id| {
                let requires = RelationRow::requires(task_id.clone(), required_task_id.clone(), expires);
                let waits_on = RelationRow::waits_on(required_task_id, task_id.clone(), expires);
                async move {
                    futures::try_join!(
                        self.relations.requires.upsert(requires),
                        self.relations.waits_on.upsert(waits_on),
                    )
                    .map(|_| ())
                }
            })
            .buffer_unordered(self.parallelism)
            .try_collect::<Vec<()>>()
            .await?;

        let removed: Vec<bool> = stream::iter(required.iter().cloned())
            .map(|required_task_id| self.drop_if_completed(task_id, required_task_id))
            .buffer_unordered(self.parallelism)
            .try_collect()
            .await?;
        let any_removed = removed.into_iter().any(|r| r);

        // rows could have been resolved while we were writing them
        if required.is_empty() || any_removed {
            let decision = self.gate.schedule_if_ready(task_id).await?;
            return Ok(DefineOutcome::Gated(decision));
        }
        Ok(DefineOutcome::Waiting {
            dependencies: required.len(),
        })
    }

    /// Delete `Requires(task, required)` and `WaitsOn(required, task)` if
    /// `required` already completed. Returns whether a `Requires` row went away.
    async fn drop_if_completed(
        &self,
        task_id: &TaskId,
        required_task_id: TaskId,
    ) -> Result<bool, TetherError> {
        let status = self.registry.get_status(&required_task_id).await?;
        if !status.is_completed() {
            return Ok(false);
        }
        debug!(
            task_id = %task_id,
            required_task_id = %required_task_id,
            "required task already completed, removing requirement"
        );
        let removed = self
            .relations
            .requires
            .delete_if_exists(&RelationKey::new(task_id.clone(), required_task_id.clone()))
            .await?;
        // the completion walk for `required_task_id` already ran and won't
        // come back for this row
        self.relations
            .waits_on
            .delete_if_exists(&RelationKey::new(required_task_id, task_id.clone()))
            .await?;
        Ok(removed)
    }
}
