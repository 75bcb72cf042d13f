//! TaskRegistry port - read access to task definitions and status.

use async_trait::async_trait;

use crate::domain::{TaskDefinition, TaskId, TaskStatus, TetherError};

#[async_trait]
pub trait TaskRegistry: Send + Sync {
    async fn get_definition(&self, task_id: &TaskId) -> Result<TaskDefinition, TetherError>;

    async fn get_status(&self, task_id: &TaskId) -> Result<TaskStatus, TetherError>;
}
