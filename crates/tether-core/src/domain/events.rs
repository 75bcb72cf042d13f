//! Events - inbound task lifecycle notifications.
//!
//! The event source hands us raw messages (exchange + JSON payload). Only
//! two exchanges are bound; anything else is a protocol violation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::TetherError;
use super::ids::TaskId;

/// Delivery handle used to ack / nack a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryTag(pub u64);

/// A raw message received from the event source.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub exchange: String,
    pub payload: Value,
    pub delivery: DeliveryTag,
    /// Whether this is a redelivery after a nack.
    pub redelivered: bool,
}

/// Exchange names the handler binds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchanges {
    pub task_defined: String,
    pub task_completed: String,
}

impl Exchanges {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            task_defined: format!("{prefix}task-defined"),
            task_completed: format!("{prefix}task-completed"),
        }
    }
}

/// A decoded lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    Defined(TaskId),
    Completed(TaskId),
}

impl TaskEvent {
    pub fn task_id(&self) -> &TaskId {
        match self {
            TaskEvent::Defined(id) | TaskEvent::Completed(id) => id,
        }
    }

    /// Decode a message according to the bound exchanges.
    pub fn decode(message: &InboundMessage, exchanges: &Exchanges) -> Result<Self, TetherError> {
        let wrap: fn(TaskId) -> TaskEvent = if message.exchange == exchanges.task_defined {
            TaskEvent::Defined
        } else if message.exchange == exchanges.task_completed {
            TaskEvent::Completed
        } else {
            return Err(TetherError::ProtocolViolation(format!(
                "message from unexpected exchange: {}",
                message.exchange
            )));
        };
        let payload: StatusPayload = serde_json::from_value(message.payload.clone())
            .map_err(|e| {
                TetherError::ProtocolViolation(format!(
                    "undecodable payload on {}: {e}",
                    message.exchange
                ))
            })?;
        Ok(wrap(payload.status.task_id))
    }
}

/// Wire shape of a lifecycle message: `{ "status": { "taskId": ... } }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusPayload {
    pub status: StatusRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRef {
    pub task_id: TaskId,
}

impl StatusPayload {
    pub fn for_task(task_id: &TaskId) -> Value {
        serde_json::json!({ "status": { "taskId": task_id.as_str() } })
    }
}
