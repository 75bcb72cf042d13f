//! Domain model (ids, task definitions, relation rows, events, errors).

pub mod errors;
pub mod events;
pub mod ids;
pub mod relation;
pub mod task;

pub use self::errors::{ErrorKind, TetherError};
pub use self::events::{DeliveryTag, Exchanges, InboundMessage, StatusPayload, TaskEvent};
pub use self::ids::{IdError, TaskId};
pub use self::relation::{Continuation, RelationKey, RelationRow, ScanPage};
pub use self::task::{DeclaredDependencies, RunState, RunStatus, TaskDefinition, TaskStatus};
