//! Ports - interfaces to the collaborators of the scheduler.
//!
//! Each trait hides an external system (table storage, task registry,
//! scheduler endpoint, message transport). In-memory implementations live in
//! `impls`.

pub mod clock;
pub mod event_source;
pub mod relation_store;
pub mod scheduler;
pub mod task_registry;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_source::EventSource;
pub use self::relation_store::{RelationTable, Relations};
pub use self::scheduler::{ScheduleError, SchedulerEndpoint};
pub use self::task_registry::TaskRegistry;
