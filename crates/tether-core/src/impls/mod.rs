//! Impls - in-memory adapters for the ports (development / tests / demo).
//!
//! Production adapters (table storage, message broker, remote task service)
//! belong in separate crates; they only need to implement the traits in
//! `ports`.

pub mod inmem_events;
pub mod inmem_relation;
pub mod inmem_tasks;

pub use self::inmem_events::{InMemoryEventSource, SourceCounts};
pub use self::inmem_relation::InMemoryRelationTable;
pub use self::inmem_tasks::InMemoryTaskService;
