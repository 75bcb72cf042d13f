//! App - composes the ports into the scheduler's behaviour.
//!
//! # Components
//! - **ReadinessOracle**: "does this task still wait on anything?"
//! - **SchedulingGate**: schedules a task once nothing is outstanding
//! - **DependencyMaintainer**: task-defined -> relation rows
//! - **CompletionPropagator**: task-completed -> release dependents
//! - **Handler**: consumes events and dispatches them
//! - **HandlerBuilder**: wiring and start-up validation

pub mod builder;
pub mod gate;
pub mod handler;
pub mod maintainer;
pub mod propagator;
pub mod readiness;

pub use self::builder::{BuildError, HandlerBuilder};
pub use self::gate::{GateDecision, SchedulingGate};
pub use self::handler::{Dispatcher, Handled, Handler};
pub use self::maintainer::{DefineOutcome, DependencyMaintainer};
pub use self::propagator::{CompletionPropagator, MAX_PAGE_SIZE, PropagationReport};
pub use self::readiness::ReadinessOracle;
