//! HandlerBuilder - wires config and adapters into a `Handler`.
//!
//! # Fail-fast
//! `build()` checks that every adapter was supplied and that the config is
//! valid before anything touches the network.

use std::sync::Arc;
use tracing::info;

use crate::config::{ConfigError, SchedulerConfig};
use crate::ports::{EventSource, RelationTable, Relations, SchedulerEndpoint, TaskRegistry};

use super::gate::SchedulingGate;
use super::handler::{Dispatcher, Handler};
use super::maintainer::DependencyMaintainer;
use super::propagator::CompletionPropagator;
use super::readiness::ReadinessOracle;

/// Errors raised while assembling a `Handler`.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing adapter: {0}. Provide it before calling build().")]
    Missing(&'static str),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// ```ignore
/// let handler = HandlerBuilder::new(SchedulerConfig::profile("production")?)
///     .requires_table(requires)
///     .waits_on_table(waits_on)
///     .registry(queue.clone())
///     .scheduler(queue)
///     .event_source(pulse)
///     .build()?;
/// handler.setup().await?;
/// ```
pub struct HandlerBuilder {
    config: SchedulerConfig,
    requires: Option<Arc<dyn RelationTable>>,
    waits_on: Option<Arc<dyn RelationTable>>,
    registry: Option<Arc<dyn TaskRegistry>>,
    scheduler: Option<Arc<dyn SchedulerEndpoint>>,
    source: Option<Arc<dyn EventSource>>,
}

impl HandlerBuilder {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            requires: None,
            waits_on: None,
            registry: None,
            scheduler: None,
            source: None,
        }
    }

    /// Table for `Requires(task, required)` rows.
    pub fn requires_table(mut self, table: Arc<dyn RelationTable>) -> Self {
        self.requires = Some(table);
        self
    }

    /// Table for `WaitsOn(required, task)` rows.
    pub fn waits_on_table(mut self, table: Arc<dyn RelationTable>) -> Self {
        self.waits_on = Some(table);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn TaskRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn SchedulerEndpoint>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn event_source(mut self, source: Arc<dyn EventSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn build(self) -> Result<Handler, BuildError> {
        self.config.validate()?;
        let requires = self.requires.ok_or(BuildError::Missing("requires table"))?;
        let waits_on = self.waits_on.ok_or(BuildError::Missing("waits-on table"))?;
        let registry = self.registry.ok_or(BuildError::Missing("task registry"))?;
        let scheduler = self.scheduler.ok_or(BuildError::Missing("scheduler endpoint"))?;
        let source = self.source.ok_or(BuildError::Missing("event source"))?;

        let settings = &self.config.scheduler;
        let relations = Relations::new(Arc::clone(&requires), waits_on);
        let gate = SchedulingGate::new(ReadinessOracle::new(requires), scheduler);
        let maintainer = DependencyMaintainer::new(
            registry,
            relations.clone(),
            gate.clone(),
            settings.extra_key.clone(),
            settings.parallelism,
        );
        let propagator = CompletionPropagator::new(relations, gate, settings.parallelism);
        let dispatcher = Dispatcher::new(self.config.exchanges(), maintainer, propagator);

        info!(
            component = %settings.stats_component,
            required_task_table = %settings.required_task_table,
            dependent_task_table = %settings.dependent_task_table,
            extra_key = %settings.extra_key,
            prefetch = settings.prefetch,
            parallelism = settings.parallelism,
            "scheduler handler assembled"
        );
        Ok(Handler::new(dispatcher, source, settings.prefetch))
    }
}
