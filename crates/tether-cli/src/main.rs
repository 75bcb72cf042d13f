use anyhow::{Context, Result, bail};
use chrono::{Duration as ChronoDuration, Utc};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::time::{Duration, Instant, sleep};
use tracing::info;

use tether_core::app::HandlerBuilder;
use tether_core::config::SchedulerConfig;
use tether_core::domain::{TaskDefinition, TaskId};
use tether_core::impls::{InMemoryEventSource, InMemoryRelationTable, InMemoryTaskService};

#[derive(Parser)]
#[command(name = "tether", about = "Dependency-driven task scheduler", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the resolved configuration
    Config {
        /// Built-in profile: default, production or test
        #[arg(long, default_value = "default")]
        profile: String,
        /// TOML file replacing the profile
        #[arg(long)]
        file: Option<std::path::PathBuf>,
    },
    /// Run the A, B -> C scenario against in-memory adapters
    Demo {
        #[arg(long, default_value = "default")]
        profile: String,
    },
}

fn load(profile: &str, file: Option<&std::path::Path>) -> Result<SchedulerConfig> {
    let config = match file {
        Some(path) => SchedulerConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SchedulerConfig::profile(profile)?,
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    match Cli::parse().command {
        Command::Config { profile, file } => {
            let config = load(&profile, file.as_deref())?;
            println!("{config:#?}");
            println!("exchanges: {:?}", config.exchanges());
            Ok(())
        }
        Command::Demo { profile } => demo(load(&profile, None)?).await,
    }
}

/// Polls `check` until it holds or the deadline passes.
async fn wait_for(what: &str, mut check: impl FnMut() -> Result<bool>) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if check()? {
            return Ok(());
        }
        sleep(Duration::from_millis(20)).await;
    }
    bail!("timed out waiting for {what}")
}

async fn demo(config: SchedulerConfig) -> Result<()> {
    let exchanges = config.exchanges();
    let extra_key = config.scheduler.extra_key.clone();

    // (A) in-memory adapters: the task service publishes to the event source
    let source = Arc::new(InMemoryEventSource::new());
    let service = Arc::new(InMemoryTaskService::publishing_to(source.clone(), exchanges));
    let requires = Arc::new(InMemoryRelationTable::new(&config.scheduler.required_task_table));
    let waits_on = Arc::new(InMemoryRelationTable::new(&config.scheduler.dependent_task_table));

    let handler = HandlerBuilder::new(config)
        .requires_table(requires.clone())
        .waits_on_table(waits_on.clone())
        .registry(service.clone())
        .scheduler(service.clone())
        .event_source(source.clone())
        .build()?;
    handler.setup().await?;

    // (B) A and B have no dependencies; C waits for both
    let deadline = Utc::now() + ChronoDuration::hours(1);
    let (a, b, c) = (TaskId::generate(), TaskId::generate(), TaskId::generate());
    service.define(&a, TaskDefinition::new(deadline).with_dependencies(&extra_key, &[]))?;
    service.define(&b, TaskDefinition::new(deadline).with_dependencies(&extra_key, &[]))?;
    service.define(
        &c,
        TaskDefinition::new(deadline).with_dependencies(&extra_key, &[a.clone(), b.clone()]),
    )?;
    info!(a = %a, b = %b, c = %c, "defined tasks");

    wait_for("A and B to be scheduled", || {
        Ok(service.is_scheduled(&a)? && service.is_scheduled(&b)?)
    })
    .await?;
    wait_for("C's relations", || Ok(requires.len()? == 2)).await?;
    println!("scheduled A={a} B={b}; C={c} waits ({} rows)", requires.len()?);

    // (C) complete A: C keeps waiting on B
    service.report_completed(&a)?;
    wait_for("A's completion to propagate", || Ok(requires.len()? == 1)).await?;
    println!("A completed; C scheduled: {}", service.is_scheduled(&c)?);

    // (D) complete B: C becomes schedulable
    service.report_completed(&b)?;
    wait_for("C to be scheduled", || service.is_scheduled(&c).map_err(Into::into)).await?;
    wait_for("relations to drain", || Ok(requires.is_empty()? && waits_on.is_empty()?)).await?;
    println!("B completed; C scheduled: {}", service.is_scheduled(&c)?);
    println!("event source: {:?}", source.counts()?);

    handler.terminate().await?;
    Ok(())
}
