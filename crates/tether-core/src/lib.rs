//! tether-core
//!
//! Dependency-driven task scheduling: tasks declare which tasks they wait
//! for, and are scheduled once all of them completed.
//!
//! # Modules
//! - **domain**: ids, task definitions, relation rows, events, errors
//! - **ports**: relation store, task registry, scheduler, event source, clock
//! - **app**: readiness, gate, maintainer, propagator, handler, builder
//! - **impls**: in-memory adapters for development and tests
//! - **config**: profiles, TOML and environment overrides

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
