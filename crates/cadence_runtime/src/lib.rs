//! Sequential and parallel runtimes and the engine frame loop for Cadence.
//!
//! This crate provides:
//! - [`SequentialRuntime`] - Domain-filtered singleton subsystems run in resolved order
//! - [`ParallelRuntime`] - Behavioral units dispatched as a task graph on a worker pool
//! - [`TaskGraph`] - Compiled precedence plan with dependency counters
//! - [`RuntimeConfig`] - Domain, worker and frame-timing configuration
//! - [`Engine`] - Frame loop tying the store and both runtimes together

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod engine;
pub mod parallel;
pub mod sequential;
pub mod task_graph;

pub use config::RuntimeConfig;
pub use engine::{Engine, FrameReport, StopHandle};
pub use parallel::{BehavioralUnit, FromStore, ParallelRuntime, TickReport};
pub use sequential::{RuntimeState, SequentialRuntime, Subsystem};
pub use task_graph::TaskGraph;
