//! Core identities, domains, dependency graphs, and errors for Cadence.
//!
//! This crate provides:
//! - [`Identity`] - Stable per-kind keys used as graph nodes and registry keys
//! - [`Domain`] - Capability-domain masks for conditional registration
//! - [`MetaInfo`] / [`MetaRegistry`] - Declared ordering constraints per identity
//! - [`DependencyGraph`] - Cycle-safe topological sorting over opaque nodes
//! - [`EntityHandle`] / [`EntityRef`] - Generational entity handles
//! - [`Error`] - Rich error types with context

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod domain;
pub mod entity;
pub mod error;
pub mod graph;
pub mod identity;
pub mod meta;

pub use domain::{Domain, LaunchMode};
pub use entity::{EntityHandle, EntityRef};
pub use error::{Error, ErrorKind, Result, UnitFailure};
pub use graph::DependencyGraph;
pub use identity::Identity;
pub use meta::{MetaInfo, MetaRegistry, Phase};
