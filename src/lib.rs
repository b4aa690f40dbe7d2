//! Cadence - Dependency-ordered tick orchestration
//!
//! This crate re-exports all layers of the Cadence system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 2: cadence_runtime    - Sequential and parallel runtimes, engine loop, CLI
//! Layer 1: cadence_storage    - Deferred entity store, data blocks, views
//! Layer 0: cadence_foundation - Identities, domains, dependency graphs, errors
//! ```

pub use cadence_foundation as foundation;
pub use cadence_runtime as runtime;
pub use cadence_storage as storage;
