//! Entity storage with deferred structural changes for Cadence.
//!
//! This crate provides:
//! - [`EntityStore`] - Live entity set, deferred create/destroy queues, data columns
//! - [`HandleAllocator`] - Generational handle allocation
//! - [`View`] / [`DataWrite`] - Typed queries and column writes
//! - [`EntityAccess`] - Flush-free store handle for behavioral units

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod access;
pub mod column;
pub mod handle;
pub mod record;
pub mod store;
pub mod view;

pub use access::EntityAccess;
pub use column::{ColumnData, ColumnReadGuard, ColumnWriteGuard};
pub use handle::HandleAllocator;
pub use record::{EntityRecord, FlushStats};
pub use store::EntityStore;
pub use view::{DataWrite, Query, View};
