//! Entity records and flush statistics.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity information kept for every live entity.
///
/// Data blocks are stored per kind in columns, not on the record.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityRecord {
    /// Display name.
    pub name: String,
    /// Unique identifier assigned at creation.
    pub uuid: Uuid,
}

impl EntityRecord {
    /// Creates a record with a fresh random UUID.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uuid: Uuid::new_v4(),
        }
    }
}

impl fmt::Display for EntityRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.uuid)
    }
}

/// What a [`flush`](crate::EntityStore::flush) applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FlushStats {
    /// Entities made live.
    pub created: usize,
    /// Entities destroyed.
    pub destroyed: usize,
    /// Store version after the flush.
    pub version: u64,
}

impl FlushStats {
    /// Returns true if the flush changed nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.destroyed == 0
    }
}
