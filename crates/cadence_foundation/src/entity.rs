//! Entity handles with generational indices.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lightweight entity handle with generational index for stale reference detection.
///
/// The generation counter increments when an index is reused after destruction,
/// so a handle to a destroyed entity never aliases its successor. A handle is
/// stable for the whole lifetime of its entity and carries no payload.
///
/// # Layout
/// - `index`: 32-bit index into entity storage
/// - `generation`: 32-bit generation counter
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EntityHandle {
    /// Index into entity storage.
    pub index: u32,
    /// Generation counter for stale reference detection.
    pub generation: u32,
}

impl EntityHandle {
    /// Creates a new handle with the given index and generation.
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns a sentinel value representing "no entity".
    ///
    /// This uses `u32::MAX` as the index, which is never allocated.
    #[must_use]
    pub const fn null() -> Self {
        Self {
            index: u32::MAX,
            generation: 0,
        }
    }

    /// Returns true if this is the null sentinel value.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.index == u32::MAX
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "EntityHandle(null)")
        } else {
            write!(f, "EntityHandle({}v{})", self.index, self.generation)
        }
    }
}

impl fmt::Display for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Entity(null)")
        } else {
            write!(f, "Entity({})", self.index)
        }
    }
}

/// Either form of entity identifier accepted by entity removal.
///
/// Handles name live entities only; UUIDs are assigned at creation time and
/// also name entities still waiting in the pending-create queue.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EntityRef {
    /// A live entity handle.
    Handle(EntityHandle),
    /// A process-wide unique identifier.
    Uuid(Uuid),
}

impl From<EntityHandle> for EntityRef {
    fn from(handle: EntityHandle) -> Self {
        EntityRef::Handle(handle)
    }
}

impl From<Uuid> for EntityRef {
    fn from(uuid: Uuid) -> Self {
        EntityRef::Uuid(uuid)
    }
}

impl From<&Uuid> for EntityRef {
    fn from(uuid: &Uuid) -> Self {
        EntityRef::Uuid(*uuid)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Handle(handle) => write!(f, "{handle:?}"),
            EntityRef::Uuid(uuid) => write!(f, "uuid {uuid}"),
        }
    }
}
