//! The store handle given to behavioral units.

use std::sync::Arc;

use cadence_foundation::{EntityHandle, EntityRef, Result};
use uuid::Uuid;

use crate::record::EntityRecord;
use crate::store::EntityStore;
use crate::view::{DataWrite, Query, View};

/// Shared access to an [`EntityStore`] without the ability to flush.
///
/// Units may queue structural changes, read views, write columns and attach
/// or detach data. Only the runtime that owns the store applies the queue, so
/// the live set cannot change while units are running.
///
/// Views and column writes borrow the access they came from and must be
/// dropped before `update` returns; the next flush waits on every column
/// lock still held. Hold one at a time.
#[derive(Clone, Debug)]
pub struct EntityAccess {
    store: Arc<EntityStore>,
}

impl EntityAccess {
    /// Wraps a shared store.
    #[must_use]
    pub fn new(store: Arc<EntityStore>) -> Self {
        Self { store }
    }

    /// Queues creation of an entity. See [`EntityStore::create_entity`].
    pub fn create_entity(&self, name: Option<&str>) -> Uuid {
        self.store.create_entity(name)
    }

    /// Queues destruction of an entity. See [`EntityStore::remove_entity`].
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier is unknown.
    pub fn remove_entity(&self, entity: impl Into<EntityRef>) -> Result<()> {
        self.store.remove_entity(entity)
    }

    /// Attaches a data block. See [`EntityStore::add_data`].
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is not live or the kind is already attached.
    pub fn add_data<K: Send + Sync + 'static>(&self, handle: EntityHandle, value: K) -> Result<()> {
        self.store.add_data(handle, value)
    }

    /// Detaches a data block. See [`EntityStore::remove_data`].
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is not live or the kind is not attached.
    pub fn remove_data<K: Send + Sync + 'static>(&self, handle: EntityHandle) -> Result<K> {
        self.store.remove_data(handle)
    }

    /// Returns true if the entity carries a `K`.
    #[must_use]
    pub fn has_data<K: Send + Sync + 'static>(&self, handle: EntityHandle) -> bool {
        self.store.has_data::<K>(handle)
    }

    /// Read-only view over entities carrying every kind in `Q`.
    ///
    /// # Panics
    ///
    /// Panics if `Q` names the same kind twice.
    #[must_use]
    pub fn view<Q: Query>(&self) -> View<'_, Q> {
        self.store.view()
    }

    /// Exclusive access to one data column.
    #[must_use]
    pub fn write<K: Send + Sync + 'static>(&self) -> DataWrite<'_, K> {
        self.store.write()
    }

    /// Handle of the live entity with this UUID.
    #[must_use]
    pub fn handle_of(&self, uuid: Uuid) -> Option<EntityHandle> {
        self.store.handle_of(uuid)
    }

    /// Record of a live entity.
    #[must_use]
    pub fn record(&self, handle: EntityHandle) -> Option<EntityRecord> {
        self.store.record(handle)
    }

    /// Returns true if the handle names a live entity.
    #[must_use]
    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.store.contains(handle)
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns true if there are no live entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Current store version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.store.version()
    }

    /// Live entity handles, in handle order.
    #[must_use]
    pub fn entities(&self) -> Vec<EntityHandle> {
        self.store.entities()
    }
}
