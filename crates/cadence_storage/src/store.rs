//! The entity store.
//!
//! Structural changes are deferred: [`EntityStore::create_entity`] and
//! [`EntityStore::remove_entity`] only enqueue requests, and the live set
//! changes exclusively inside [`EntityStore::flush`]. Data attach and detach
//! apply immediately, synchronized per column.
//!
//! Lock order is pending queue, then live set, then columns. No path takes
//! them in the opposite direction.

use std::any::TypeId;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cadence_foundation::{EntityHandle, EntityRef, Error, ErrorKind, Identity, Result};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::column::{Column, ErasedColumn, SharedColumn};
use crate::handle::HandleAllocator;
use crate::record::{EntityRecord, FlushStats};
use crate::view::{DataWrite, Query, View};

#[derive(Default)]
struct Pending {
    create: Vec<EntityRecord>,
    destroy: Vec<EntityHandle>,
    destroy_set: HashSet<EntityHandle>,
}

impl Pending {
    fn len(&self) -> usize {
        self.create.len() + self.destroy.len()
    }
}

#[derive(Default)]
struct LiveSet {
    allocator: HandleAllocator,
    records: BTreeMap<EntityHandle, EntityRecord>,
    by_uuid: HashMap<Uuid, EntityHandle>,
}

/// Canonical owner of entity handles and their attached data.
///
/// Shared between runtimes behind an `Arc`; every method takes `&self`.
#[derive(Default)]
pub struct EntityStore {
    pending: Mutex<Pending>,
    live: RwLock<LiveSet>,
    columns: RwLock<HashMap<TypeId, Box<dyn ErasedColumn>>>,
    version: AtomicU64,
}

impl EntityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store already wrapped in an `Arc`.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    // =========================================================================
    // Deferred structural changes
    // =========================================================================

    /// Queues creation of an entity and returns its UUID.
    ///
    /// Unnamed entities are called `Entity #N`, where N counts live and
    /// pending entities at the time of the call. The entity becomes live at
    /// the next [`flush`](Self::flush).
    pub fn create_entity(&self, name: Option<&str>) -> Uuid {
        let mut pending = self.pending.lock();
        let name = match name {
            Some(name) => name.to_string(),
            None => {
                let count = self.live.read().allocator.len() + pending.create.len();
                format!("Entity #{count}")
            }
        };
        let record = EntityRecord::new(name);
        let uuid = record.uuid;
        trace!(entity = %record, "queued entity creation");
        pending.create.push(record);
        uuid
    }

    /// Queues destruction of an entity.
    ///
    /// A UUID that is still waiting in the create queue cancels that creation
    /// instead. Repeated requests for the same entity collapse into one.
    ///
    /// # Errors
    ///
    /// Returns an error if the identifier names neither a live entity nor a
    /// pending creation.
    pub fn remove_entity(&self, entity: impl Into<EntityRef>) -> Result<()> {
        let entity = entity.into();
        let mut pending = self.pending.lock();

        let handle = match entity {
            EntityRef::Handle(handle) => {
                self.live.read().allocator.validate(handle)?;
                handle
            }
            EntityRef::Uuid(uuid) => {
                if let Some(pos) = pending.create.iter().position(|r| r.uuid == uuid) {
                    let record = pending.create.remove(pos);
                    trace!(entity = %record, "cancelled pending creation");
                    return Ok(());
                }
                self.live
                    .read()
                    .by_uuid
                    .get(&uuid)
                    .copied()
                    .ok_or_else(|| Error::unknown_entity(uuid))?
            }
        };

        if pending.destroy_set.insert(handle) {
            pending.destroy.push(handle);
            trace!(?handle, "queued entity destruction");
        }
        Ok(())
    }

    /// Applies every queued request.
    ///
    /// Destructions run first and drop the entity's data from every column;
    /// creations follow in request order. Both queues are left empty. The
    /// store version is bumped only if something changed.
    pub fn flush(&self) -> FlushStats {
        let Pending {
            create, destroy, ..
        } = std::mem::take(&mut *self.pending.lock());

        if create.is_empty() && destroy.is_empty() {
            return FlushStats {
                version: self.version(),
                ..FlushStats::default()
            };
        }

        let mut live = self.live.write();
        let mut stats = FlushStats::default();

        if !destroy.is_empty() {
            let columns = self.columns.read();
            for handle in destroy {
                if let Err(err) = live.allocator.release(handle) {
                    warn!(?handle, error = %err, "skipping destruction of dead entity");
                    continue;
                }
                if let Some(record) = live.records.remove(&handle) {
                    live.by_uuid.remove(&record.uuid);
                }
                for column in columns.values() {
                    column.remove(handle);
                }
                stats.destroyed += 1;
            }
        }

        for record in create {
            let handle = match live.allocator.allocate() {
                Ok(handle) => handle,
                Err(err) => {
                    warn!(entity = %record, error = %err, "dropping entity creation");
                    continue;
                }
            };
            live.by_uuid.insert(record.uuid, handle);
            live.records.insert(handle, record);
            stats.created += 1;
        }

        stats.version = if stats.is_noop() {
            self.version()
        } else {
            self.version.fetch_add(1, Ordering::AcqRel) + 1
        };
        debug!(
            created = stats.created,
            destroyed = stats.destroyed,
            live = live.allocator.len(),
            version = stats.version,
            "flushed entity store"
        );
        stats
    }

    // =========================================================================
    // Data blocks
    // =========================================================================

    /// Attaches a data block of kind `K` to a live entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is not live or the entity already
    /// carries a `K`.
    pub fn add_data<K: Send + Sync + 'static>(&self, handle: EntityHandle, value: K) -> Result<()> {
        let live = self.live.read();
        live.allocator.validate(handle)?;

        let column = self.column::<K>();
        let mut data = column.write();
        if data.contains_key(&handle) {
            return Err(Error::new(ErrorKind::DataAlreadyPresent {
                entity: handle,
                kind: Identity::of::<K>().name(),
            }));
        }
        data.insert(handle, value);
        Ok(())
    }

    /// Detaches and returns the data block of kind `K`.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is not live or the entity carries no
    /// `K`.
    pub fn remove_data<K: Send + Sync + 'static>(&self, handle: EntityHandle) -> Result<K> {
        let live = self.live.read();
        live.allocator.validate(handle)?;

        let missing = || {
            Error::new(ErrorKind::DataMissing {
                entity: handle,
                kind: Identity::of::<K>().name(),
            })
        };
        let column = self.existing_column::<K>().ok_or_else(missing)?;
        column.write().remove(&handle).ok_or_else(missing)
    }

    /// Returns true if the entity carries a `K`.
    #[must_use]
    pub fn has_data<K: Send + Sync + 'static>(&self, handle: EntityHandle) -> bool {
        self.existing_column::<K>()
            .is_some_and(|column| column.read().contains_key(&handle))
    }

    /// Read-only view over every entity carrying all kinds in `Q`.
    ///
    /// `Q` is a tuple of one to four distinct kinds, e.g. `(Position, Velocity)`.
    /// Drop the view before calling [`EntityStore::flush`] on another thread;
    /// the flush waits for it.
    ///
    /// # Panics
    ///
    /// Panics if `Q` names the same kind twice.
    #[must_use]
    pub fn view<Q: Query>(&self) -> View<'_, Q> {
        View::new(self)
    }

    /// Exclusive access to the column of kind `K`.
    #[must_use]
    pub fn write<K: Send + Sync + 'static>(&self) -> DataWrite<'_, K> {
        DataWrite::new(self.column::<K>().write_arc())
    }

    pub(crate) fn column<K: Send + Sync + 'static>(&self) -> SharedColumn<K> {
        if let Some(column) = self.existing_column::<K>() {
            return column;
        }
        let mut columns = self.columns.write();
        let erased = columns
            .entry(TypeId::of::<K>())
            .or_insert_with(|| Box::new(Column::<K>::new()));
        downcast::<K>(erased.as_ref())
    }

    fn existing_column<K: Send + Sync + 'static>(&self) -> Option<SharedColumn<K>> {
        self.columns
            .read()
            .get(&TypeId::of::<K>())
            .map(|erased| downcast::<K>(erased.as_ref()))
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Handle of the live entity with this UUID.
    #[must_use]
    pub fn handle_of(&self, uuid: Uuid) -> Option<EntityHandle> {
        self.live.read().by_uuid.get(&uuid).copied()
    }

    /// Record of a live entity.
    #[must_use]
    pub fn record(&self, handle: EntityHandle) -> Option<EntityRecord> {
        self.live.read().records.get(&handle).cloned()
    }

    /// Returns true if the handle names a live entity.
    #[must_use]
    pub fn contains(&self, handle: EntityHandle) -> bool {
        self.live.read().allocator.is_alive(handle)
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.read().allocator.len()
    }

    /// Returns true if there are no live entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of queued creations and destructions.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Number of flushes that changed the live set.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Live entity handles, in handle order.
    #[must_use]
    pub fn entities(&self) -> Vec<EntityHandle> {
        self.live.read().records.keys().copied().collect()
    }
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("live", &self.len())
            .field("pending", &self.pending_len())
            .field("columns", &self.columns.read().len())
            .field(
                "data_blocks",
                &self.columns.read().values().map(|c| c.len()).sum::<usize>(),
            )
            .field("version", &self.version())
            .finish()
    }
}

fn downcast<K: Send + Sync + 'static>(erased: &dyn ErasedColumn) -> SharedColumn<K> {
    match erased.as_any().downcast_ref::<Column<K>>() {
        Some(column) => Arc::clone(&column.data),
        // Columns are keyed by `TypeId::of::<K>()`, so the downcast cannot miss.
        None => unreachable!("column registered under the wrong type id"),
    }
}

// =============================================================================
// Tests
// =============================================================================
