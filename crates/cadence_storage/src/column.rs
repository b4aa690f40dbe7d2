//! Per-kind data columns.
//!
//! Each data kind lives in its own column: an ordered map from handle to value
//! behind its own lock. Columns are shared through `Arc` so that views can
//! hold owned read guards independently of the store's other locks.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use cadence_foundation::EntityHandle;
use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock, RwLock};

/// Values of one kind keyed by entity, in handle order.
pub type ColumnData<K> = BTreeMap<EntityHandle, K>;

/// Owned read guard over a column.
pub type ColumnReadGuard<K> = ArcRwLockReadGuard<RawRwLock, ColumnData<K>>;

/// Owned write guard over a column.
pub type ColumnWriteGuard<K> = ArcRwLockWriteGuard<RawRwLock, ColumnData<K>>;

pub(crate) type SharedColumn<K> = Arc<RwLock<ColumnData<K>>>;

/// Type-erased column operations the store needs without knowing `K`.
pub(crate) trait ErasedColumn: Send + Sync {
    /// Drops the value attached to `handle`, if any.
    fn remove(&self, handle: EntityHandle) -> bool;

    /// Number of attached values.
    fn len(&self) -> usize;

    fn as_any(&self) -> &dyn Any;
}

pub(crate) struct Column<K> {
    pub(crate) data: SharedColumn<K>,
}

impl<K: Send + Sync + 'static> Column<K> {
    pub(crate) fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }
}

impl<K: Send + Sync + 'static> ErasedColumn for Column<K> {
    fn remove(&self, handle: EntityHandle) -> bool {
        self.data.write().remove(&handle).is_some()
    }

    fn len(&self) -> usize {
        self.data.read().len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
