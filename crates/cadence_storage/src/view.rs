//! Queries over data columns.
//!
//! A [`View`] holds read guards on every column its query names, so the data
//! it yields cannot change underneath it. Iteration is lazy and can be
//! restarted any number of times; each pass yields entities in handle order.
//!
//! Views and column writes on the same kind exclude each other. A view takes
//! its column locks in ascending `TypeId` order, whatever order the tuple
//! names the kinds in, so overlapping views and writes on other threads can
//! always make progress. That holds only for one guard at a time: a caller
//! that keeps a view or [`DataWrite`] alive while asking for another can still
//! wait on itself. Read several kinds through one view instead.
//!
//! Guards borrow the store they came from and must be dropped before the
//! owning runtime flushes; a flush waits for every column lock.

use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;

use cadence_foundation::EntityHandle;

use crate::column::{ColumnReadGuard, ColumnWriteGuard};
use crate::store::EntityStore;

/// A tuple of data kinds that can be viewed together.
///
/// Implemented for tuples of one to four distinct kinds. Naming a kind twice
/// panics when the view is taken.
pub trait Query: 'static {
    /// Read guards for each column.
    type Guards;

    /// What one entity yields: a tuple of shared references.
    type Item<'a>;

    /// Acquires read guards on every column of the query, in `TypeId` order.
    ///
    /// # Panics
    ///
    /// Panics if the query names the same kind twice.
    fn acquire(store: &EntityStore) -> Self::Guards;

    /// The entity's data, if it carries every kind.
    fn fetch(guards: &Self::Guards, handle: EntityHandle) -> Option<Self::Item<'_>>;

    /// Handles of the smallest column; every match is among them.
    fn candidates(guards: &Self::Guards) -> Box<dyn Iterator<Item = EntityHandle> + '_>;
}

macro_rules! impl_query {
    ($($kind:ident $idx:tt),+) => {
        impl<$($kind: Send + Sync + 'static),+> Query for ($($kind,)+) {
            type Guards = ($(ColumnReadGuard<$kind>,)+);
            type Item<'a> = ($(&'a $kind,)+);

            fn acquire(store: &EntityStore) -> Self::Guards {
                // Resolve every column before locking any of them.
                let columns = ($(store.column::<$kind>(),)+);
                let mut order: Vec<(TypeId, usize)> = vec![$((TypeId::of::<$kind>(), $idx)),+];
                order.sort_unstable();
                assert!(
                    order.windows(2).all(|pair| pair[0].0 != pair[1].0),
                    "query names the same data kind twice"
                );

                let mut slots = ($(None::<ColumnReadGuard<$kind>>,)+);
                for (_, idx) in order {
                    match idx {
                        $($idx => slots.$idx = Some(columns.$idx.read_arc()),)+
                        _ => unreachable!("query position out of range"),
                    }
                }
                ($(filled(slots.$idx),)+)
            }

            fn fetch(guards: &Self::Guards, handle: EntityHandle) -> Option<Self::Item<'_>> {
                Some(($(guards.$idx.get(&handle)?,)+))
            }

            fn candidates(guards: &Self::Guards) -> Box<dyn Iterator<Item = EntityHandle> + '_> {
                let lens = [$(guards.$idx.len()),+];
                let smallest = lens
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, len)| **len)
                    .map_or(0, |(i, _)| i);
                $(
                    if smallest == $idx {
                        return Box::new(guards.$idx.keys().copied());
                    }
                )+
                Box::new(std::iter::empty())
            }
        }
    };
}

fn filled<T>(slot: Option<T>) -> T {
    slot.unwrap_or_else(|| unreachable!("every query column is locked before returning"))
}

impl_query!(A 0);
impl_query!(A 0, B 1);
impl_query!(A 0, B 1, C 2);
impl_query!(A 0, B 1, C 2, D 3);

/// Read-only snapshot over every entity carrying all kinds of `Q`.
///
/// Borrows the store (or [`EntityAccess`](crate::EntityAccess)) it was taken
/// from, so a unit cannot keep one in its own state across ticks.
pub struct View<'s, Q: Query> {
    guards: Q::Guards,
    version: u64,
    _store: PhantomData<&'s EntityStore>,
}

impl<'s, Q: Query> View<'s, Q> {
    pub(crate) fn new(store: &'s EntityStore) -> Self {
        let version = store.version();
        Self {
            guards: Q::acquire(store),
            version,
            _store: PhantomData,
        }
    }

    /// Matching entities and their data, in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityHandle, Q::Item<'_>)> + '_ {
        Q::candidates(&self.guards)
            .filter_map(|handle| Q::fetch(&self.guards, handle).map(|item| (handle, item)))
    }

    /// Matching entity handles, in handle order.
    pub fn handles(&self) -> impl Iterator<Item = EntityHandle> + '_ {
        self.iter().map(|(handle, _)| handle)
    }

    /// Data for one entity, if it matches.
    #[must_use]
    pub fn get(&self, handle: EntityHandle) -> Option<Q::Item<'_>> {
        Q::fetch(&self.guards, handle)
    }

    /// Number of matching entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    /// Returns true if no entity matches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Store version captured when the view was created.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl<Q: Query> fmt::Debug for View<'_, Q> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("version", &self.version)
            .field("len", &self.len())
            .finish()
    }
}

/// Exclusive access to one data column.
///
/// Only values can be changed: attaching and detaching go through the store.
/// Like [`View`], it borrows the store it came from.
pub struct DataWrite<'s, K: Send + Sync + 'static> {
    guard: ColumnWriteGuard<K>,
    _store: PhantomData<&'s EntityStore>,
}

impl<K: Send + Sync + 'static> DataWrite<'_, K> {
    pub(crate) fn new(guard: ColumnWriteGuard<K>) -> Self {
        Self {
            guard,
            _store: PhantomData,
        }
    }

    /// Shared access to one entity's value.
    #[must_use]
    pub fn get(&self, handle: EntityHandle) -> Option<&K> {
        self.guard.get(&handle)
    }

    /// Mutable access to one entity's value.
    pub fn get_mut(&mut self, handle: EntityHandle) -> Option<&mut K> {
        self.guard.get_mut(&handle)
    }

    /// All values, in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityHandle, &K)> + '_ {
        self.guard.iter().map(|(handle, value)| (*handle, value))
    }

    /// All values mutably, in handle order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityHandle, &mut K)> + '_ {
        self.guard.iter_mut().map(|(handle, value)| (*handle, value))
    }

    /// Number of entities carrying this kind.
    #[must_use]
    pub fn len(&self) -> usize {
        self.guard.len()
    }

    /// Returns true if no entity carries this kind.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guard.is_empty()
    }
}

impl<K: Send + Sync + 'static> fmt::Debug for DataWrite<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataWrite")
            .field("kind", &std::any::type_name::<K>())
            .field("len", &self.guard.len())
            .finish()
    }
}
