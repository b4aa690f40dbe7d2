//! Generational handle allocation.
//!
//! Slots are recycled through a free list. Each slot carries a generation
//! counter: odd means the slot is occupied, even means it is free. Releasing a
//! slot bumps the generation, so every handle issued for the previous occupant
//! becomes stale.

use cadence_foundation::{EntityHandle, Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Allocates and validates [`EntityHandle`]s.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HandleAllocator {
    generations: Vec<u32>,
    free: Vec<u32>,
    live: usize,
}

impl HandleAllocator {
    /// Creates an empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh handle, recycling a released slot if one is available.
    ///
    /// # Errors
    ///
    /// Returns an error if the index space is exhausted.
    pub fn allocate(&mut self) -> Result<EntityHandle> {
        let handle = if let Some(index) = self.free.pop() {
            let generation = &mut self.generations[index as usize];
            *generation = generation.wrapping_add(1);
            EntityHandle::new(index, *generation)
        } else {
            let index = u32::try_from(self.generations.len())
                .ok()
                .filter(|&i| i != u32::MAX)
                .ok_or_else(|| Error::invalid_state("allocate entity", "handle space exhausted"))?;
            self.generations.push(1);
            EntityHandle::new(index, 1)
        };
        self.live += 1;
        Ok(handle)
    }

    /// Releases a live handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the handle is stale or was never issued.
    pub fn release(&mut self, handle: EntityHandle) -> Result<()> {
        self.validate(handle)?;
        let generation = &mut self.generations[handle.index as usize];
        *generation = generation.wrapping_add(1);
        self.free.push(handle.index);
        self.live -= 1;
        Ok(())
    }

    /// Returns true if the handle names a live slot.
    #[must_use]
    pub fn is_alive(&self, handle: EntityHandle) -> bool {
        self.validate(handle).is_ok()
    }

    /// Checks that a handle is live.
    ///
    /// # Errors
    ///
    /// `UnknownEntity` if the slot was never issued or is currently free,
    /// `StaleEntity` if the slot has since been reissued.
    pub fn validate(&self, handle: EntityHandle) -> Result<()> {
        let Some(&current) = self.generations.get(handle.index as usize) else {
            return Err(Error::unknown_entity(handle));
        };
        if current != handle.generation {
            return Err(Error::stale_entity(handle));
        }
        if current % 2 == 0 {
            return Err(Error::unknown_entity(handle));
        }
        Ok(())
    }

    /// Number of live handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns true if no handle is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Live handles in index order.
    pub fn iter(&self) -> impl Iterator<Item = EntityHandle> + '_ {
        self.generations
            .iter()
            .zip(0u32..)
            .filter(|(generation, _)| *generation % 2 == 1)
            .map(|(generation, index)| EntityHandle::new(index, *generation))
    }

    /// Current generation of a slot, if the slot was ever issued.
    #[must_use]
    pub fn generation(&self, index: u32) -> Option<u32> {
        self.generations.get(index as usize).copied()
    }
}
