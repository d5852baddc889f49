//! Entity lifecycle management with generational indices.
//!
//! The `EntityIndex` allocates entity handles, tracks generations to detect
//! stale references, and records where each live entity is stored.

use trellis_foundation::{CapacityLimit, Entity, Error, Result, WorldId};

use crate::composition::CompositionId;

/// Where a live entity's row lives.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Location {
    /// The composition holding the entity.
    pub composition: CompositionId,
    /// Row inside that composition.
    pub slot: usize,
}

/// Allocates entity handles for one world.
///
/// Indices are recycled through a free list; each destroy bumps the
/// generation at that index so that old handles stop resolving. An index
/// whose generation has reached `u16::MAX` is retired instead of reused,
/// so a handle never aliases a later entity.
#[derive(Debug, Clone)]
pub struct EntityIndex {
    world: WorldId,
    /// Current generation for each index.
    generations: Vec<u16>,
    /// Location of each live index; `None` when free.
    locations: Vec<Option<Location>>,
    /// Free indices available for reuse.
    free_list: Vec<u32>,
    /// Indices whose generation space is exhausted.
    retired: usize,
    live_count: usize,
}

impl EntityIndex {
    /// Creates an empty index for `world`.
    #[must_use]
    pub fn new(world: WorldId, capacity: usize) -> Self {
        Self {
            world,
            generations: Vec::with_capacity(capacity),
            locations: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            retired: 0,
            live_count: 0,
        }
    }

    /// Allocates a handle stored at `location`.
    ///
    /// Reuses indices from the free list when available.
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` once the 32-bit index space is exhausted.
    pub fn spawn(&mut self, location: Location) -> Result<Entity> {
        let index = if let Some(index) = self.free_list.pop() {
            self.locations[index as usize] = Some(location);
            index
        } else {
            let index = u32::try_from(self.generations.len()).map_err(|_| {
                Error::capacity_exceeded(CapacityLimit::Entities { limit: u32::MAX })
            })?;
            self.generations.push(0);
            self.locations.push(Some(location));
            index
        };
        self.live_count += 1;
        Ok(Entity::new(index, self.generations[index as usize], self.world))
    }

    /// Releases a handle. Returns false if it was already stale.
    pub fn free(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let idx = entity.index() as usize;
        self.locations[idx] = None;
        if self.bump(idx) {
            self.free_list.push(entity.index());
        }
        self.live_count -= 1;
        true
    }

    /// Advances the generation at `idx`. Returns false, retiring the
    /// index, when no unused generation remains.
    fn bump(&mut self, idx: usize) -> bool {
        match self.generations[idx].checked_add(1) {
            Some(next) => {
                self.generations[idx] = next;
                true
            }
            None => {
                self.retired += 1;
                false
            }
        }
    }

    /// Checks that the handle belongs to this world and is current.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        let idx = entity.index() as usize;
        entity.world() == self.world
            && self.generations.get(idx) == Some(&entity.generation())
            && self.locations[idx].is_some()
    }

    /// Returns the location of a live entity.
    #[must_use]
    pub fn locate(&self, entity: Entity) -> Option<Location> {
        if self.is_alive(entity) {
            self.locations[entity.index() as usize]
        } else {
            None
        }
    }

    /// Updates the location of a live entity.
    pub fn relocate(&mut self, entity: Entity, location: Location) {
        debug_assert!(self.is_alive(entity), "relocating dead entity {entity:?}");
        if let Some(slot) = self.locations.get_mut(entity.index() as usize) {
            *slot = Some(location);
        }
    }

    /// Frees every live handle.
    pub fn clear(&mut self) {
        let mut free = std::mem::take(&mut self.free_list);
        for idx in 0..self.locations.len() {
            if self.locations[idx].take().is_some() && self.bump(idx) {
                free.extend(u32::try_from(idx).ok());
            }
        }
        // Lowest indices are reused first after a clear.
        free.sort_unstable_by(|a, b| b.cmp(a));
        self.free_list = free;
        self.live_count = 0;
    }

    /// Number of indices retired because their generations ran out.
    #[must_use]
    pub fn retired(&self) -> usize {
        self.retired
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live_count
    }

    /// Returns true if no entity is alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// The world this index allocates for.
    #[must_use]
    pub fn world(&self) -> WorldId {
        self.world
    }

    /// Iterates live handles in index order.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.locations
            .iter()
            .zip(&self.generations)
            .enumerate()
            .filter(|(_, (location, _))| location.is_some())
            .filter_map(|(idx, (_, generation))| {
                u32::try_from(idx)
                    .ok()
                    .map(|i| Entity::new(i, *generation, self.world))
            })
    }
}
