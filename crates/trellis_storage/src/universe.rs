//! The universe: trait registry plus world id allocation.
//!
//! A [`Universe`] is an explicit value rather than process-global state.
//! Worlds created from the same universe share trait definitions; handles
//! from another universe are rejected.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use trellis_foundation::{CapacityLimit, Error, Result, WorldId};

use crate::config::WorldConfig;
use crate::registry::{Trait, TraitInstance, TraitRegistry};
use crate::schema::TraitSchema;
use crate::world::World;

struct WorldSlots {
    live: u16,
    max: u8,
    /// Where the next search for a free id starts.
    next: u8,
}

impl WorldSlots {
    /// Hands out free ids round-robin, so a just-released id is the last
    /// to be reused.
    fn acquire(&mut self) -> Option<WorldId> {
        (0..self.max)
            .map(|offset| (self.next + offset) % self.max)
            .find(|i| self.live & (1 << i) == 0)
            .and_then(|i| {
                self.live |= 1 << i;
                self.next = (i + 1) % self.max;
                WorldId::new(i)
            })
    }

    fn release(&mut self, id: WorldId) {
        self.live &= !(1 << id.get());
    }

    fn count(&self) -> usize {
        self.live.count_ones() as usize
    }
}

struct UniverseInner {
    registry: Mutex<TraitRegistry>,
    worlds: Mutex<WorldSlots>,
}

/// Shared trait registry and world id pool.
///
/// Cloning is cheap; all clones refer to the same universe.
#[derive(Clone)]
pub struct Universe {
    inner: Arc<UniverseInner>,
}

impl Default for Universe {
    fn default() -> Self {
        Self::new()
    }
}

impl Universe {
    /// Creates a universe allowing [`WorldId::MAX_WORLDS`] live worlds.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_worlds(WorldId::MAX_WORLDS)
    }

    /// Creates a universe with a lower world ceiling. Values above
    /// [`WorldId::MAX_WORLDS`] are clamped.
    #[must_use]
    pub fn with_max_worlds(max: u8) -> Self {
        Self {
            inner: Arc::new(UniverseInner {
                registry: Mutex::new(TraitRegistry::new()),
                worlds: Mutex::new(WorldSlots {
                    live: 0,
                    max: max.min(WorldId::MAX_WORLDS),
                    next: 0,
                }),
            }),
        }
    }

    /// Registers a trait.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateDefinition` if the name is taken, or
    /// `InvalidArgument` if the schema is malformed.
    pub fn define(&self, schema: TraitSchema) -> Result<Trait> {
        let handle = self.inner.registry.lock().define(schema)?;
        debug!(name = handle.name(), id = %handle.id(), "defined trait");
        Ok(handle)
    }

    /// Looks up a registered trait by name.
    #[must_use]
    pub fn trait_by_name(&self, name: &str) -> Option<Trait> {
        self.inner.registry.lock().by_name(name).cloned()
    }

    /// Number of registered traits.
    #[must_use]
    pub fn trait_count(&self) -> usize {
        self.inner.registry.lock().len()
    }

    /// Number of live worlds.
    #[must_use]
    pub fn live_worlds(&self) -> usize {
        self.inner.worlds.lock().count()
    }

    /// Creates and initializes a world.
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` if every world id is in use.
    pub fn create_world(&self, config: WorldConfig) -> Result<World> {
        self.create_world_with(config, std::iter::empty::<TraitInstance>())
    }

    /// Creates a world whose hidden world entity is seeded with singletons.
    ///
    /// Seeds are re-applied on every [`World::reset`].
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` if every world id is in use, or any error
    /// raised while adding a seed.
    pub fn create_world_with<I>(&self, config: WorldConfig, singletons: I) -> Result<World>
    where
        I: IntoIterator,
        I::Item: Into<TraitInstance>,
    {
        let id = {
            let mut slots = self.inner.worlds.lock();
            let max = slots.max;
            slots
                .acquire()
                .ok_or_else(|| Error::capacity_exceeded(CapacityLimit::Worlds { limit: max }))?
        };
        debug!(world = %id, "created world");
        let seeds = singletons.into_iter().map(Into::into).collect();
        let mut world = World::new(self.clone(), id, config, seeds);
        world.init()?;
        Ok(world)
    }

    /// Clears every trait definition.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` while any world is alive.
    pub fn reset(&self) -> Result<()> {
        // Holding the world slots keeps `create_world` out until the
        // registry is cleared.
        let slots = self.inner.worlds.lock();
        let live = slots.count();
        if live > 0 {
            return Err(Error::invalid_argument(format!(
                "cannot reset universe with {live} live worlds"
            )));
        }
        self.inner.registry.lock().clear();
        drop(slots);
        debug!("reset universe");
        Ok(())
    }

    pub(crate) fn owns(&self, handle: &Trait) -> bool {
        self.inner.registry.lock().owns(handle)
    }

    pub(crate) fn release_world(&self, id: WorldId) {
        self.inner.worlds.lock().release(id);
        debug!(world = %id, "released world");
    }
}

impl fmt::Debug for Universe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Universe")
            .field("traits", &self.trait_count())
            .field("live_worlds", &self.live_worlds())
            .finish()
    }
}
