//! Entity handles with generational indices.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identifier of a world inside a universe.
///
/// Only four bits are available in the packed [`Entity`] handle, so at most
/// [`WorldId::MAX_WORLDS`] worlds can be alive at once.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorldId(u8);

impl WorldId {
    /// Hard ceiling on simultaneously live worlds.
    pub const MAX_WORLDS: u8 = 16;

    /// Creates a world id, returning `None` if it does not fit in four bits.
    #[must_use]
    pub const fn new(id: u8) -> Option<Self> {
        if id < Self::MAX_WORLDS {
            Some(Self(id))
        } else {
            None
        }
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "world#{}", self.0)
    }
}

const INDEX_BITS: u32 = 32;
const GENERATION_BITS: u32 = 16;
const WORLD_BITS: u32 = 4;

const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;
const GENERATION_MASK: u64 = (1 << GENERATION_BITS) - 1;
const WORLD_MASK: u64 = (1 << WORLD_BITS) - 1;

const GENERATION_SHIFT: u32 = INDEX_BITS;
const WORLD_SHIFT: u32 = INDEX_BITS + GENERATION_BITS;

/// Opaque entity handle.
///
/// Packs `(index, generation, world)` into a single `u64`:
///
/// ```text
/// bits  0..32  index into the world's entity index
/// bits 32..48  generation of that index when the handle was issued
/// bits 48..52  world id
/// ```
///
/// A handle is only valid while its generation matches the live generation
/// at its index. Destroying an entity bumps the generation, and an index
/// whose generation would overflow is retired rather than reused, so
/// recycled indices never alias old handles.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Entity(u64);

impl Entity {
    /// Packs an entity handle.
    #[must_use]
    pub const fn new(index: u32, generation: u16, world: WorldId) -> Self {
        Self(
            (index as u64)
                | ((generation as u64) << GENERATION_SHIFT)
                | ((world.0 as u64) << WORLD_SHIFT),
        )
    }

    /// Index into the owning world's entity index.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index(self) -> u32 {
        (self.0 & INDEX_MASK) as u32
    }

    /// Generation the handle was issued with.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn generation(self) -> u16 {
        ((self.0 >> GENERATION_SHIFT) & GENERATION_MASK) as u16
    }

    /// World the entity belongs to.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn world(self) -> WorldId {
        WorldId(((self.0 >> WORLD_SHIFT) & WORLD_MASK) as u8)
    }

    /// Returns the packed representation.
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        self.0
    }

    /// Rebuilds a handle from its packed representation.
    ///
    /// Bits above the world field are discarded.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits & ((1 << (WORLD_SHIFT + WORLD_BITS)) - 1))
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Entity({}v{}@{})",
            self.index(),
            self.generation(),
            self.world().get()
        )
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.index())
    }
}
