//! Integration tests for queries
//!
//! Tests for query matching, caching, change tracking, and iteration.

mod caching;
mod matching;
mod tracking;

use trellis_storage::{Trait, TraitSchema, Universe};

/// Traits shared across the query tests.
pub struct Kit {
    pub universe: Universe,
    pub position: Trait,
    pub velocity: Trait,
    pub frozen: Trait,
    pub child_of: Trait,
    pub likes: Trait,
}

pub fn kit() -> Kit {
    let universe = Universe::new();
    let position = universe
        .define(
            TraitSchema::new("Position")
                .with_default("x", 0.0)
                .with_default("y", 0.0),
        )
        .unwrap();
    let velocity = universe
        .define(TraitSchema::new("Velocity").with_default("dx", 1.0))
        .unwrap();
    let frozen = universe.define(TraitSchema::tag("Frozen")).unwrap();
    let child_of = universe
        .define(TraitSchema::relation("ChildOf").auto_remove_target())
        .unwrap();
    let likes = universe.define(TraitSchema::relation("Likes")).unwrap();
    Kit {
        universe,
        position,
        velocity,
        frozen,
        child_of,
        likes,
    }
}
