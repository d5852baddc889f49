//! Integration tests for Layer 1: Storage
//!
//! Tests for entity lifecycle, trait data, relations, observation, and worlds.

mod relations;
mod worlds;

use trellis_storage::{Trait, TraitSchema, Universe};

/// Traits shared across the storage tests.
pub struct Kit {
    pub universe: Universe,
    pub position: Trait,
    pub health: Trait,
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
    let health = universe
        .define(
            TraitSchema::new("Health")
                .with_default("hp", 100)
                .with_default("max", 100),
        )
        .unwrap();
    let frozen = universe.define(TraitSchema::tag("Frozen")).unwrap();
    let child_of = universe
        .define(
            TraitSchema::relation("ChildOf")
                .exclusive()
                .auto_remove_target(),
        )
        .unwrap();
    let likes = universe
        .define(TraitSchema::relation("Likes").with_default("amount", 1))
        .unwrap();
    Kit {
        universe,
        position,
        health,
        frozen,
        child_of,
        likes,
    }
}
