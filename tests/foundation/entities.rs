//! Integration tests for entity handles
//!
//! Tests bit packing, ordering, and world id bounds.

use std::collections::HashSet;
use trellis_foundation::{Entity, WorldId};

fn world(id: u8) -> WorldId {
    WorldId::new(id).unwrap()
}

// =============================================================================
// World Ids
// =============================================================================

#[test]
fn world_ids_fit_four_bits() {
    assert_eq!(WorldId::MAX_WORLDS, 16);
    assert!(WorldId::new(0).is_some());
    assert!(WorldId::new(15).is_some());
    assert!(WorldId::new(16).is_none());
    assert!(WorldId::new(u8::MAX).is_none());
}

#[test]
fn world_id_display() {
    assert_eq!(world(3).to_string(), "world#3");
}

// =============================================================================
// Packing
// =============================================================================

#[test]
fn packed_fields_round_trip() {
    let e = Entity::new(u32::MAX, u16::MAX, world(15));
    assert_eq!(e.index(), u32::MAX);
    assert_eq!(e.generation(), u16::MAX);
    assert_eq!(e.world(), world(15));
    assert_eq!(Entity::from_bits(e.to_bits()), e);
}

#[test]
fn generation_distinguishes_handles() {
    let old = Entity::new(7, 0, world(0));
    let new = Entity::new(7, 1, world(0));
    assert_ne!(old, new);
    assert_eq!(old.index(), new.index());
}

#[test]
fn world_distinguishes_handles() {
    let a = Entity::new(7, 0, world(0));
    let b = Entity::new(7, 0, world(1));
    assert_ne!(a, b);

    let set: HashSet<_> = [a, b].into_iter().collect();
    assert_eq!(set.len(), 2);
}

#[test]
fn debug_names_every_part() {
    let e = Entity::new(4, 2, world(1));
    assert_eq!(format!("{e:?}"), "Entity(4v2@1)");
    assert_eq!(e.to_string(), "Entity(4)");
}
