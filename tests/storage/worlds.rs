//! Integration tests for worlds and universes
//!
//! Tests world id allocation, singletons, reset, and cross-universe isolation.

use trellis_foundation::{CapacityLimit, ErrorKind, Value, WorldId};
use trellis_storage::{Query, TraitSchema, Universe, WorldConfig};

use crate::kit;

// =============================================================================
// World Ids
// =============================================================================

#[test]
fn sixteen_worlds_at_most() {
    let universe = Universe::new();
    let worlds: Vec<_> = (0..WorldId::MAX_WORLDS)
        .map(|_| universe.create_world(WorldConfig::default()).unwrap())
        .collect();
    assert_eq!(universe.live_worlds(), 16);

    let err = universe.create_world(WorldConfig::default()).unwrap_err();
    assert!(matches!(
        err.kind,
        ErrorKind::CapacityExceeded(CapacityLimit::Worlds { limit: 16 })
    ));

    drop(worlds);
    assert_eq!(universe.live_worlds(), 0);
}

#[test]
fn destroyed_world_id_is_reused() {
    let universe = Universe::with_max_worlds(1);
    let world = universe.create_world(WorldConfig::default()).unwrap();
    let id = world.id();
    world.destroy();

    let again = universe.create_world(WorldConfig::default()).unwrap();
    assert_eq!(again.id(), id);
}

#[test]
fn next_world_does_not_inherit_handles_of_a_destroyed_one() {
    let universe = Universe::new();
    let mut old = universe.create_world(WorldConfig::default()).unwrap();
    let stale = old.spawn_empty().unwrap();
    old.destroy();

    let mut fresh = universe.create_world(WorldConfig::default()).unwrap();
    let e = fresh.spawn_empty().unwrap();
    assert_ne!(fresh.id(), stale.world());
    assert!(!fresh.is_alive(stale));
    assert_ne!(e, stale);
}

#[test]
fn worlds_are_isolated() {
    let k = kit();
    let mut a = k.universe.create_world(WorldConfig::default()).unwrap();
    let mut b = k.universe.create_world(WorldConfig::default()).unwrap();
    let e = a.spawn([&k.position]).unwrap();
    b.spawn([&k.position]).unwrap();
    b.spawn([&k.position]).unwrap();

    let q = Query::new().with(&k.position);
    assert_eq!(a.query(&q).len(), 1);
    assert_eq!(b.query(&q).len(), 2);
    assert!(!b.is_alive(e));
    assert_eq!(b.get(e, &k.position), None);
}

// =============================================================================
// Universes
// =============================================================================

#[test]
fn foreign_traits_are_rejected() {
    let k = kit();
    let other = Universe::new();
    let alien = other.define(TraitSchema::tag("Alien")).unwrap();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let e = world.spawn_empty().unwrap();

    let err = world.add(e, &alien).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidArgument(_)));
    assert!(world.spawn([&alien]).is_err());
    assert!(!world.has(e, &alien));
}

#[test]
fn universe_reset_requires_no_live_worlds() {
    let k = kit();
    let world = k.universe.create_world(WorldConfig::default()).unwrap();
    assert!(k.universe.reset().is_err());

    drop(world);
    k.universe.reset().unwrap();
    assert_eq!(k.universe.trait_count(), 0);
    assert!(k.universe.trait_by_name("Position").is_none());

    // Handles from before the reset belong to no universe.
    let mut fresh = k.universe.create_world(WorldConfig::default()).unwrap();
    let e = fresh.spawn_empty().unwrap();
    assert!(fresh.add(e, &k.position).is_err());
}

// =============================================================================
// Singletons
// =============================================================================

#[test]
fn singletons_live_on_hidden_entity() {
    let k = kit();
    let mut world = k
        .universe
        .create_world_with(
            WorldConfig::default(),
            [k.health.with(Value::record([("hp", 5)]))],
        )
        .unwrap();

    assert!(world.has_singleton(&k.health));
    assert_eq!(
        world.get_singleton(&k.health),
        Some(Value::record([("hp", 5), ("max", 100)]))
    );
    assert_eq!(world.entity_count(), 0);
    assert!(world.query(&Query::new().with(&k.health)).is_empty());

    world
        .update_singleton(&k.health, |v| {
            let hp = v.field("hp").and_then(Value::as_int).unwrap_or(0);
            Value::record([("hp", hp + 1)])
        })
        .unwrap();
    assert_eq!(
        world.get_singleton(&k.health).and_then(|v| v.field("hp").cloned()),
        Some(Value::Int(6))
    );

    world.add_singleton(&k.frozen).unwrap();
    world.remove_singleton(&k.frozen).unwrap();
    assert!(!world.has_singleton(&k.frozen));
}

// =============================================================================
// Reset
// =============================================================================

#[test]
fn reset_clears_entities_and_reseeds() {
    let k = kit();
    let mut world = k
        .universe
        .create_world_with(WorldConfig::default(), [&k.health])
        .unwrap();
    let id = world.id();
    let star = world.spawn_empty().unwrap();
    let fan = world.spawn([k.likes.pair(star)]).unwrap();
    world.set_singleton(&k.health, Value::record([("hp", 1)])).unwrap();

    world.reset().unwrap();
    assert_eq!(world.id(), id);
    assert_eq!(world.entity_count(), 0);
    assert!(!world.is_alive(star));
    assert!(!world.is_alive(fan));
    assert_eq!(
        world.get_singleton(&k.health),
        Some(Value::record([("hp", 100), ("max", 100)]))
    );

    // New handles never alias old ones.
    let again = world.spawn_empty().unwrap();
    assert_ne!(again, star);
    assert_ne!(again, fan);
}

#[test]
fn cached_queries_survive_reset() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let q = Query::new().with(&k.position);
    world.spawn([&k.position]).unwrap();
    assert_eq!(world.query(&q).len(), 1);

    world.reset().unwrap();
    assert!(world.query(&q).is_empty());
    world.spawn([&k.position]).unwrap();
    assert_eq!(world.query(&q).len(), 1);
    assert_eq!(world.query_count(), 1);
}
