//! Integration tests for relations
//!
//! Tests pairs, exclusivity, reverse lookup, and cascading destruction.

use trellis_foundation::{ErrorKind, Value};
use trellis_storage::{TraitSchema, Universe, WorldConfig};

use crate::kit;

// =============================================================================
// Pairs
// =============================================================================

#[test]
fn pairs_are_distinct_per_target() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let apple = world.spawn_empty().unwrap();
    let pear = world.spawn_empty().unwrap();
    let fan = world
        .spawn([k.likes.pair(apple).with(Value::record([("amount", 3)]))])
        .unwrap();
    world.add(fan, k.likes.pair(pear)).unwrap();

    assert!(world.has(fan, k.likes.pair(apple)));
    assert!(world.has(fan, k.likes.pair(pear)));
    assert!(world.has(fan, &k.likes));
    assert_eq!(world.targets_for(fan, &k.likes), {
        let mut both = vec![apple, pear];
        both.sort_unstable();
        both
    });
    assert_eq!(
        world.get(fan, k.likes.pair(apple)),
        Some(Value::record([("amount", 3)]))
    );
    assert_eq!(
        world.get(fan, k.likes.pair(pear)),
        Some(Value::record([("amount", 1)]))
    );
}

#[test]
fn removing_one_pair_keeps_the_rest() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let a = world.spawn_empty().unwrap();
    let b = world.spawn_empty().unwrap();
    let fan = world.spawn([k.likes.pair(a), k.likes.pair(b)]).unwrap();

    world.remove(fan, k.likes.pair(a)).unwrap();
    assert!(!world.has(fan, k.likes.pair(a)));
    assert!(world.has(fan, &k.likes));
    assert_eq!(world.target_for(fan, &k.likes), Some(b));

    world.remove(fan, k.likes.pair(b)).unwrap();
    assert!(!world.has(fan, &k.likes));
    assert!(world.traits_of(fan).is_empty());
}

#[test]
fn relation_needs_live_target() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let e = world.spawn_empty().unwrap();

    let err = world.add(e, &k.likes).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::InvalidArgument(_)));

    let gone = world.spawn_empty().unwrap();
    world.destroy_entity(gone).unwrap();
    assert!(world.add(e, k.likes.pair(gone)).is_err());
}

#[test]
fn exclusive_relation_keeps_one_target() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let first = world.spawn_empty().unwrap();
    let second = world.spawn_empty().unwrap();
    let child = world.spawn([k.child_of.pair(first)]).unwrap();

    world.add(child, k.child_of.pair(second)).unwrap();
    assert_eq!(world.targets_for(child, &k.child_of), vec![second]);
    assert!(world.holders_of(first).is_empty());
    assert_eq!(world.holders_of(second), vec![child]);
}

#[test]
fn reverse_lookup_tracks_holders() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let star = world.spawn_empty().unwrap();
    let fans: Vec<_> = (0..4)
        .map(|_| world.spawn([k.likes.pair(star)]).unwrap())
        .collect();

    assert_eq!(world.sources_of(&k.likes, star), fans);
    world.remove(fans[0], &k.likes).unwrap();
    assert_eq!(world.sources_of(&k.likes, star).len(), 3);
    assert!(world.sources_of(&k.child_of, star).is_empty());
}

// =============================================================================
// Target Destruction
// =============================================================================

#[test]
fn destroying_target_strips_plain_pairs() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let star = world.spawn_empty().unwrap();
    let fan = world.spawn([k.likes.pair(star).into(), k.position.instance()]).unwrap();

    world.destroy_entity(star).unwrap();
    assert!(world.is_alive(fan));
    assert!(!world.has(fan, &k.likes));
    assert!(world.has(fan, &k.position));
    assert!(world.holders_of(star).is_empty());
}

#[test]
fn cascade_destroys_chain() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let mut chain = vec![world.spawn_empty().unwrap()];
    for _ in 0..50 {
        let parent = *chain.last().unwrap();
        chain.push(world.spawn([k.child_of.pair(parent)]).unwrap());
    }
    let other = world.spawn_empty().unwrap();

    world.destroy_entity(chain[0]).unwrap();
    assert!(chain.iter().all(|e| !world.is_alive(*e)));
    assert!(world.is_alive(other));
    assert_eq!(world.entity_count(), 1);
}

#[test]
fn cascade_handles_diamonds() {
    let universe = Universe::new();
    let depends = universe
        .define(TraitSchema::relation("DependsOn").auto_remove_target())
        .unwrap();
    let mut world = universe.create_world(WorldConfig::default()).unwrap();
    let root = world.spawn_empty().unwrap();
    let left = world.spawn([depends.pair(root)]).unwrap();
    let right = world.spawn([depends.pair(root)]).unwrap();
    let bottom = world.spawn([depends.pair(left), depends.pair(right)]).unwrap();

    world.destroy_entity(root).unwrap();
    for e in [root, left, right, bottom] {
        assert!(!world.is_alive(e));
    }
    assert_eq!(world.entity_count(), 0);
}

#[test]
fn cascade_handles_cycles() {
    let universe = Universe::new();
    let bound = universe
        .define(TraitSchema::relation("Bound").auto_remove_target())
        .unwrap();
    let mut world = universe.create_world(WorldConfig::default()).unwrap();
    let a = world.spawn_empty().unwrap();
    let b = world.spawn([bound.pair(a)]).unwrap();
    let c = world.spawn([bound.pair(b)]).unwrap();
    world.add(a, bound.pair(c)).unwrap();

    world.destroy_entity(b).unwrap();
    assert_eq!(world.entity_count(), 0);
}

#[test]
fn dead_target_compositions_are_retired() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let star = world.spawn_empty().unwrap();
    world.spawn([k.likes.pair(star)]).unwrap();

    assert!(world
        .compositions()
        .iter()
        .any(|c| c.keys.iter().any(|key| key.target() == Some(star))));
    world.destroy_entity(star).unwrap();
    assert!(world
        .compositions()
        .iter()
        .all(|c| c.keys.iter().all(|key| key.target() != Some(star))));
}
