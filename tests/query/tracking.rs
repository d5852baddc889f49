//! Integration tests for change-tracking queries
//!
//! Tests added/removed/changed terms and per-query cursors.

use trellis_foundation::Value;
use trellis_storage::{Query, WorldConfig};

use crate::kit;

// =============================================================================
// Added
// =============================================================================

#[test]
fn added_reports_each_entity_once() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let q = Query::new().added(&k.position);
    // The first evaluation starts the cursor.
    assert!(world.query(&q).is_empty());

    let a = world.spawn([&k.position]).unwrap();
    let b = world.spawn_empty().unwrap();
    world.add(b, &k.position).unwrap();
    world.spawn([&k.velocity]).unwrap();

    let hits = world.query(&q);
    assert_eq!(hits.len(), 2);
    assert!(hits.contains(a));
    assert!(hits.contains(b));
    assert!(world.query(&q).is_empty());
}

#[test]
fn added_then_removed_is_not_reported() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let q = Query::new().added(&k.position);
    world.query(&q);

    let e = world.spawn([&k.position]).unwrap();
    world.remove(e, &k.position).unwrap();
    assert!(world.query(&q).is_empty());
}

// =============================================================================
// Removed
// =============================================================================

#[test]
fn removed_reports_live_entities_without_the_trait() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let q = Query::new().removed(&k.frozen);
    let a = world.spawn([&k.frozen]).unwrap();
    let b = world.spawn([&k.frozen]).unwrap();
    world.query(&q);

    world.remove(a, &k.frozen).unwrap();
    world.destroy_entity(b).unwrap();

    assert_eq!(world.query(&q).as_slice(), &[a]);
    assert!(world.query(&q).is_empty());
}

// =============================================================================
// Changed
// =============================================================================

#[test]
fn changed_tracks_writes() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let a = world.spawn([&k.position]).unwrap();
    let b = world.spawn([&k.position]).unwrap();
    let q = Query::new().changed(&k.position);
    world.query(&q);

    world.set(a, &k.position, Value::record([("x", 1.0)])).unwrap();
    world.set(a, &k.position, Value::record([("x", 2.0)])).unwrap();
    let x = k.position.field("x").unwrap();
    world.set_field(b, &k.position, x, 5.0).unwrap();

    let hits = world.query(&q);
    assert_eq!(hits.len(), 2);
    assert!(world.query(&q).is_empty());

    world.mark_changed(b, &k.position).unwrap();
    assert_eq!(world.query(&q).as_slice(), &[b]);
}

#[test]
fn changed_combines_with_filters() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let a = world.spawn([&k.position]).unwrap();
    let b = world.spawn([&k.position, &k.frozen]).unwrap();
    let q = Query::new().changed(&k.position).without(&k.frozen);
    world.query(&q);

    world.mark_changed(a, &k.position).unwrap();
    world.mark_changed(b, &k.position).unwrap();
    assert_eq!(world.query(&q).as_slice(), &[a]);
}

// =============================================================================
// Cursors
// =============================================================================

#[test]
fn queries_keep_independent_cursors() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let early = Query::new().added(&k.position);
    let late = Query::new().added(&k.position).with(&k.position);
    world.query(&early);

    let a = world.spawn([&k.position]).unwrap();
    world.query(&late);
    let b = world.spawn([&k.position]).unwrap();

    let from_early = world.query(&early);
    assert_eq!(from_early.len(), 2);
    assert!(from_early.contains(a));
    assert_eq!(world.query(&late).as_slice(), &[b]);
}

#[test]
fn non_tracking_queries_do_not_drain() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let tracking = Query::new().added(&k.velocity);
    world.query(&tracking);
    world.spawn([&k.velocity]).unwrap();

    assert_eq!(world.query(&Query::new().with(&k.velocity)).len(), 1);
    assert_eq!(world.query(&tracking).len(), 1);
}
