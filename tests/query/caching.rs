//! Integration tests for query caching
//!
//! Tests cache identity, incremental composition matching, and retirement.

use trellis_storage::{Query, Selector, WorldConfig};

use crate::kit;

#[test]
fn identical_queries_share_a_cache_entry() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();

    world.query(&Query::new().with(&k.position).without(&k.frozen));
    world.query(&Query::new().without(&k.frozen).with(&k.position));
    world.query(&Query::new().with(&k.position).with(&k.position).without(&k.frozen));
    assert_eq!(world.query_count(), 1);

    world.query(&Query::new().with(&k.position));
    assert_eq!(world.query_count(), 2);
}

#[test]
fn cached_query_sees_new_compositions() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let q = Query::new().with(&k.position);
    world.spawn([&k.position]).unwrap();
    assert_eq!(world.query(&q).len(), 1);

    world.spawn([&k.position, &k.velocity]).unwrap();
    world.spawn([&k.position, &k.frozen]).unwrap();
    world.spawn([&k.velocity]).unwrap();
    assert_eq!(world.query(&q).len(), 3);
}

#[test]
fn cached_query_sees_structural_moves() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let q = Query::new().with(&k.position).without(&k.frozen);
    let e = world.spawn([&k.position]).unwrap();
    assert_eq!(world.query(&q).len(), 1);

    world.add(e, &k.frozen).unwrap();
    assert!(world.query(&q).is_empty());
    world.remove(e, &k.frozen).unwrap();
    assert_eq!(world.query(&q).first(), Some(e));
}

#[test]
fn retired_compositions_leave_the_cache() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let q = Query::new().with(Selector::any_target(&k.likes));
    let star = world.spawn_empty().unwrap();
    let fan = world.spawn([k.likes.pair(star)]).unwrap();
    assert_eq!(world.query(&q).as_slice(), &[fan]);

    world.destroy_entity(star).unwrap();
    assert!(world.query(&q).is_empty());

    // A new target gets a composition of its own.
    let next = world.spawn_empty().unwrap();
    world.add(fan, k.likes.pair(next)).unwrap();
    assert_eq!(world.query(&q).as_slice(), &[fan]);
}

#[test]
fn relation_churn_leaves_no_residue() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let baseline = world.composition_count();

    for _ in 0..1_000 {
        let parent = world.spawn_empty().unwrap();
        let child = world.spawn([k.child_of.pair(parent)]).unwrap();
        let children = Query::new().with(k.child_of.pair(parent));
        assert_eq!(world.query(&children).as_slice(), &[child]);
        world.destroy_entity(parent).unwrap();
        assert!(!world.is_alive(child));
    }

    assert_eq!(world.entity_count(), 0);
    assert_eq!(world.query_count(), 0);
    assert_eq!(world.composition_count(), baseline);
}

#[test]
fn queries_on_other_targets_stay_cached() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let kept = world.spawn_empty().unwrap();
    let doomed = world.spawn_empty().unwrap();
    let fan = world.spawn([k.likes.pair(kept), k.likes.pair(doomed)]).unwrap();

    let on_kept = Query::new().with(k.likes.pair(kept));
    let plain = Query::new().with(&k.likes);
    world.query(&on_kept);
    world.query(&plain);
    world.query(&Query::new().with(Selector::targeting(doomed)));
    assert_eq!(world.query_count(), 3);

    world.destroy_entity(doomed).unwrap();
    assert_eq!(world.query_count(), 2);
    assert_eq!(world.query(&on_kept).as_slice(), &[fan]);
    assert_eq!(world.query(&plain).as_slice(), &[fan]);
    assert_eq!(world.query_count(), 2);
}
