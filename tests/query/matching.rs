//! Integration tests for query matching
//!
//! Tests with/without/any-of terms and relation wildcards.

use proptest::prelude::*;
use trellis_storage::{Query, Selector, WorldConfig};

use crate::kit;

// =============================================================================
// Plain Terms
// =============================================================================

#[test]
fn with_and_without() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let moving = world.spawn([&k.position, &k.velocity]).unwrap();
    let still = world.spawn([&k.position]).unwrap();
    let frozen = world.spawn([&k.position, &k.velocity, &k.frozen]).unwrap();

    let all = world.query(&Query::new().with(&k.position));
    assert_eq!(all.len(), 3);

    let movers = world.query(&Query::new().with(&k.position).with(&k.velocity).without(&k.frozen));
    assert_eq!(movers.as_slice(), &[moving]);

    let not_moving = world.query(&Query::new().with(&k.position).without(&k.velocity));
    assert!(not_moving.contains(still));
    assert!(!not_moving.contains(frozen));
}

#[test]
fn any_of_matches_either() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let a = world.spawn([&k.velocity]).unwrap();
    let b = world.spawn([&k.frozen]).unwrap();
    world.spawn([&k.position]).unwrap();

    let result = world.query(&Query::new().any_of([&k.velocity, &k.frozen]));
    assert_eq!(result.len(), 2);
    assert!(result.contains(a));
    assert!(result.contains(b));
}

#[test]
fn empty_query_matches_every_user_entity() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    world.spawn_empty().unwrap();
    world.spawn([&k.frozen]).unwrap();
    world.add_singleton(&k.frozen).unwrap();

    assert_eq!(world.query(&Query::new()).len(), 2);
}

// =============================================================================
// Relations
// =============================================================================

#[test]
fn specific_pair_and_wildcards() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let parent = world.spawn_empty().unwrap();
    let other = world.spawn_empty().unwrap();
    let child = world.spawn([k.child_of.pair(parent)]).unwrap();
    let fan = world.spawn([k.likes.pair(parent)]).unwrap();
    let stranger = world.spawn([k.child_of.pair(other)]).unwrap();

    let children = world.query(&Query::new().with(k.child_of.pair(parent)));
    assert_eq!(children.as_slice(), &[child]);

    let any_child = world.query(&Query::new().with(Selector::any_target(&k.child_of)));
    assert_eq!(any_child.len(), 2);
    assert!(any_child.contains(stranger));

    // A relation handle alone matches any of its pairs.
    assert_eq!(world.query(&Query::new().with(&k.child_of)).len(), 2);

    let pointing = world.query(&Query::new().with(Selector::targeting(parent)));
    assert_eq!(pointing.len(), 2);
    assert!(pointing.contains(child));
    assert!(pointing.contains(fan));

    let orphans = world.query(&Query::new().without(Selector::any_target(&k.child_of)));
    assert!(orphans.contains(parent));
    assert!(orphans.contains(fan));
    assert!(!orphans.contains(child));
}

#[test]
fn pair_queries_follow_new_targets() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let q = Query::new().with(Selector::any_target(&k.likes));
    assert!(world.query(&q).is_empty());

    // Compositions created after the query was cached still match.
    for _ in 0..5 {
        let target = world.spawn_empty().unwrap();
        world.spawn([k.likes.pair(target)]).unwrap();
    }
    assert_eq!(world.query(&q).len(), 5);
}

#[test]
fn removing_one_relation_only_moves_that_holder() {
    let k = kit();
    let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
    let target = world.spawn_empty().unwrap();
    let both = world.spawn([k.child_of.pair(target), k.likes.pair(target)]).unwrap();
    let only_likes = world.spawn([k.likes.pair(target)]).unwrap();
    let also_both = world.spawn([k.child_of.pair(target), k.likes.pair(target)]).unwrap();
    let pointing = Query::new().with(Selector::targeting(target));
    assert_eq!(world.query(&pointing).len(), 3);

    // Still points at the target through ChildOf.
    world.remove(both, k.likes.pair(target)).unwrap();
    let result = world.query(&pointing);
    assert_eq!(result.len(), 3);
    assert!(result.contains(both));

    world.remove(both, k.child_of.pair(target)).unwrap();
    let result = world.query(&pointing);
    assert_eq!(result.len(), 2);
    assert!(!result.contains(both));
    assert!(result.contains(only_likes));
    assert!(result.contains(also_both));
    assert!(world.has(also_both, k.likes.pair(target)));
    assert!(world.has(also_both, k.child_of.pair(target)));
}

proptest! {
    #[test]
    fn targeting_membership_tracks_each_holder(
        start in prop::collection::vec((any::<bool>(), any::<bool>()), 1..12),
        removals in prop::collection::vec((0..12usize, any::<bool>()), 0..24),
    ) {
        let k = kit();
        let mut world = k.universe.create_world(WorldConfig::default()).unwrap();
        let target = world.spawn_empty().unwrap();
        let pointing = Query::new().with(Selector::targeting(target));
        world.query(&pointing);

        // Model: (holds ChildOf, holds Likes) per holder.
        let mut held = start;
        let mut holders = Vec::with_capacity(held.len());
        for (child, likes) in &held {
            let e = world.spawn_empty().unwrap();
            if *child {
                world.add(e, k.child_of.pair(target)).unwrap();
            }
            if *likes {
                world.add(e, k.likes.pair(target)).unwrap();
            }
            holders.push(e);
        }

        for (who, child) in removals {
            let who = who % holders.len();
            if child {
                world.remove(holders[who], k.child_of.pair(target)).unwrap();
                held[who].0 = false;
            } else {
                world.remove(holders[who], k.likes.pair(target)).unwrap();
                held[who].1 = false;
            }

            let result = world.query(&pointing);
            for (i, e) in holders.iter().enumerate() {
                prop_assert_eq!(result.contains(*e), held[i].0 || held[i].1);
            }
        }
    }
}
