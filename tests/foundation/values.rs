//! Integration tests for Value types
//!
//! Tests records, conversions, equality, and structural sharing.

use std::collections::HashSet;
use trellis_foundation::{Entity, LtMap, LtVec, Value, WorldId};

// =============================================================================
// Records
// =============================================================================

#[test]
fn record_builds_string_keyed_map() {
    let v = Value::record([("x", 1.0), ("y", 2.0)]);
    let map = v.as_map().unwrap();

    assert_eq!(map.len(), 2);
    assert_eq!(map.get(&Value::from("x")), Some(&Value::Float(1.0)));
    assert_eq!(v.field("y"), Some(&Value::Float(2.0)));
    assert_eq!(v.field("z"), None);
}

#[test]
fn record_order_does_not_matter() {
    let a = Value::record([("x", 1), ("y", 2)]);
    let b = Value::record([("y", 2), ("x", 1)]);
    assert_eq!(a, b);
}

#[test]
fn record_with_mixed_values() {
    let target = Entity::new(1, 0, WorldId::new(0).unwrap());
    let v = Value::record([
        ("name", Value::from("crate")),
        ("owner", Value::from(target)),
        ("open", Value::from(false)),
    ]);

    assert_eq!(v.field("name").and_then(Value::as_str), Some("crate"));
    assert_eq!(v.field("owner").and_then(Value::as_entity), Some(target));
    assert_eq!(v.field("open").and_then(Value::as_bool), Some(false));
}

// =============================================================================
// Conversions
// =============================================================================

#[test]
fn numeric_conversions() {
    assert_eq!(Value::from(3_i32), Value::Int(3));
    assert_eq!(Value::from(3_i64), Value::Int(3));
    assert_eq!(Value::from(0.5_f32), Value::Float(0.5));
    assert_eq!(Value::Int(2).as_number(), Some(2.0));
    assert_eq!(Value::Float(2.5).as_number(), Some(2.5));
    assert_eq!(Value::Nil.as_number(), None);
}

#[test]
fn accessors_reject_other_variants() {
    assert_eq!(Value::Int(1).as_float(), None);
    assert_eq!(Value::Float(1.0).as_int(), None);
    assert_eq!(Value::Nil.as_str(), None);
    assert!(Value::default().is_nil());
}

#[test]
fn type_names() {
    assert_eq!(Value::Nil.type_name(), "nil");
    assert_eq!(Value::record([("a", 1)]).type_name(), "map");
    assert_eq!([1, 2, 3].into_iter().collect::<Value>().type_name(), "list");
}

// =============================================================================
// Equality and Hashing
// =============================================================================

#[test]
fn floats_hash_by_bits() {
    let set: HashSet<Value> = [Value::Float(1.0), Value::Float(1.0), Value::Float(-0.0)]
        .into_iter()
        .collect();
    assert_eq!(set.len(), 2);
    assert_ne!(Value::Float(0.0), Value::Float(-0.0));
}

#[test]
fn int_and_float_are_distinct() {
    assert_ne!(Value::Int(1), Value::Float(1.0));
}

// =============================================================================
// Structural Sharing
// =============================================================================

#[test]
fn persistent_updates_leave_original() {
    let base: LtVec<Value> = [Value::Int(1), Value::Int(2)].into_iter().collect();
    let grown = base.push_back(Value::Int(3));

    assert_eq!(base.len(), 2);
    assert_eq!(grown.len(), 3);

    let map: LtMap<Value, Value> = LtMap::new().insert(Value::from("a"), Value::Int(1));
    let removed = map.remove(&Value::from("a"));
    assert!(map.contains_key(&Value::from("a")));
    assert!(removed.is_empty());
}

#[test]
fn list_values_compare_structurally() {
    let a: Value = [1, 2, 3].into_iter().collect();
    let b = Value::from([1, 2, 3].into_iter().map(Value::from).collect::<LtVec<_>>());
    assert_eq!(a, b);
}
