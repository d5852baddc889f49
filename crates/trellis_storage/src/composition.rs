//! Compositions: groups of entities sharing the exact same key set.
//!
//! Every distinct set of [`TraitKey`]s present on some entity gets one
//! [`Composition`], holding the entities and one [`Store`] per data-bearing
//! key. Compositions are connected by lazily built add/remove edges so that
//! repeated transitions are a single map lookup.

use std::collections::HashMap;

use tracing::{debug, trace};
use trellis_foundation::{Entity, Value};

use crate::registry::TraitKey;
use crate::store::Store;

/// Dense composition id. The empty composition is always [`CompositionId::ROOT`].
///
/// Ids of retired compositions are reissued to later ones.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompositionId(u32);

impl CompositionId {
    /// The composition with no keys.
    pub const ROOT: Self = Self(0);

    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// A structural transition between compositions.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Edge {
    /// Add a key. Adding a pair also adds its relation marker.
    Add(TraitKey),
    /// Remove a key. Removing the last pair of a relation also removes
    /// the marker.
    Remove(TraitKey),
}

/// Entities sharing one key set, with column stores per data key.
#[derive(Debug)]
pub struct Composition {
    id: CompositionId,
    /// Sorted, deduplicated.
    keys: Vec<TraitKey>,
    entities: Vec<Entity>,
    stores: HashMap<TraitKey, Store>,
    add_edges: HashMap<TraitKey, CompositionId>,
    remove_edges: HashMap<TraitKey, CompositionId>,
    retired: bool,
}

impl Composition {
    /// The composition id.
    #[must_use]
    pub fn id(&self) -> CompositionId {
        self.id
    }

    /// Sorted key set.
    #[must_use]
    pub fn keys(&self) -> &[TraitKey] {
        &self.keys
    }

    /// Returns true if the key set contains `key`.
    #[must_use]
    pub fn contains(&self, key: &TraitKey) -> bool {
        self.keys.binary_search(key).is_ok()
    }

    /// Entities in slot order.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if the composition holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Column store for a data-bearing key.
    #[must_use]
    pub fn store(&self, key: &TraitKey) -> Option<&Store> {
        self.stores.get(key)
    }

    pub(crate) fn store_mut(&mut self, key: &TraitKey) -> Option<&mut Store> {
        self.stores.get_mut(key)
    }

    /// True for the composition holding the hidden world entity.
    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.keys.first() == Some(&TraitKey::World)
    }

    /// True once a pair target in the key set has been destroyed, until
    /// the slot is reissued.
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Summary for introspection.
    #[must_use]
    pub fn info(&self) -> CompositionInfo {
        CompositionInfo {
            id: self.id,
            keys: self.keys.clone(),
            len: self.entities.len(),
            hidden: self.is_hidden(),
        }
    }
}

/// Snapshot of one composition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompositionInfo {
    /// The composition id.
    pub id: CompositionId,
    /// Sorted key set.
    pub keys: Vec<TraitKey>,
    /// Number of entities.
    pub len: usize,
    /// Holds the hidden world entity.
    pub hidden: bool,
}

/// All compositions of one world, plus the transition graph between them.
#[derive(Debug)]
pub struct CompositionGraph {
    nodes: Vec<Composition>,
    lookup: HashMap<Vec<TraitKey>, CompositionId>,
    by_target: HashMap<Entity, Vec<CompositionId>>,
    /// Retired slots awaiting reuse.
    free: Vec<CompositionId>,
}

impl Default for CompositionGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositionGraph {
    /// Creates a graph holding only the root composition.
    #[must_use]
    pub fn new() -> Self {
        let mut graph = Self {
            nodes: Vec::new(),
            lookup: HashMap::new(),
            by_target: HashMap::new(),
            free: Vec::new(),
        };
        graph.create(Vec::new(), |_| None);
        graph
    }

    /// Borrows a composition.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this graph.
    #[must_use]
    pub fn get(&self, id: CompositionId) -> &Composition {
        &self.nodes[id.0 as usize]
    }

    pub(crate) fn get_mut(&mut self, id: CompositionId) -> &mut Composition {
        &mut self.nodes[id.0 as usize]
    }

    /// Finds the composition for an exact key set.
    #[must_use]
    pub fn find(&self, keys: &[TraitKey]) -> Option<CompositionId> {
        let mut sorted = keys.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        self.lookup.get(&sorted).copied()
    }

    /// Iterates live (non-retired) compositions in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Composition> {
        self.nodes.iter().filter(|c| !c.retired)
    }

    /// Number of live compositions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    /// Always false: the root composition exists from construction.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    /// Follows (or builds) the edge from `from`.
    ///
    /// `layout` gives the column count for data-bearing keys. Returns the
    /// destination and whether it was created by this call.
    pub fn transition(
        &mut self,
        from: CompositionId,
        edge: Edge,
        layout: impl Fn(&TraitKey) -> Option<usize>,
    ) -> (CompositionId, bool) {
        let node = self.get(from);
        let cached = match edge {
            Edge::Add(key) => node.add_edges.get(&key),
            Edge::Remove(key) => node.remove_edges.get(&key),
        };
        if let Some(to) = cached {
            return (*to, false);
        }

        let mut keys = node.keys.clone();
        match edge {
            Edge::Add(key) => {
                keys.push(key);
                if let TraitKey::Pair(relation, _) = key {
                    keys.push(TraitKey::Trait(relation));
                }
            }
            Edge::Remove(key) => {
                keys.retain(|k| *k != key);
                if let TraitKey::Pair(relation, _) = key {
                    let more = keys
                        .iter()
                        .any(|k| matches!(k, TraitKey::Pair(r, _) if *r == relation));
                    if !more {
                        keys.retain(|k| *k != TraitKey::Trait(relation));
                    }
                }
            }
        }
        keys.sort_unstable();
        keys.dedup();

        let (to, created) = match self.lookup.get(&keys) {
            Some(id) => (*id, false),
            None => (self.create(keys, layout), true),
        };

        // Both directions are cached; an add followed by the matching
        // remove always lands back on `from`.
        match edge {
            Edge::Add(key) => {
                self.get_mut(from).add_edges.insert(key, to);
                self.get_mut(to).remove_edges.insert(key, from);
            }
            Edge::Remove(key) => {
                self.get_mut(from).remove_edges.insert(key, to);
                self.get_mut(to).add_edges.insert(key, from);
            }
        }
        (to, created)
    }

    fn create(
        &mut self,
        keys: Vec<TraitKey>,
        layout: impl Fn(&TraitKey) -> Option<usize>,
    ) -> CompositionId {
        let id = self
            .free
            .pop()
            .unwrap_or_else(|| CompositionId(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX)));
        let stores = keys
            .iter()
            .filter_map(|k| layout(k).map(|n| (*k, Store::new(n))))
            .collect();
        for key in &keys {
            if let TraitKey::Pair(_, target) = key {
                let ids = self.by_target.entry(*target).or_default();
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        debug!(id = id.0, keys = keys.len(), "created composition");
        self.lookup.insert(keys.clone(), id);
        let node = Composition {
            id,
            keys,
            entities: Vec::new(),
            stores,
            add_edges: HashMap::new(),
            remove_edges: HashMap::new(),
            retired: false,
        };
        match self.nodes.get_mut(id.0 as usize) {
            Some(slot) => {
                debug_assert!(slot.retired, "reissuing live composition {id:?}");
                *slot = node;
            }
            None => self.nodes.push(node),
        }
        id
    }

    /// Appends an entity to a composition, filling each store from `fill`.
    pub fn insert_entity(
        &mut self,
        id: CompositionId,
        entity: Entity,
        mut fill: impl FnMut(&TraitKey) -> Vec<Value>,
    ) -> usize {
        let node = self.get_mut(id);
        for (key, store) in &mut node.stores {
            store.push(fill(key));
        }
        node.entities.push(entity);
        node.entities.len() - 1
    }

    /// Moves the entity at `slot` of `from` to the end of `to`.
    ///
    /// Rows for keys shared by both compositions are carried over; rows for
    /// keys only in `to` come from `fill`. Returns the new slot and the
    /// entity that was swapped into `slot`, if any.
    pub fn move_entity(
        &mut self,
        from: CompositionId,
        slot: usize,
        to: CompositionId,
        mut fill: impl FnMut(&TraitKey) -> Vec<Value>,
    ) -> (usize, Option<Entity>) {
        let (src, dst) = self.pair_mut(from, to);
        let entity = src.entities.swap_remove(slot);
        let swapped = src.entities.get(slot).copied();

        for (key, store) in &mut src.stores {
            let row = store.swap_remove(slot);
            if let Some(target) = dst.stores.get_mut(key) {
                target.push(row);
            }
        }
        for (key, store) in &mut dst.stores {
            if !src.stores.contains_key(key) {
                store.push(fill(key));
            }
        }
        dst.entities.push(entity);
        trace!(?entity, from = from.0, to = to.0, "moved entity");
        (dst.entities.len() - 1, swapped)
    }

    /// Removes the entity at `slot`, returning the entity swapped into it.
    pub fn remove_entity(&mut self, id: CompositionId, slot: usize) -> Option<Entity> {
        let node = self.get_mut(id);
        node.entities.swap_remove(slot);
        for store in node.stores.values_mut() {
            store.swap_remove(slot);
        }
        node.entities.get(slot).copied()
    }

    /// Retires every composition keyed on a pair targeting `target`.
    ///
    /// Retired compositions leave the lookup table, drop their edges and
    /// the edges pointing at them, and free their slot for reuse. Returns
    /// the ids retired.
    pub fn retire_target(&mut self, target: Entity) -> Vec<CompositionId> {
        let Some(ids) = self.by_target.remove(&target) else {
            return Vec::new();
        };
        for id in &ids {
            self.retire(*id, target);
        }
        debug!(?target, retired = ids.len(), "retired compositions");
        ids
    }

    fn retire(&mut self, id: CompositionId, target: Entity) {
        let node = self.get_mut(id);
        debug_assert!(node.entities.is_empty(), "retiring populated composition");
        node.retired = true;
        node.stores.clear();
        let keys = std::mem::take(&mut node.keys);
        let add_edges = std::mem::take(&mut node.add_edges);
        let remove_edges = std::mem::take(&mut node.remove_edges);

        // Every edge is cached in both directions, so the neighbors that
        // point here are exactly the ones this node points to.
        for (key, neighbor) in add_edges {
            let back = &mut self.get_mut(neighbor).remove_edges;
            if back.get(&key) == Some(&id) {
                back.remove(&key);
            }
        }
        for (key, neighbor) in remove_edges {
            let back = &mut self.get_mut(neighbor).add_edges;
            if back.get(&key) == Some(&id) {
                back.remove(&key);
            }
        }
        for key in &keys {
            if let TraitKey::Pair(_, other) = key {
                if *other == target {
                    continue;
                }
                if let Some(ids) = self.by_target.get_mut(other) {
                    ids.retain(|c| *c != id);
                    if ids.is_empty() {
                        self.by_target.remove(other);
                    }
                }
            }
        }
        self.lookup.remove(&keys);
        self.free.push(id);
    }

    /// Number of allocated composition slots, retired ones included.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Empties every composition and retires those keyed on pairs.
    pub fn clear(&mut self) -> Vec<CompositionId> {
        for node in &mut self.nodes {
            node.entities.clear();
            for store in node.stores.values_mut() {
                store.clear();
            }
        }
        let targets: Vec<Entity> = self.by_target.keys().copied().collect();
        targets
            .into_iter()
            .flat_map(|t| self.retire_target(t))
            .collect()
    }

    fn pair_mut(
        &mut self,
        a: CompositionId,
        b: CompositionId,
    ) -> (&mut Composition, &mut Composition) {
        let (a, b) = (a.0 as usize, b.0 as usize);
        assert_ne!(a, b, "transition onto the same composition");
        if a < b {
            let (left, right) = self.nodes.split_at_mut(b);
            (&mut left[a], &mut right[0])
        } else {
            let (left, right) = self.nodes.split_at_mut(a);
            (&mut right[0], &mut left[b])
        }
    }
}
