//! Reverse index from relation targets to the entities that hold them.
//!
//! Forward edges live in composition keys (`TraitKey::Pair`). This index
//! answers the opposite question, "who points at this entity?", which is
//! what target cleanup and cascading destroy need.

use std::collections::HashMap;

use trellis_foundation::Entity;

use crate::registry::TraitId;

/// One incoming edge.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Holder {
    /// The relation.
    pub relation: TraitId,
    /// The entity holding the pair.
    pub source: Entity,
    /// Destroying the target destroys the source.
    pub cascade: bool,
}

/// Target-to-holders index.
#[derive(Clone, Debug, Default)]
pub struct RelationIndex {
    holders: HashMap<Entity, Vec<Holder>>,
}

impl RelationIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `source` holds `(relation, target)`.
    pub fn link(&mut self, source: Entity, relation: TraitId, target: Entity, cascade: bool) {
        let holder = Holder {
            relation,
            source,
            cascade,
        };
        let list = self.holders.entry(target).or_default();
        if !list.contains(&holder) {
            list.push(holder);
        }
    }

    /// Forgets that `source` holds `(relation, target)`. Returns true if it did.
    pub fn unlink(&mut self, source: Entity, relation: TraitId, target: Entity) -> bool {
        let Some(list) = self.holders.get_mut(&target) else {
            return false;
        };
        let before = list.len();
        list.retain(|h| !(h.source == source && h.relation == relation));
        let removed = list.len() != before;
        if list.is_empty() {
            self.holders.remove(&target);
        }
        removed
    }

    /// Incoming edges of `target`.
    #[must_use]
    pub fn holders_of(&self, target: Entity) -> &[Holder] {
        self.holders.get(&target).map_or(&[], Vec::as_slice)
    }

    /// Sources that must be destroyed with `target`.
    #[must_use]
    pub fn cascade_sources(&self, target: Entity) -> Vec<Entity> {
        self.holders_of(target)
            .iter()
            .filter(|h| h.cascade)
            .map(|h| h.source)
            .collect()
    }

    /// Removes and returns every incoming edge of `target`.
    pub fn take(&mut self, target: Entity) -> Vec<Holder> {
        self.holders.remove(&target).unwrap_or_default()
    }

    /// Number of targets with at least one holder.
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.holders.len()
    }

    /// Drops every edge.
    pub fn clear(&mut self) {
        self.holders.clear();
    }
}
