//! Queries over compositions.
//!
//! A [`Query`] is a normalized list of terms. Each world keeps one cache
//! entry per distinct query holding the ids of matching compositions; the
//! cache is extended when a composition is created and pruned when one is
//! retired, so evaluation never rescans the composition graph.
//!
//! Tracking terms (`added`, `removed`, `changed`) additionally filter by the
//! change log. Each cached query owns a cursor; evaluating the query returns
//! changes since the previous evaluation and advances the cursor.

use std::collections::{HashMap, HashSet};

use tracing::trace;
use trellis_foundation::Entity;

use crate::access::{EntityMut, EntityRef};
use crate::composition::{Composition, CompositionGraph, CompositionId};
use crate::observe::{ChangeKind, ChangeLog};
use crate::registry::{Pair, Trait, TraitId, TraitKey};
use crate::world::World;

/// Matches one aspect of a composition's key set.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Selector {
    /// A plain trait, or any pair of a relation.
    Trait(TraitId),
    /// One specific pair.
    Pair(TraitId, Entity),
    /// Any pair of the relation, whatever its target.
    AnyTarget(TraitId),
    /// Any pair, of any relation, targeting the entity.
    AnyRelation(Entity),
}

impl Selector {
    /// Any pair of `relation`.
    #[must_use]
    pub fn any_target(relation: &Trait) -> Self {
        Self::AnyTarget(relation.id())
    }

    /// Any pair targeting `target`.
    #[must_use]
    pub fn targeting(target: Entity) -> Self {
        Self::AnyRelation(target)
    }

    /// The relation target this selector names, if any.
    #[must_use]
    pub fn target(&self) -> Option<Entity> {
        match *self {
            Self::Pair(_, target) | Self::AnyRelation(target) => Some(target),
            Self::Trait(_) | Self::AnyTarget(_) => None,
        }
    }

    /// Tests a sorted key set.
    #[must_use]
    pub fn matches(&self, keys: &[TraitKey]) -> bool {
        match *self {
            Self::Trait(id) => keys.binary_search(&TraitKey::Trait(id)).is_ok(),
            Self::Pair(id, target) => keys.binary_search(&TraitKey::Pair(id, target)).is_ok(),
            Self::AnyTarget(id) => keys
                .iter()
                .any(|k| matches!(k, TraitKey::Pair(r, _) if *r == id)),
            Self::AnyRelation(target) => keys
                .iter()
                .any(|k| matches!(k, TraitKey::Pair(_, t) if *t == target)),
        }
    }
}

impl From<&Trait> for Selector {
    fn from(t: &Trait) -> Self {
        Self::Trait(t.id())
    }
}

impl From<Pair> for Selector {
    fn from(p: Pair) -> Self {
        Self::Pair(p.relation().id(), p.target())
    }
}

impl From<&Pair> for Selector {
    fn from(p: &Pair) -> Self {
        Self::Pair(p.relation().id(), p.target())
    }
}

/// One clause of a query.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    /// Composition must match the selector.
    With(Selector),
    /// Composition must not match the selector.
    Without(Selector),
    /// Composition must match at least one selector.
    AnyOf(Vec<Selector>),
    /// Trait added since the last evaluation. Implies `With`.
    Added(TraitId),
    /// Trait removed since the last evaluation. Implies `Without`.
    Removed(TraitId),
    /// Trait data written since the last evaluation. Implies `With`.
    Changed(TraitId),
}

impl Term {
    fn matches(&self, keys: &[TraitKey]) -> bool {
        match self {
            Self::With(s) => s.matches(keys),
            Self::Without(s) => !s.matches(keys),
            Self::AnyOf(list) => list.iter().any(|s| s.matches(keys)),
            Self::Added(id) | Self::Changed(id) => Selector::Trait(*id).matches(keys),
            Self::Removed(id) => !Selector::Trait(*id).matches(keys),
        }
    }

    fn tracking(&self) -> Option<(TraitId, ChangeKind)> {
        match self {
            Self::Added(id) => Some((*id, ChangeKind::Added)),
            Self::Removed(id) => Some((*id, ChangeKind::Removed)),
            Self::Changed(id) => Some((*id, ChangeKind::Changed)),
            _ => None,
        }
    }
}

/// A set of terms. Term order does not affect identity.
///
/// ```
/// use trellis_storage::{Query, TraitSchema, Universe, WorldConfig};
///
/// let universe = Universe::new();
/// let position = universe.define(TraitSchema::new("Position").with_default("x", 0.0)).unwrap();
/// let frozen = universe.define(TraitSchema::tag("Frozen")).unwrap();
///
/// let a = Query::new().with(&position).without(&frozen);
/// let b = Query::new().without(&frozen).with(&position);
/// assert_eq!(a, b);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Query {
    terms: Vec<Term>,
}

impl Query {
    /// Matches every user entity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, term: Term) -> Self {
        if let Err(pos) = self.terms.binary_search(&term) {
            self.terms.insert(pos, term);
        }
        self
    }

    /// Requires the selector.
    #[must_use]
    pub fn with(self, selector: impl Into<Selector>) -> Self {
        self.push(Term::With(selector.into()))
    }

    /// Excludes the selector.
    #[must_use]
    pub fn without(self, selector: impl Into<Selector>) -> Self {
        self.push(Term::Without(selector.into()))
    }

    /// Requires at least one of the selectors.
    #[must_use]
    pub fn any_of<I>(self, selectors: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Selector>,
    {
        let mut list: Vec<Selector> = selectors.into_iter().map(Into::into).collect();
        list.sort_unstable();
        list.dedup();
        self.push(Term::AnyOf(list))
    }

    /// Entities that gained `t` since the last evaluation.
    #[must_use]
    pub fn added(self, t: &Trait) -> Self {
        self.push(Term::Added(t.id()))
    }

    /// Live entities that lost `t` since the last evaluation.
    #[must_use]
    pub fn removed(self, t: &Trait) -> Self {
        self.push(Term::Removed(t.id()))
    }

    /// Entities whose `t` data was written since the last evaluation.
    #[must_use]
    pub fn changed(self, t: &Trait) -> Self {
        self.push(Term::Changed(t.id()))
    }

    /// Normalized terms.
    #[must_use]
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// Relation targets named by any selector, sorted and deduplicated.
    #[must_use]
    pub fn targets(&self) -> Vec<Entity> {
        let mut targets: Vec<Entity> = self
            .terms
            .iter()
            .flat_map(|term| match term {
                Term::With(s) | Term::Without(s) => std::slice::from_ref(s),
                Term::AnyOf(list) => list.as_slice(),
                _ => &[][..],
            })
            .filter_map(Selector::target)
            .collect();
        targets.sort_unstable();
        targets.dedup();
        targets
    }

    /// Returns true if any term consults the change log.
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.terms.iter().any(|t| t.tracking().is_some())
    }

    /// Structural match against a composition. The world entity's
    /// composition never matches.
    #[must_use]
    pub fn matches(&self, composition: &Composition) -> bool {
        !composition.is_hidden()
            && !composition.is_retired()
            && self.terms.iter().all(|t| t.matches(composition.keys()))
    }
}

#[derive(Debug)]
struct CachedQuery {
    query: Query,
    matching: Vec<CompositionId>,
    cursor: u64,
}

/// Per-world cache of compiled queries.
///
/// Queries naming a relation target are evicted when that target is
/// destroyed; evaluating one again recompiles it.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: Vec<CachedQuery>,
    index: HashMap<Query, usize>,
    by_target: HashMap<Entity, Vec<Query>>,
}

impl QueryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cache slot for `query`, compiling it on first use.
    pub fn resolve(&mut self, query: &Query, graph: &CompositionGraph, log: &mut ChangeLog) -> usize {
        if let Some(slot) = self.index.get(query) {
            return *slot;
        }
        let matching = graph
            .iter()
            .filter(|c| query.matches(c))
            .map(Composition::id)
            .collect::<Vec<_>>();
        for (id, _) in query.terms.iter().filter_map(Term::tracking) {
            log.track(id);
        }
        trace!(terms = query.terms.len(), matches = matching.len(), "compiled query");
        let slot = self.entries.len();
        self.entries.push(CachedQuery {
            query: query.clone(),
            matching,
            cursor: log.cursor(),
        });
        self.index.insert(query.clone(), slot);
        for target in query.targets() {
            self.by_target.entry(target).or_default().push(query.clone());
        }
        slot
    }

    /// Matching compositions for a slot, in the order they were matched.
    #[must_use]
    pub fn matching(&self, slot: usize) -> &[CompositionId] {
        &self.entries[slot].matching
    }

    /// Sets the cursor for a slot, returning the previous one.
    pub fn advance(&mut self, slot: usize, cursor: u64) -> u64 {
        std::mem::replace(&mut self.entries[slot].cursor, cursor)
    }

    /// Oldest cursor among tracking queries.
    #[must_use]
    pub fn min_cursor(&self) -> Option<u64> {
        self.entries
            .iter()
            .filter(|e| e.query.is_tracking())
            .map(|e| e.cursor)
            .min()
    }

    /// Adds a new composition to every query it matches.
    pub fn composition_created(&mut self, composition: &Composition) {
        for entry in &mut self.entries {
            if entry.query.matches(composition) {
                entry.matching.push(composition.id());
            }
        }
    }

    /// Drops a retired composition from every query.
    pub fn composition_retired(&mut self, id: CompositionId) {
        for entry in &mut self.entries {
            entry.matching.retain(|c| *c != id);
        }
    }

    /// Evicts every query naming `target`. Traits no remaining query
    /// tracks stop being recorded. Returns the number evicted.
    pub fn target_destroyed(&mut self, target: Entity, log: &mut ChangeLog) -> usize {
        let Some(doomed) = self.by_target.remove(&target) else {
            return 0;
        };
        for query in &doomed {
            for other in query.targets() {
                if let Some(list) = self.by_target.get_mut(&other) {
                    list.retain(|q| q != query);
                    if list.is_empty() {
                        self.by_target.remove(&other);
                    }
                }
            }
        }
        self.entries.retain(|e| !doomed.contains(&e.query));
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(slot, e)| (e.query.clone(), slot))
            .collect();

        let still_tracked: HashSet<TraitId> = self
            .entries
            .iter()
            .flat_map(|e| e.query.terms.iter().filter_map(Term::tracking))
            .map(|(id, _)| id)
            .collect();
        for (id, _) in doomed.iter().flat_map(|q| q.terms.iter().filter_map(Term::tracking)) {
            if !still_tracked.contains(&id) {
                log.untrack(id);
            }
        }
        if let Some(oldest) = self.min_cursor() {
            log.prune(oldest);
        }
        trace!(?target, evicted = doomed.len(), "evicted queries");
        doomed.len()
    }

    /// Evicts every query naming any relation target.
    pub fn targets_cleared(&mut self, log: &mut ChangeLog) -> usize {
        let targets: Vec<Entity> = self.by_target.keys().copied().collect();
        targets
            .into_iter()
            .map(|t| self.target_destroyed(t, log))
            .sum()
    }

    /// Number of cached queries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Keeps only entities present in every tracking term's change set.
pub(crate) fn filter_tracked(
    query: &Query,
    log: &ChangeLog,
    since: u64,
    entities: &mut Vec<Entity>,
) {
    for (id, kind) in query.terms.iter().filter_map(Term::tracking) {
        let hits: HashSet<Entity> = log.since(id, kind, since);
        entities.retain(|e| hits.contains(e));
    }
}

/// Snapshot of the entities a query matched.
///
/// Order is composition-major (compositions in the order the cached query
/// first saw them), then slot order within each composition. The snapshot does not follow later
/// mutations; entities destroyed afterwards are still visited by
/// [`for_each`](Self::for_each) and [`update_each`](Self::update_each) but
/// report `is_alive() == false` and read as absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryResult {
    entities: Vec<Entity>,
}

impl QueryResult {
    pub(crate) fn new(entities: Vec<Entity>) -> Self {
        Self { entities }
    }

    /// Number of matched entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if nothing matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterates matched entities.
    pub fn iter(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter().copied()
    }

    /// First matched entity.
    #[must_use]
    pub fn first(&self) -> Option<Entity> {
        self.entities.first().copied()
    }

    /// Returns true if `entity` matched.
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains(&entity)
    }

    /// Matched entities as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[Entity] {
        &self.entities
    }

    /// Visits every matched entity with read access.
    pub fn for_each(&self, world: &World, mut f: impl FnMut(EntityRef<'_>)) {
        for entity in &self.entities {
            f(world.entity(*entity));
        }
    }

    /// Visits every matched entity with write access.
    ///
    /// Structural changes made by the callback do not alter which entities
    /// are visited.
    pub fn update_each(&self, world: &mut World, mut f: impl FnMut(EntityMut<'_>)) {
        for entity in &self.entities {
            f(world.entity_mut(*entity));
        }
    }
}

impl IntoIterator for QueryResult {
    type Item = Entity;
    type IntoIter = std::vec::IntoIter<Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.into_iter()
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = Entity;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, Entity>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter().copied()
    }
}
