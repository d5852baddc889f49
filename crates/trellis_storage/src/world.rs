//! World state: entities, trait data, relations, queries, and change events.
//!
//! A [`World`] owns everything about one simulation: the entity index, the
//! composition graph with its column stores, the relation reverse index,
//! cached queries, observers, and a hidden world entity carrying singleton
//! traits. Trait definitions come from the [`Universe`] that created it.
//!
//! Operations on stale entity handles are silent no-ops unless the world
//! was created with a strict [`WorldConfig`], in which case they return
//! `StaleEntity`.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::{debug, trace, warn};
use trellis_foundation::{
    CapacityLimit, Entity, Error, ErrorContext, ErrorKind, Result, Value, WorldId,
};

use crate::access::{EntityMut, EntityRef};
use crate::composition::{Composition, CompositionGraph, CompositionId, CompositionInfo, Edge};
use crate::config::WorldConfig;
use crate::entity::{EntityIndex, Location};
use crate::observe::{
    ChangeEvent, ChangeKind, ChangeLog, Observed, Observers, Subscription,
};
use crate::query::{filter_tracked, Query, QueryCache, QueryResult};
use crate::registry::{FieldIndex, Trait, TraitId, TraitInstance, TraitKey, TraitRef};
use crate::relation::RelationIndex;
use crate::universe::Universe;

/// One isolated entity store.
pub struct World {
    id: WorldId,
    universe: Universe,
    config: WorldConfig,
    entities: EntityIndex,
    /// Traits this world has seen, checked against the universe once.
    traits: HashMap<TraitId, Trait>,
    graph: CompositionGraph,
    relations: RelationIndex,
    queries: QueryCache,
    changes: ChangeLog,
    observers: Observers,
    world_entity: Option<Entity>,
    seeds: Vec<TraitInstance>,
    /// Entities currently being torn down by a cascading destroy.
    destroying: HashSet<Entity>,
}

impl World {
    pub(crate) fn new(
        universe: Universe,
        id: WorldId,
        config: WorldConfig,
        seeds: Vec<TraitInstance>,
    ) -> Self {
        Self {
            id,
            universe,
            entities: EntityIndex::new(id, config.initial_capacity),
            config,
            traits: HashMap::new(),
            graph: CompositionGraph::new(),
            relations: RelationIndex::new(),
            queries: QueryCache::new(),
            changes: ChangeLog::new(),
            observers: Observers::new(),
            world_entity: None,
            seeds,
            destroying: HashSet::new(),
        }
    }

    /// The world id, embedded in every entity handle it issues.
    #[must_use]
    pub fn id(&self) -> WorldId {
        self.id
    }

    /// The configuration the world was created with.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// The universe that owns this world's traits.
    #[must_use]
    pub fn universe(&self) -> &Universe {
        &self.universe
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Creates the hidden world entity and applies singleton seeds.
    ///
    /// Idempotent. Called by [`Universe::create_world`] and [`World::reset`].
    ///
    /// # Errors
    ///
    /// Returns any error raised while adding a seed.
    pub fn init(&mut self) -> Result<()> {
        if self.world_entity.is_some() {
            return Ok(());
        }
        let entity = self.alloc()?;
        let to = self.transition(CompositionId::ROOT, Edge::Add(TraitKey::World));
        self.relocate(entity, to, None);
        self.world_entity = Some(entity);

        for seed in self.seeds.clone() {
            self.register(&seed.base)
                .map_err(|e| e.with_context(ErrorContext::operation("init")))?;
            self.add_instance(entity, seed)?;
        }
        debug!(world = %self.id, singletons = self.seeds.len(), "initialized world");
        Ok(())
    }

    /// Destroys every entity and recreates the world entity.
    ///
    /// Destroyed entities emit no `Removed` events. Observers and cached
    /// queries survive, except queries naming a relation target, which are
    /// evicted along with the compositions keyed on relation pairs.
    ///
    /// # Errors
    ///
    /// Returns any error raised while re-applying singleton seeds.
    pub fn reset(&mut self) -> Result<()> {
        for id in self.graph.clear() {
            self.queries.composition_retired(id);
        }
        self.queries.targets_cleared(&mut self.changes);
        self.entities.clear();
        self.relations.clear();
        self.changes.clear();
        self.destroying.clear();
        self.world_entity = None;
        debug!(world = %self.id, "reset world");
        self.init()
    }

    /// Releases the world and its id.
    ///
    /// Ids are handed out round-robin, but with at most 16 of them a later
    /// world eventually reuses this one's id. Handles kept from a destroyed
    /// world can then resolve in the new world; drop them with the world.
    pub fn destroy(self) {
        debug!(world = %self.id, entities = self.entity_count(), "destroying world");
        drop(self);
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Creates an entity carrying `instances`.
    ///
    /// Every instance is validated before the entity is allocated, so a
    /// failed spawn leaves no trace.
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` at the configured ceiling, or
    /// `InvalidArgument`/`UnknownField` for a malformed instance.
    pub fn spawn<I>(&mut self, instances: I) -> Result<Entity>
    where
        I: IntoIterator,
        I::Item: Into<TraitInstance>,
    {
        let instances: Vec<TraitInstance> = instances.into_iter().map(Into::into).collect();
        if let Some(limit) = self.config.max_entities {
            if self.entity_count() >= limit as usize {
                warn!(world = %self.id, limit, "entity ceiling reached");
                return Err(Error::capacity_exceeded(CapacityLimit::Entities { limit })
                    .with_context(ErrorContext::operation("spawn")));
            }
        }
        for instance in &instances {
            let context = || {
                ErrorContext::operation("spawn").with_trait(instance.base.name())
            };
            self.register(&instance.base)
                .map_err(|e| e.with_context(context()))?;
            self.validate(instance)
                .map_err(|e| e.with_context(context()))?;
        }

        let entity = self.alloc()?;
        for instance in instances {
            if let Err(e) = self.add_instance(entity, instance) {
                self.destroy_cascade(entity);
                return Err(e.with_context(ErrorContext::operation("spawn").with_entity(entity)));
            }
        }
        trace!(?entity, "spawned entity");
        Ok(entity)
    }

    /// Creates an entity with no traits.
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` at the configured ceiling.
    pub fn spawn_empty(&mut self) -> Result<Entity> {
        self.spawn(std::iter::empty::<TraitInstance>())
    }

    /// Destroys an entity, cascading through `auto_remove_target` relations.
    ///
    /// Pairs other entities hold on it are removed. Compositions keyed on
    /// it as a relation target are retired.
    ///
    /// # Errors
    ///
    /// Returns `StaleEntity` in strict mode, or `InvalidArgument` for the
    /// world entity.
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<()> {
        if !self.check_alive(entity, "destroy")? {
            return Ok(());
        }
        if Some(entity) == self.world_entity {
            return Err(Error::invalid_argument(
                "the world entity cannot be destroyed; use reset",
            ));
        }
        self.destroy_cascade(entity);
        Ok(())
    }

    /// Returns true if the handle is current in this world.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// Live user entities in index order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities
            .iter()
            .filter(move |e| Some(*e) != self.world_entity)
    }

    /// Number of live user entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len() - usize::from(self.world_entity.is_some())
    }

    /// Read handle for one entity.
    #[must_use]
    pub fn entity(&self, entity: Entity) -> EntityRef<'_> {
        EntityRef::new(self, entity)
    }

    /// Write handle for one entity.
    pub fn entity_mut(&mut self, entity: Entity) -> EntityMut<'_> {
        EntityMut::new(self, entity)
    }

    // =========================================================================
    // Traits
    // =========================================================================

    /// Adds a trait or pair. Adding one already present overwrites the
    /// fields named in its data and emits `Changed`.
    ///
    /// For exclusive relations, any existing pair with another target is
    /// removed first.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for data on a tag, a relation without a
    /// live target, or a trait from another universe; `UnknownField` for
    /// data naming a field the schema lacks.
    pub fn add(&mut self, entity: Entity, instance: impl Into<TraitInstance>) -> Result<()> {
        let instance = instance.into();
        if !self.check_alive(entity, "add")? {
            return Ok(());
        }
        let base = instance.base.clone();
        let context = || {
            ErrorContext::operation("add")
                .with_entity(entity)
                .with_trait(base.name())
        };
        self.register(&instance.base)
            .map_err(|e| e.with_context(context()))?;
        self.add_instance(entity, instance)
            .map_err(|e| e.with_context(context()))
    }

    /// Removes a trait or pair. A relation without a target removes every
    /// pair of that relation. Absent traits are ignored.
    ///
    /// # Errors
    ///
    /// Returns `StaleEntity` in strict mode, or `InvalidArgument` for a
    /// trait from another universe.
    pub fn remove(&mut self, entity: Entity, target: impl Into<TraitRef>) -> Result<()> {
        let target = target.into();
        if !self.check_alive(entity, "remove")? {
            return Ok(());
        }
        let known = self.check_known(&target.base).map_err(|e| {
            e.with_context(
                ErrorContext::operation("remove")
                    .with_entity(entity)
                    .with_trait(target.base.name()),
            )
        })?;
        if !known {
            return Ok(());
        }
        if target.base.is_relation() && target.target.is_none() {
            let relation = target.base.id();
            for other in self.targets_of(entity, relation) {
                self.remove_key(entity, TraitKey::Pair(relation, other));
            }
        } else {
            self.remove_key(entity, target.key());
        }
        Ok(())
    }

    /// Returns true if the entity carries the trait (or pair). A relation
    /// without a target matches any pair of it.
    #[must_use]
    pub fn has(&self, entity: Entity, target: impl Into<TraitRef>) -> bool {
        let target = target.into();
        self.knows(&target.base)
            && self
                .entities
                .locate(entity)
                .is_some_and(|loc| self.graph.get(loc.composition).contains(&target.key()))
    }

    /// Reads a trait's data as a record.
    ///
    /// Returns `None` for absent traits, tags, and stale entities.
    #[must_use]
    pub fn get(&self, entity: Entity, target: impl Into<TraitRef>) -> Option<Value> {
        let target = target.into();
        if !self.knows(&target.base) {
            return None;
        }
        let location = self.entities.locate(entity)?;
        let store = self.graph.get(location.composition).store(&target.key())?;
        store
            .row(location.slot)
            .map(|row| target.base.row_to_value(&row))
    }

    /// Like [`get`](Self::get) but reports why nothing was read.
    ///
    /// # Errors
    ///
    /// Returns `MissingTrait` if the entity lacks the trait, `InvalidArgument`
    /// for tags, or `StaleEntity` in strict mode.
    pub fn try_get(&self, entity: Entity, target: impl Into<TraitRef>) -> Result<Value> {
        let target = target.into();
        if !self.check_alive(entity, "get")? {
            return Err(Error::missing_trait(entity, target.base.name()));
        }
        let key = self.data_key(entity, &target, "get")?;
        let location = self.location(entity)?;
        self.graph
            .get(location.composition)
            .store(&key)
            .and_then(|store| store.row(location.slot))
            .map(|row| target.base.row_to_value(&row))
            .ok_or_else(|| Error::missing_trait(entity, target.base.name()))
    }

    /// Borrows one field without cloning the record.
    #[must_use]
    pub fn get_field(
        &self,
        entity: Entity,
        target: impl Into<TraitRef>,
        field: FieldIndex,
    ) -> Option<&Value> {
        let target = target.into();
        if !self.knows(&target.base) {
            return None;
        }
        let location = self.entities.locate(entity)?;
        self.graph
            .get(location.composition)
            .store(&target.key())?
            .get(location.slot, field.index())
    }

    /// Overwrites the fields named in `data` and emits `Changed`.
    ///
    /// # Errors
    ///
    /// Returns `MissingTrait` if the entity lacks the trait, `UnknownField`
    /// for a field the schema lacks, or `InvalidArgument` for tags.
    pub fn set(
        &mut self,
        entity: Entity,
        target: impl Into<TraitRef>,
        data: impl Into<Value>,
    ) -> Result<()> {
        let target = target.into();
        if !self.check_alive(entity, "set")? {
            return Ok(());
        }
        let key = self.data_key(entity, &target, "set")?;
        let location = self.location(entity)?;
        self.write(entity, location, &target.base, key, &data.into())
            .map_err(|e| {
                e.with_context(
                    ErrorContext::operation("set")
                        .with_entity(entity)
                        .with_trait(target.base.name()),
                )
            })
    }

    /// Merges `f(current)` into a trait's data, then emits `Changed`.
    ///
    /// Like [`set`](Self::set), fields absent from the returned record keep
    /// their current values.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    pub fn update(
        &mut self,
        entity: Entity,
        target: impl Into<TraitRef>,
        f: impl FnOnce(Value) -> Value,
    ) -> Result<()> {
        let target = target.into();
        if !self.check_alive(entity, "update")? {
            return Ok(());
        }
        let key = self.data_key(entity, &target, "update")?;
        let location = self.location(entity)?;
        let current = self
            .graph
            .get(location.composition)
            .store(&key)
            .and_then(|store| store.row(location.slot))
            .map(|row| target.base.row_to_value(&row))
            .unwrap_or_default();
        let next = f(current);
        self.write(entity, location, &target.base, key, &next)
    }

    /// Writes one field and emits `Changed`.
    ///
    /// # Errors
    ///
    /// Returns `MissingTrait` if the entity lacks the trait, or
    /// `InvalidArgument` if `field` is out of range.
    pub fn set_field(
        &mut self,
        entity: Entity,
        target: impl Into<TraitRef>,
        field: FieldIndex,
        value: impl Into<Value>,
    ) -> Result<()> {
        let target = target.into();
        if !self.check_alive(entity, "set_field")? {
            return Ok(());
        }
        let key = self.data_key(entity, &target, "set_field")?;
        let location = self.location(entity)?;
        let slot = self
            .graph
            .get_mut(location.composition)
            .store_mut(&key)
            .and_then(|store| store.get_mut(location.slot, field.index()))
            .ok_or_else(|| {
                Error::invalid_argument(format!(
                    "field {} out of range for {}",
                    field.index(),
                    target.base.name()
                ))
            })?;
        *slot = value.into();
        self.emit(entity, key, ChangeKind::Changed);
        Ok(())
    }

    /// Mutable access to one field. Emits `Changed` up front.
    pub fn field_mut(
        &mut self,
        entity: Entity,
        target: impl Into<TraitRef>,
        field: FieldIndex,
    ) -> Option<&mut Value> {
        let target = target.into();
        if self.get_field(entity, target.clone(), field).is_none() {
            return None;
        }
        let key = target.key();
        self.emit(entity, key, ChangeKind::Changed);
        let location = self.entities.locate(entity)?;
        self.graph
            .get_mut(location.composition)
            .store_mut(&key)?
            .get_mut(location.slot, field.index())
    }

    /// Emits `Changed` without writing, for data mutated in place.
    ///
    /// # Errors
    ///
    /// Returns `MissingTrait` if the entity lacks the trait.
    pub fn mark_changed(&mut self, entity: Entity, target: impl Into<TraitRef>) -> Result<()> {
        let target = target.into();
        if !self.check_alive(entity, "mark_changed")? {
            return Ok(());
        }
        if !self.has(entity, target.clone()) {
            return Err(Error::missing_trait(entity, target.base.name())
                .with_context(ErrorContext::operation("mark_changed").with_entity(entity)));
        }
        self.emit(entity, target.key(), ChangeKind::Changed);
        Ok(())
    }

    /// Keys carried by an entity, excluding relation markers.
    #[must_use]
    pub fn traits_of(&self, entity: Entity) -> Vec<TraitKey> {
        let Some(location) = self.entities.locate(entity) else {
            return Vec::new();
        };
        self.graph
            .get(location.composition)
            .keys()
            .iter()
            .copied()
            .filter(|k| self.is_reported(*k))
            .collect()
    }

    // =========================================================================
    // Relations
    // =========================================================================

    /// Targets of `relation` held by `entity`, in key order.
    #[must_use]
    pub fn targets_for(&self, entity: Entity, relation: &Trait) -> Vec<Entity> {
        if !self.knows(relation) {
            return Vec::new();
        }
        self.targets_of(entity, relation.id())
    }

    /// First target of `relation` held by `entity`.
    #[must_use]
    pub fn target_for(&self, entity: Entity, relation: &Trait) -> Option<Entity> {
        self.targets_for(entity, relation).into_iter().next()
    }

    /// Entities holding a `relation` pair targeting `target`.
    #[must_use]
    pub fn sources_of(&self, relation: &Trait, target: Entity) -> Vec<Entity> {
        if !self.knows(relation) {
            return Vec::new();
        }
        self.relations
            .holders_of(target)
            .iter()
            .filter(|h| h.relation == relation.id())
            .map(|h| h.source)
            .collect()
    }

    /// Entities holding any pair targeting `target`.
    #[must_use]
    pub fn holders_of(&self, target: Entity) -> Vec<Entity> {
        let mut sources: Vec<Entity> = self
            .relations
            .holders_of(target)
            .iter()
            .map(|h| h.source)
            .collect();
        sources.sort_unstable();
        sources.dedup();
        sources
    }

    // =========================================================================
    // Singletons
    // =========================================================================

    /// Adds a trait to the world entity.
    ///
    /// # Errors
    ///
    /// Same as [`add`](Self::add).
    pub fn add_singleton(&mut self, instance: impl Into<TraitInstance>) -> Result<()> {
        let entity = self.world_entity()?;
        self.add(entity, instance)
    }

    /// Removes a trait from the world entity.
    ///
    /// # Errors
    ///
    /// Same as [`remove`](Self::remove).
    pub fn remove_singleton(&mut self, target: impl Into<TraitRef>) -> Result<()> {
        let entity = self.world_entity()?;
        self.remove(entity, target)
    }

    /// Writes singleton data.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    pub fn set_singleton(&mut self, target: impl Into<TraitRef>, data: impl Into<Value>) -> Result<()> {
        let entity = self.world_entity()?;
        self.set(entity, target, data)
    }

    /// Replaces singleton data with `f(current)`.
    ///
    /// # Errors
    ///
    /// Same as [`update`](Self::update).
    pub fn update_singleton(
        &mut self,
        target: impl Into<TraitRef>,
        f: impl FnOnce(Value) -> Value,
    ) -> Result<()> {
        let entity = self.world_entity()?;
        self.update(entity, target, f)
    }

    /// Reads singleton data.
    #[must_use]
    pub fn get_singleton(&self, target: impl Into<TraitRef>) -> Option<Value> {
        self.world_entity.and_then(|e| self.get(e, target))
    }

    /// Returns true if the world entity carries the trait.
    #[must_use]
    pub fn has_singleton(&self, target: impl Into<TraitRef>) -> bool {
        self.world_entity.is_some_and(|e| self.has(e, target))
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Evaluates a query. The first evaluation compiles and caches it.
    ///
    /// Tracking queries return changes since their previous evaluation.
    /// Queries naming a dead relation target are evaluated without being
    /// cached, and tracking ones among them match nothing.
    pub fn query(&mut self, query: &Query) -> QueryResult {
        if query.targets().iter().any(|t| !self.entities.is_alive(*t)) {
            return self.query_uncached(query);
        }
        let slot = self.queries.resolve(query, &self.graph, &mut self.changes);
        let mut entities: Vec<Entity> = self
            .queries
            .matching(slot)
            .iter()
            .flat_map(|id| self.graph.get(*id).entities().iter().copied())
            .collect();

        if query.is_tracking() {
            let since = self.queries.advance(slot, self.changes.cursor());
            filter_tracked(query, &self.changes, since, &mut entities);
            if let Some(oldest) = self.queries.min_cursor() {
                self.changes.prune(oldest);
            }
        }
        QueryResult::new(entities)
    }

    fn query_uncached(&self, query: &Query) -> QueryResult {
        if query.is_tracking() {
            return QueryResult::default();
        }
        let entities = self
            .graph
            .iter()
            .filter(|c| query.matches(c))
            .flat_map(|c| c.entities().iter().copied())
            .collect();
        QueryResult::new(entities)
    }

    /// First entity matching a query.
    pub fn query_first(&mut self, query: &Query) -> Option<Entity> {
        self.query(query).first()
    }

    /// Number of cached queries.
    #[must_use]
    pub fn query_count(&self) -> usize {
        self.queries.len()
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Calls `callback` for every change to `observed`.
    pub fn on_change<F>(&mut self, observed: impl Into<Observed>, callback: F) -> Subscription
    where
        F: FnMut(&ChangeEvent) + Send + 'static,
    {
        self.observers
            .subscribe(observed.into(), None, Box::new(callback))
    }

    /// Calls `callback` when `t` (or any pair of it) is added.
    pub fn on_add<F>(&mut self, t: &Trait, callback: F) -> Subscription
    where
        F: FnMut(&ChangeEvent) + Send + 'static,
    {
        self.observers
            .subscribe(t.into(), Some(ChangeKind::Added), Box::new(callback))
    }

    /// Calls `callback` when `t` (or any pair of it) is removed.
    pub fn on_remove<F>(&mut self, t: &Trait, callback: F) -> Subscription
    where
        F: FnMut(&ChangeEvent) + Send + 'static,
    {
        self.observers
            .subscribe(t.into(), Some(ChangeKind::Removed), Box::new(callback))
    }

    /// Calls `callback` when `t`'s data is written.
    pub fn on_set<F>(&mut self, t: &Trait, callback: F) -> Subscription
    where
        F: FnMut(&ChangeEvent) + Send + 'static,
    {
        self.observers
            .subscribe(t.into(), Some(ChangeKind::Changed), Box::new(callback))
    }

    /// Removes an observer. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        self.observers.unsubscribe(subscription)
    }

    /// Removes and returns logged changes for tracked traits.
    ///
    /// Tracking queries that have not yet consumed these changes will not
    /// see them.
    pub fn drain_changes(&mut self) -> Vec<ChangeEvent> {
        self.changes.drain()
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Live compositions, including the world entity's.
    #[must_use]
    pub fn compositions(&self) -> Vec<CompositionInfo> {
        self.graph.iter().map(Composition::info).collect()
    }

    /// Number of live compositions.
    #[must_use]
    pub fn composition_count(&self) -> usize {
        self.graph.len()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn world_entity(&self) -> Result<Entity> {
        self.world_entity
            .ok_or_else(|| Error::new(ErrorKind::Internal("world is not initialized".into())))
    }

    fn location(&self, entity: Entity) -> Result<Location> {
        self.entities
            .locate(entity)
            .ok_or_else(|| Error::new(ErrorKind::Internal(format!("{entity:?} has no location"))))
    }

    /// `Ok(true)` if alive; `Ok(false)` for a stale handle in lenient mode.
    fn check_alive(&self, entity: Entity, operation: &'static str) -> Result<bool> {
        if self.entities.is_alive(entity) {
            return Ok(true);
        }
        if self.config.strict.is_active() {
            warn!(world = %self.id, ?entity, operation, "rejected stale entity");
            return Err(Error::stale_entity(entity)
                .with_context(ErrorContext::operation(operation).with_entity(entity)));
        }
        trace!(?entity, operation, "ignored stale entity");
        Ok(false)
    }

    fn knows(&self, t: &Trait) -> bool {
        self.traits
            .get(&t.id())
            .is_some_and(|known| known.same_definition(t))
    }

    /// `Ok(true)` if seen here, `Ok(false)` if valid but unseen.
    fn check_known(&self, t: &Trait) -> Result<bool> {
        if self.knows(t) {
            Ok(true)
        } else if !self.traits.contains_key(&t.id()) && self.universe.owns(t) {
            Ok(false)
        } else {
            Err(foreign(t))
        }
    }

    fn register(&mut self, t: &Trait) -> Result<()> {
        if !self.check_known(t)? {
            trace!(world = %self.id, name = t.name(), "registered trait");
            self.traits.insert(t.id(), t.clone());
        }
        Ok(())
    }

    /// Checks an instance independent of the entity it goes on.
    fn validate(&self, instance: &TraitInstance) -> Result<TraitKey> {
        let base = &instance.base;
        if let Some(data) = &instance.data {
            if !base.has_data() {
                return Err(Error::invalid_argument(format!(
                    "{} carries no data",
                    base.name()
                )));
            }
            base.build_row(Some(data))?;
        }
        match (base.is_relation(), instance.target) {
            (true, Some(target)) if self.entities.is_alive(target) => {
                Ok(TraitKey::Pair(base.id(), target))
            }
            (true, Some(target)) => Err(Error::invalid_argument(format!(
                "relation target {target:?} is not alive in {}",
                self.id
            ))),
            (true, None) => Err(Error::invalid_argument(format!(
                "relation {} needs a target",
                base.name()
            ))),
            (false, None) => Ok(TraitKey::Trait(base.id())),
            (false, Some(_)) => Err(Error::invalid_argument(format!(
                "{} is not a relation",
                base.name()
            ))),
        }
    }

    /// Resolves the data-bearing key an existing trait lives under.
    fn data_key(&self, entity: Entity, target: &TraitRef, operation: &'static str) -> Result<TraitKey> {
        let context = || {
            ErrorContext::operation(operation)
                .with_entity(entity)
                .with_trait(target.base.name())
        };
        if !self.check_known(&target.base).map_err(|e| e.with_context(context()))? {
            return Err(Error::missing_trait(entity, target.base.name()).with_context(context()));
        }
        if target.base.is_relation() && target.target.is_none() {
            return Err(Error::invalid_argument(format!(
                "relation {} needs a target",
                target.base.name()
            ))
            .with_context(context()));
        }
        if !target.base.has_data() {
            return Err(Error::invalid_argument(format!(
                "{} carries no data",
                target.base.name()
            ))
            .with_context(context()));
        }
        let key = target.key();
        let present = self
            .entities
            .locate(entity)
            .is_some_and(|loc| self.graph.get(loc.composition).contains(&key));
        if !present {
            return Err(Error::missing_trait(entity, target.base.name()).with_context(context()));
        }
        Ok(key)
    }

    fn add_instance(&mut self, entity: Entity, instance: TraitInstance) -> Result<()> {
        let key = self.validate(&instance)?;
        let TraitInstance { base, target, data } = instance;
        let location = self.location(entity)?;

        if self.graph.get(location.composition).contains(&key) {
            if let Some(data) = data {
                self.write(entity, location, &base, key, &data)?;
            }
            return Ok(());
        }

        let row = if base.has_data() {
            Some(base.build_row(data.as_ref())?)
        } else {
            None
        };

        if let (Some(config), Some(target)) = (base.relation_config(), target) {
            if config.exclusive {
                for old in self.targets_of(entity, base.id()) {
                    if old != target {
                        self.remove_key(entity, TraitKey::Pair(base.id(), old));
                    }
                }
            }
        }

        let from = self.location(entity)?;
        let to = self.transition(from.composition, Edge::Add(key));
        self.relocate(entity, to, row.map(|r| (key, r)));
        if let (Some(config), Some(target)) = (base.relation_config(), target) {
            self.relations
                .link(entity, base.id(), target, config.auto_remove_target);
        }
        self.emit(entity, key, ChangeKind::Added);
        Ok(())
    }

    /// Merges `data` into an existing row atomically, then emits `Changed`.
    fn write(
        &mut self,
        entity: Entity,
        location: Location,
        base: &Trait,
        key: TraitKey,
        data: &Value,
    ) -> Result<()> {
        let store = self
            .graph
            .get_mut(location.composition)
            .store_mut(&key)
            .ok_or_else(|| Error::invalid_argument(format!("{} carries no data", base.name())))?;
        let mut row = store
            .row(location.slot)
            .ok_or_else(|| Error::new(ErrorKind::Internal(format!("{entity:?} has no row"))))?;
        base.merge_row(&mut row, data)?;
        store.replace_row(location.slot, row);
        self.emit(entity, key, ChangeKind::Changed);
        Ok(())
    }

    fn remove_key(&mut self, entity: Entity, key: TraitKey) -> bool {
        let Some(location) = self.entities.locate(entity) else {
            return false;
        };
        if !self.graph.get(location.composition).contains(&key) {
            return false;
        }
        let to = self.transition(location.composition, Edge::Remove(key));
        self.relocate(entity, to, None);
        if let TraitKey::Pair(relation, target) = key {
            self.relations.unlink(entity, relation, target);
        }
        self.emit(entity, key, ChangeKind::Removed);
        true
    }

    fn targets_of(&self, entity: Entity, relation: TraitId) -> Vec<Entity> {
        let Some(location) = self.entities.locate(entity) else {
            return Vec::new();
        };
        self.graph
            .get(location.composition)
            .keys()
            .iter()
            .filter_map(|k| match k {
                TraitKey::Pair(r, t) if *r == relation => Some(*t),
                _ => None,
            })
            .collect()
    }

    fn alloc(&mut self) -> Result<Entity> {
        let slot = self.graph.get(CompositionId::ROOT).len();
        let entity = self.entities.spawn(Location {
            composition: CompositionId::ROOT,
            slot,
        })?;
        self.graph
            .insert_entity(CompositionId::ROOT, entity, |_| Vec::new());
        Ok(entity)
    }

    fn transition(&mut self, from: CompositionId, edge: Edge) -> CompositionId {
        let traits = &self.traits;
        let (to, created) = self
            .graph
            .transition(from, edge, |key| data_width(traits, key));
        if created {
            self.queries.composition_created(self.graph.get(to));
        }
        to
    }

    /// Moves an entity to `to`, seeding the inserted key's row if given.
    fn relocate(
        &mut self,
        entity: Entity,
        to: CompositionId,
        mut inserted: Option<(TraitKey, Vec<Value>)>,
    ) {
        let Some(from) = self.entities.locate(entity) else {
            return;
        };
        let traits = &self.traits;
        let (slot, swapped) = self
            .graph
            .move_entity(from.composition, from.slot, to, |key| {
                match inserted.take_if(|(k, _)| k == key) {
                    Some((_, row)) => row,
                    None => default_row(traits, key),
                }
            });
        self.entities.relocate(entity, Location { composition: to, slot });
        if let Some(moved) = swapped {
            self.entities.relocate(moved, from);
        }
    }

    fn destroy_cascade(&mut self, root: Entity) {
        // Post-order walk over cascading holders. The `destroying` set marks
        // entities already scheduled so cycles and shared dependents are
        // visited once.
        let mut order = Vec::new();
        let mut stack = vec![(root, false)];
        while let Some((entity, expanded)) = stack.pop() {
            if expanded {
                order.push(entity);
                continue;
            }
            if !self.entities.is_alive(entity)
                || Some(entity) == self.world_entity
                || !self.destroying.insert(entity)
            {
                continue;
            }
            stack.push((entity, true));
            for dependent in self.relations.cascade_sources(entity) {
                stack.push((dependent, false));
            }
        }
        if order.len() > 1 {
            debug!(world = %self.id, ?root, count = order.len(), "cascading destroy");
        }
        for entity in order {
            self.finalize(entity);
            self.destroying.remove(&entity);
        }
    }

    fn finalize(&mut self, entity: Entity) {
        // Strip pairs other entities hold on this one.
        for holder in self.relations.take(entity) {
            self.remove_key(holder.source, TraitKey::Pair(holder.relation, entity));
        }

        let Some(location) = self.entities.locate(entity) else {
            return;
        };
        let keys = self.graph.get(location.composition).keys().to_vec();
        for key in &keys {
            if let TraitKey::Pair(relation, target) = key {
                self.relations.unlink(entity, *relation, *target);
            }
        }
        if let Some(moved) = self.graph.remove_entity(location.composition, location.slot) {
            self.entities.relocate(moved, location);
        }
        self.entities.free(entity);

        for key in keys {
            if self.is_reported(key) {
                self.emit(entity, key, ChangeKind::Removed);
            }
        }
        for id in self.graph.retire_target(entity) {
            self.queries.composition_retired(id);
        }
        self.queries.target_destroyed(entity, &mut self.changes);
        trace!(?entity, "destroyed entity");
    }

    /// False for the world marker and relation presence markers.
    fn is_reported(&self, key: TraitKey) -> bool {
        match key {
            TraitKey::World => false,
            TraitKey::Trait(id) => !self.traits.get(&id).is_some_and(Trait::is_relation),
            TraitKey::Pair(..) => true,
        }
    }

    fn emit(&mut self, entity: Entity, key: TraitKey, kind: ChangeKind) {
        let event = ChangeEvent { entity, key, kind };
        self.changes.record(&event);
        self.observers.notify(&event);
    }
}

impl Drop for World {
    fn drop(&mut self) {
        self.universe.release_world(self.id);
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("id", &self.id)
            .field("entities", &self.entity_count())
            .field("compositions", &self.graph.len())
            .field("queries", &self.queries.len())
            .field("observers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

fn foreign(t: &Trait) -> Error {
    Error::invalid_argument(format!("trait {} belongs to another universe", t.name()))
}

/// Column count for keys that own a store.
fn data_width(traits: &HashMap<TraitId, Trait>, key: &TraitKey) -> Option<usize> {
    match key {
        TraitKey::World => None,
        TraitKey::Trait(id) => traits
            .get(id)
            .filter(|t| !t.is_relation() && t.has_data())
            .map(Trait::field_count),
        TraitKey::Pair(id, _) => traits
            .get(id)
            .filter(|t| t.has_data())
            .map(Trait::field_count),
    }
}

fn default_row(traits: &HashMap<TraitId, Trait>, key: &TraitKey) -> Vec<Value> {
    key.trait_id()
        .and_then(|id| traits.get(&id))
        .map(Trait::default_row)
        .unwrap_or_default()
}
