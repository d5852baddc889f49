//! Borrowed handles bound to a single entity.

use trellis_foundation::{Entity, Result, Value};

use crate::registry::{FieldIndex, Trait, TraitInstance, TraitRef};
use crate::world::World;

/// Read access to one entity.
#[derive(Clone, Copy, Debug)]
pub struct EntityRef<'w> {
    world: &'w World,
    entity: Entity,
}

impl<'w> EntityRef<'w> {
    pub(crate) fn new(world: &'w World, entity: Entity) -> Self {
        Self { world, entity }
    }

    /// The entity handle.
    #[must_use]
    pub fn id(&self) -> Entity {
        self.entity
    }

    /// Returns true if the entity is still alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.world.is_alive(self.entity)
    }

    /// See [`World::has`].
    #[must_use]
    pub fn has(&self, target: impl Into<TraitRef>) -> bool {
        self.world.has(self.entity, target)
    }

    /// See [`World::get`].
    #[must_use]
    pub fn get(&self, target: impl Into<TraitRef>) -> Option<Value> {
        self.world.get(self.entity, target)
    }

    /// See [`World::get_field`].
    #[must_use]
    pub fn get_field(&self, target: impl Into<TraitRef>, field: FieldIndex) -> Option<&'w Value> {
        self.world.get_field(self.entity, target, field)
    }

    /// See [`World::target_for`].
    #[must_use]
    pub fn target_for(&self, relation: &Trait) -> Option<Entity> {
        self.world.target_for(self.entity, relation)
    }

    /// See [`World::targets_for`].
    #[must_use]
    pub fn targets_for(&self, relation: &Trait) -> Vec<Entity> {
        self.world.targets_for(self.entity, relation)
    }
}

/// Write access to one entity.
///
/// Every method forwards to the matching [`World`] operation, so stale
/// handles behave exactly as they do there.
#[derive(Debug)]
pub struct EntityMut<'w> {
    world: &'w mut World,
    entity: Entity,
}

impl<'w> EntityMut<'w> {
    pub(crate) fn new(world: &'w mut World, entity: Entity) -> Self {
        Self { world, entity }
    }

    /// The entity handle.
    #[must_use]
    pub fn id(&self) -> Entity {
        self.entity
    }

    /// Downgrades to read access.
    #[must_use]
    pub fn as_readonly(&self) -> EntityRef<'_> {
        EntityRef::new(self.world, self.entity)
    }

    /// Returns true if the entity is still alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.world.is_alive(self.entity)
    }

    /// See [`World::has`].
    #[must_use]
    pub fn has(&self, target: impl Into<TraitRef>) -> bool {
        self.world.has(self.entity, target)
    }

    /// See [`World::get`].
    #[must_use]
    pub fn get(&self, target: impl Into<TraitRef>) -> Option<Value> {
        self.world.get(self.entity, target)
    }

    /// See [`World::get_field`].
    #[must_use]
    pub fn get_field(&self, target: impl Into<TraitRef>, field: FieldIndex) -> Option<&Value> {
        self.world.get_field(self.entity, target, field)
    }

    /// See [`World::target_for`].
    #[must_use]
    pub fn target_for(&self, relation: &Trait) -> Option<Entity> {
        self.world.target_for(self.entity, relation)
    }

    /// See [`World::targets_for`].
    #[must_use]
    pub fn targets_for(&self, relation: &Trait) -> Vec<Entity> {
        self.world.targets_for(self.entity, relation)
    }

    /// See [`World::add`].
    ///
    /// # Errors
    ///
    /// Same as [`World::add`].
    pub fn add(&mut self, instance: impl Into<TraitInstance>) -> Result<()> {
        self.world.add(self.entity, instance)
    }

    /// See [`World::remove`].
    ///
    /// # Errors
    ///
    /// Same as [`World::remove`].
    pub fn remove(&mut self, target: impl Into<TraitRef>) -> Result<()> {
        self.world.remove(self.entity, target)
    }

    /// See [`World::set`].
    ///
    /// # Errors
    ///
    /// Same as [`World::set`].
    pub fn set(&mut self, target: impl Into<TraitRef>, data: impl Into<Value>) -> Result<()> {
        self.world.set(self.entity, target, data)
    }

    /// See [`World::update`].
    ///
    /// # Errors
    ///
    /// Same as [`World::update`].
    pub fn update(
        &mut self,
        target: impl Into<TraitRef>,
        f: impl FnOnce(Value) -> Value,
    ) -> Result<()> {
        self.world.update(self.entity, target, f)
    }

    /// See [`World::set_field`].
    ///
    /// # Errors
    ///
    /// Same as [`World::set_field`].
    pub fn set_field(
        &mut self,
        target: impl Into<TraitRef>,
        field: FieldIndex,
        value: impl Into<Value>,
    ) -> Result<()> {
        self.world.set_field(self.entity, target, field, value)
    }

    /// See [`World::field_mut`].
    pub fn field_mut(&mut self, target: impl Into<TraitRef>, field: FieldIndex) -> Option<&mut Value> {
        self.world.field_mut(self.entity, target, field)
    }

    /// See [`World::mark_changed`].
    ///
    /// # Errors
    ///
    /// Same as [`World::mark_changed`].
    pub fn mark_changed(&mut self, target: impl Into<TraitRef>) -> Result<()> {
        self.world.mark_changed(self.entity, target)
    }

    /// Destroys the entity. The handle stays usable; reads return `None`.
    ///
    /// # Errors
    ///
    /// Same as [`World::destroy_entity`].
    pub fn destroy(&mut self) -> Result<()> {
        self.world.destroy_entity(self.entity)
    }
}
