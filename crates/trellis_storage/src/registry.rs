//! Trait registry and trait handles.
//!
//! A [`Trait`] is the registered form of a [`TraitSchema`]: a stable id plus
//! a shared definition with precomputed field offsets. Handles are cheap to
//! clone and are what callers pass to every world operation.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use trellis_foundation::{Entity, Error, LtMap, Result, Value};

use crate::schema::{FieldSchema, RelationConfig, TraitKind, TraitSchema};

/// Dense id assigned to a trait at definition time.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TraitId(u32);

impl TraitId {
    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TraitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Column position of a field inside its trait's store.
///
/// Resolve once with [`Trait::field`] and reuse in hot loops.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldIndex(usize);

impl FieldIndex {
    /// Returns the column number.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Shared trait definition.
pub(crate) struct TraitDef {
    id: TraitId,
    name: Arc<str>,
    kind: TraitKind,
    fields: Vec<FieldSchema>,
    offsets: HashMap<Arc<str>, usize>,
}

/// Handle to a registered trait.
#[derive(Clone)]
pub struct Trait {
    def: Arc<TraitDef>,
}

impl Trait {
    fn from_schema(id: TraitId, schema: TraitSchema) -> Self {
        let offsets = schema
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        Self {
            def: Arc::new(TraitDef {
                id,
                name: schema.name,
                kind: schema.kind,
                fields: schema.fields,
                offsets,
            }),
        }
    }

    /// Returns the trait id.
    #[must_use]
    pub fn id(&self) -> TraitId {
        self.def.id
    }

    /// Returns the trait name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// Returns the trait kind.
    #[must_use]
    pub fn kind(&self) -> TraitKind {
        self.def.kind
    }

    /// Returns true for presence-only traits.
    #[must_use]
    pub fn is_tag(&self) -> bool {
        self.def.kind == TraitKind::Tag
    }

    /// Returns true if the trait is a relation.
    #[must_use]
    pub fn is_relation(&self) -> bool {
        matches!(self.def.kind, TraitKind::Relation(_))
    }

    /// Returns the relation configuration, if this is a relation.
    #[must_use]
    pub fn relation_config(&self) -> Option<RelationConfig> {
        match self.def.kind {
            TraitKind::Relation(config) => Some(config),
            _ => None,
        }
    }

    /// Returns true if instances carry field data.
    #[must_use]
    pub fn has_data(&self) -> bool {
        !self.def.fields.is_empty()
    }

    /// Resolves a field name to its column.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<FieldIndex> {
        self.def.offsets.get(name).copied().map(FieldIndex)
    }

    /// Returns the name of the field at `index`.
    #[must_use]
    pub fn field_name(&self, index: FieldIndex) -> Option<&str> {
        self.def.fields.get(index.0).map(|f| &*f.name)
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.def.fields.len()
    }

    /// Iterates field names in storage order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.def.fields.iter().map(|f| &*f.name)
    }

    /// Instance with default data.
    #[must_use]
    pub fn instance(&self) -> TraitInstance {
        TraitInstance {
            base: self.clone(),
            target: None,
            data: None,
        }
    }

    /// Instance with initial data. Missing fields take their defaults.
    #[must_use]
    pub fn with(&self, data: impl Into<Value>) -> TraitInstance {
        TraitInstance {
            base: self.clone(),
            target: None,
            data: Some(data.into()),
        }
    }

    /// Pairs this relation with a target entity.
    #[must_use]
    pub fn pair(&self, target: Entity) -> Pair {
        Pair {
            relation: self.clone(),
            target,
        }
    }

    /// True if both handles come from the same definition.
    pub(crate) fn same_definition(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.def, &other.def)
    }

    /// A fresh row of defaults, invoking factories.
    pub(crate) fn default_row(&self) -> Vec<Value> {
        self.def.fields.iter().map(|f| f.default.produce()).collect()
    }

    /// Builds a full row from optional partial data.
    pub(crate) fn build_row(&self, data: Option<&Value>) -> Result<Vec<Value>> {
        let mut row = self.default_row();
        if let Some(data) = data {
            self.merge_row(&mut row, data)?;
        }
        Ok(row)
    }

    /// Overwrites the fields named in `data`, leaving others untouched.
    pub(crate) fn merge_row(&self, row: &mut [Value], data: &Value) -> Result<()> {
        if !self.has_data() {
            return Err(Error::invalid_argument(format!(
                "{} carries no data",
                self.name()
            )));
        }
        let Value::Map(map) = data else {
            return Err(Error::invalid_argument(format!(
                "{} expects a record, got {}",
                self.name(),
                data.type_name()
            )));
        };
        for (key, value) in map.iter() {
            let Some(name) = key.as_str() else {
                return Err(Error::invalid_argument(format!(
                    "{} record keys must be strings, got {}",
                    self.name(),
                    key.type_name()
                )));
            };
            let offset = self
                .def
                .offsets
                .get(name)
                .copied()
                .ok_or_else(|| Error::unknown_field(self.name(), name))?;
            row[offset] = value.clone();
        }
        Ok(())
    }

    /// Packs a row back into a record.
    pub(crate) fn row_to_value(&self, row: &[Value]) -> Value {
        let map: LtMap<Value, Value> = self
            .def
            .fields
            .iter()
            .zip(row)
            .map(|(f, v)| (Value::from(&*f.name), v.clone()))
            .collect();
        Value::Map(map)
    }
}

impl PartialEq for Trait {
    fn eq(&self, other: &Self) -> bool {
        self.same_definition(other)
    }
}

impl Eq for Trait {}

impl Hash for Trait {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.def.id.hash(state);
    }
}

impl fmt::Debug for Trait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Trait({}{})", self.def.name, self.def.id)
    }
}

/// A relation paired with a target entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Pair {
    relation: Trait,
    target: Entity,
}

impl Pair {
    /// The relation half.
    #[must_use]
    pub fn relation(&self) -> &Trait {
        &self.relation
    }

    /// The target half.
    #[must_use]
    pub fn target(&self) -> Entity {
        self.target
    }

    /// Pair instance carrying edge data.
    #[must_use]
    pub fn with(&self, data: impl Into<Value>) -> TraitInstance {
        TraitInstance {
            base: self.relation.clone(),
            target: Some(self.target),
            data: Some(data.into()),
        }
    }
}

/// A trait plus optional target and initial data, ready to be added.
#[derive(Clone, Debug)]
pub struct TraitInstance {
    pub(crate) base: Trait,
    pub(crate) target: Option<Entity>,
    pub(crate) data: Option<Value>,
}

impl TraitInstance {
    /// The trait being added.
    #[must_use]
    pub fn base(&self) -> &Trait {
        &self.base
    }

    /// Relation target, for pair instances.
    #[must_use]
    pub fn target(&self) -> Option<Entity> {
        self.target
    }

    /// Initial data, if any was supplied.
    #[must_use]
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }
}

impl From<&Trait> for TraitInstance {
    fn from(t: &Trait) -> Self {
        t.instance()
    }
}

impl From<Trait> for TraitInstance {
    fn from(t: Trait) -> Self {
        t.instance()
    }
}

impl From<Pair> for TraitInstance {
    fn from(p: Pair) -> Self {
        Self {
            base: p.relation,
            target: Some(p.target),
            data: None,
        }
    }
}

impl From<&Pair> for TraitInstance {
    fn from(p: &Pair) -> Self {
        p.clone().into()
    }
}

/// A trait, optionally narrowed to one relation target, used to address
/// existing data.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TraitRef {
    pub(crate) base: Trait,
    pub(crate) target: Option<Entity>,
}

impl TraitRef {
    /// The referenced trait.
    #[must_use]
    pub fn base(&self) -> &Trait {
        &self.base
    }

    /// Relation target, if narrowed to a pair.
    #[must_use]
    pub fn target(&self) -> Option<Entity> {
        self.target
    }

    /// The composition key this reference names.
    pub(crate) fn key(&self) -> TraitKey {
        match self.target {
            Some(target) => TraitKey::Pair(self.base.id(), target),
            None => TraitKey::Trait(self.base.id()),
        }
    }
}

impl From<&Trait> for TraitRef {
    fn from(t: &Trait) -> Self {
        Self {
            base: t.clone(),
            target: None,
        }
    }
}

impl From<Trait> for TraitRef {
    fn from(t: Trait) -> Self {
        Self {
            base: t,
            target: None,
        }
    }
}

impl From<Pair> for TraitRef {
    fn from(p: Pair) -> Self {
        Self {
            base: p.relation,
            target: Some(p.target),
        }
    }
}

impl From<&Pair> for TraitRef {
    fn from(p: &Pair) -> Self {
        p.clone().into()
    }
}

/// Element of a composition's key set.
///
/// Keys sort with `World` first, then plain traits by id, then pairs by
/// relation id and target.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TraitKey {
    /// Marks the hidden world entity.
    World,
    /// A plain trait, or the presence marker of a relation.
    Trait(TraitId),
    /// A relation paired with a specific target.
    Pair(TraitId, Entity),
}

impl TraitKey {
    /// The trait id, if any.
    #[must_use]
    pub const fn trait_id(self) -> Option<TraitId> {
        match self {
            Self::World => None,
            Self::Trait(id) | Self::Pair(id, _) => Some(id),
        }
    }

    /// The pair target, if this is a pair key.
    #[must_use]
    pub const fn target(self) -> Option<Entity> {
        match self {
            Self::Pair(_, target) => Some(target),
            _ => None,
        }
    }

    /// Returns true for pair keys.
    #[must_use]
    pub const fn is_pair(self) -> bool {
        matches!(self, Self::Pair(..))
    }
}

/// Name-to-definition registry owned by a universe.
#[derive(Default)]
pub(crate) struct TraitRegistry {
    defs: Vec<Trait>,
    by_name: HashMap<Arc<str>, TraitId>,
}

impl TraitRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers a schema and returns its handle.
    pub(crate) fn define(&mut self, schema: TraitSchema) -> Result<Trait> {
        schema.validate()?;
        if self.by_name.contains_key(&schema.name) {
            return Err(Error::duplicate_definition(&*schema.name));
        }
        let index = u32::try_from(self.defs.len())
            .map_err(|_| Error::invalid_argument("trait id space exhausted"))?;
        let id = TraitId(index);
        let name = schema.name.clone();
        let handle = Trait::from_schema(id, schema);
        self.defs.push(handle.clone());
        self.by_name.insert(name, id);
        Ok(handle)
    }

    pub(crate) fn get(&self, id: TraitId) -> Option<&Trait> {
        self.defs.get(id.0 as usize)
    }

    pub(crate) fn by_name(&self, name: &str) -> Option<&Trait> {
        self.by_name.get(name).and_then(|id| self.get(*id))
    }

    /// True if `handle` was issued by this registry.
    pub(crate) fn owns(&self, handle: &Trait) -> bool {
        self.get(handle.id())
            .is_some_and(|known| known.same_definition(handle))
    }

    pub(crate) fn len(&self) -> usize {
        self.defs.len()
    }

    pub(crate) fn clear(&mut self) {
        self.defs.clear();
        self.by_name.clear();
    }
}
