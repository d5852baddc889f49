//! Schema definitions for traits and relations.
//!
//! Schemas describe the shape of a trait before it is registered with a
//! [`Universe`](crate::Universe). Registration turns a schema into a
//! [`Trait`](crate::Trait) with a fixed id and precomputed field offsets.

use std::fmt;
use std::sync::Arc;

use trellis_foundation::{Error, Result, Value};

/// How a field obtains its initial value.
#[derive(Clone)]
pub enum FieldDefault {
    /// Literal default, cloned into every new slot.
    Value(Value),
    /// Factory evaluated once per new instance.
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl FieldDefault {
    /// Produces the initial value for a new instance.
    #[must_use]
    pub fn produce(&self) -> Value {
        match self {
            Self::Value(v) => v.clone(),
            Self::Factory(f) => f(),
        }
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "Value({v:?})"),
            Self::Factory(_) => write!(f, "Factory(..)"),
        }
    }
}

/// Schema definition for a trait field.
#[derive(Clone, Debug)]
pub struct FieldSchema {
    /// Field name.
    pub name: Arc<str>,
    /// Initial value source.
    pub default: FieldDefault,
}

impl FieldSchema {
    /// Creates a field with a literal default.
    #[must_use]
    pub fn new(name: &str, default: impl Into<Value>) -> Self {
        Self {
            name: Arc::from(name),
            default: FieldDefault::Value(default.into()),
        }
    }

    /// Creates a field whose default is produced by `factory` for each instance.
    #[must_use]
    pub fn factory<F>(name: &str, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            default: FieldDefault::Factory(Arc::new(factory)),
        }
    }
}

/// Behaviour of a relation, fixed at definition time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelationConfig {
    /// An entity holds at most one target; adding a new one replaces the old.
    pub exclusive: bool,
    /// Destroying the target destroys every holder, recursively.
    pub auto_remove_target: bool,
}

/// The variant of a trait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraitKind {
    /// Presence-only marker.
    Tag,
    /// Structured data with named fields.
    Schema,
    /// Entity-to-entity edge, optionally carrying fields.
    Relation(RelationConfig),
}

/// Schema definition for a trait.
#[derive(Clone, Debug)]
pub struct TraitSchema {
    /// Trait name (e.g., `Position`, `ChildOf`). Unique per universe.
    pub name: Arc<str>,
    /// Tag, schema, or relation.
    pub kind: TraitKind,
    /// Field definitions, in storage order.
    pub fields: Vec<FieldSchema>,
}

impl TraitSchema {
    /// Creates a schema trait with no fields yet.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            kind: TraitKind::Schema,
            fields: Vec::new(),
        }
    }

    /// Creates a tag trait (no fields).
    #[must_use]
    pub fn tag(name: &str) -> Self {
        Self {
            kind: TraitKind::Tag,
            ..Self::new(name)
        }
    }

    /// Creates a relation with default configuration.
    #[must_use]
    pub fn relation(name: &str) -> Self {
        Self {
            kind: TraitKind::Relation(RelationConfig::default()),
            ..Self::new(name)
        }
    }

    /// Adds a field to the schema.
    #[must_use]
    pub fn with_field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a field with a literal default.
    #[must_use]
    pub fn with_default(self, name: &str, default: impl Into<Value>) -> Self {
        self.with_field(FieldSchema::new(name, default))
    }

    /// Adds a field with a per-instance factory.
    #[must_use]
    pub fn with_factory<F>(self, name: &str, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.with_field(FieldSchema::factory(name, factory))
    }

    /// Marks the trait as an exclusive relation.
    #[must_use]
    pub fn exclusive(mut self) -> Self {
        match &mut self.kind {
            TraitKind::Relation(config) => config.exclusive = true,
            _ => self.kind = TraitKind::Relation(RelationConfig {
                exclusive: true,
                auto_remove_target: false,
            }),
        }
        self
    }

    /// Marks the trait as a relation that cascades on target destruction.
    #[must_use]
    pub fn auto_remove_target(mut self) -> Self {
        match &mut self.kind {
            TraitKind::Relation(config) => config.auto_remove_target = true,
            _ => self.kind = TraitKind::Relation(RelationConfig {
                exclusive: false,
                auto_remove_target: true,
            }),
        }
        self
    }

    /// Returns the field schema by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| &*f.name == name)
    }

    /// Checks the schema is well formed.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is empty, a tag declares fields, or a
    /// field name repeats.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::invalid_argument("trait name must not be empty"));
        }
        if self.kind == TraitKind::Tag && !self.fields.is_empty() {
            return Err(Error::invalid_argument(format!(
                "tag {} cannot declare fields",
                self.name
            )));
        }
        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(Error::duplicate_definition(format!(
                    "{}.{}",
                    self.name, field.name
                )));
            }
        }
        Ok(())
    }
}
