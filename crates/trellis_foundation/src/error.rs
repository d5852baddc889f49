//! Error types for Trellis.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.
//! All errors are synchronous and reported to the direct caller.

use std::fmt;

use thiserror::Error;

use crate::entity::Entity;

/// The main error type for Trellis operations.
#[derive(Debug, Error)]
#[error("{kind}{}", .context.as_ref().map(|c| format!(" ({c})")).unwrap_or_default())]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

/// Shorthand result type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Creates a capacity error.
    #[must_use]
    pub fn capacity_exceeded(limit: CapacityLimit) -> Self {
        Self::new(ErrorKind::CapacityExceeded(limit))
    }

    /// Creates a missing trait error.
    #[must_use]
    pub fn missing_trait(entity: Entity, trait_name: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingTrait {
            entity,
            trait_name: trait_name.into(),
        })
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument(message.into()))
    }

    /// Creates a duplicate definition error.
    #[must_use]
    pub fn duplicate_definition(name: impl Into<String>) -> Self {
        Self::new(ErrorKind::DuplicateDefinition(name.into()))
    }

    /// Creates a stale entity reference error.
    #[must_use]
    pub fn stale_entity(entity: Entity) -> Self {
        Self::new(ErrorKind::StaleEntity(entity))
    }

    /// Creates an unknown field error.
    #[must_use]
    pub fn unknown_field(trait_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownField {
            trait_name: trait_name.into(),
            field: field.into(),
        })
    }

    /// Returns true if this is a [`ErrorKind::MissingTrait`] error.
    #[must_use]
    pub fn is_missing_trait(&self) -> bool {
        matches!(self.kind, ErrorKind::MissingTrait { .. })
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Error)]
pub enum ErrorKind {
    /// An entity or world ceiling was reached.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(CapacityLimit),

    /// The entity does not carry the trait the operation needs.
    #[error("entity {entity:?} has no trait {trait_name}")]
    MissingTrait {
        /// The entity that was queried.
        entity: Entity,
        /// Name of the missing trait.
        trait_name: String,
    },

    /// Malformed input: data for a tag, dead relation target, foreign trait.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A trait or relation name was registered twice.
    #[error("duplicate definition: {0}")]
    DuplicateDefinition(String),

    /// Entity handle is stale (destroyed or recycled). Only raised in strict mode.
    #[error("stale entity reference: {0:?}")]
    StaleEntity(Entity),

    /// Field name is not part of the trait schema.
    #[error("unknown field {field} on trait {trait_name}")]
    UnknownField {
        /// The trait whose schema was consulted.
        trait_name: String,
        /// The field that was not found.
        field: String,
    },

    /// Internal invariant violation (should not happen).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Ceilings that can be exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityLimit {
    /// Configured maximum live entities per world.
    Entities {
        /// The configured limit.
        limit: u32,
    },
    /// Maximum simultaneously live worlds per universe.
    Worlds {
        /// The configured limit.
        limit: u8,
    },
}

impl fmt::Display for CapacityLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entities { limit } => write!(f, "max entities ({limit}) reached"),
            Self::Worlds { limit } => write!(f, "max worlds ({limit}) reached"),
        }
    }
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Operation that failed (`add`, `set`, `spawn`, ...).
    pub operation: Option<&'static str>,
    /// Entity the operation targeted.
    pub entity: Option<Entity>,
    /// Trait the operation targeted.
    pub trait_name: Option<String>,
}

impl ErrorContext {
    /// Creates a context naming the failed operation.
    #[must_use]
    pub fn operation(operation: &'static str) -> Self {
        Self {
            operation: Some(operation),
            ..Self::default()
        }
    }

    /// Sets the entity.
    #[must_use]
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entity = Some(entity);
        self
    }

    /// Sets the trait name.
    #[must_use]
    pub fn with_trait(mut self, name: impl Into<String>) -> Self {
        self.trait_name = Some(name.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sep = "";
        if let Some(op) = self.operation {
            write!(f, "in {op}")?;
            sep = ", ";
        }
        if let Some(e) = self.entity {
            write!(f, "{sep}entity {e:?}")?;
            sep = ", ";
        }
        if let Some(name) = &self.trait_name {
            write!(f, "{sep}trait {name}")?;
        }
        Ok(())
    }
}
