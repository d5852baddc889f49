//! Entity storage, compositions, relations, and queries for Trellis.
//!
//! This crate provides:
//! - [`Universe`] - Trait definitions shared by up to 16 worlds
//! - [`World`] - Entities grouped by composition, with column stores per trait
//! - [`Query`] - Cached composition matching with change tracking
//! - [`Observers`] - Synchronous change callbacks
//!
//! ```
//! use trellis_storage::{TraitSchema, Universe, WorldConfig};
//! use trellis_foundation::Value;
//!
//! let universe = Universe::new();
//! let position = universe
//!     .define(TraitSchema::new("Position").with_default("x", 0.0).with_default("y", 0.0))
//!     .unwrap();
//! let mut world = universe.create_world(WorldConfig::default()).unwrap();
//!
//! let e = world.spawn([position.with(Value::record([("x", 1.0)]))]).unwrap();
//! assert_eq!(
//!     world.get(e, &position),
//!     Some(Value::record([("x", 1.0), ("y", 0.0)]))
//! );
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod access;
pub mod composition;
pub mod config;
pub mod entity;
pub mod observe;
pub mod query;
pub mod registry;
pub mod relation;
pub mod schema;
pub mod store;
pub mod universe;
pub mod world;

pub use access::{EntityMut, EntityRef};
pub use composition::{CompositionId, CompositionInfo};
pub use config::{StrictMode, WorldConfig};
pub use observe::{Callback, ChangeEvent, ChangeKind, Observed, Observers, Subscription};
pub use query::{Query, QueryResult, Selector, Term};
pub use registry::{FieldIndex, Pair, Trait, TraitId, TraitInstance, TraitKey, TraitRef};
pub use schema::{FieldDefault, FieldSchema, RelationConfig, TraitKind, TraitSchema};
pub use universe::Universe;
pub use world::World;
