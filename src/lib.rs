//! Trellis - archetype-based entity-component store
//!
//! This crate re-exports all layers of the Trellis system for convenient access.
//! For detailed documentation, see the individual layer crates.
//!
//! # Architecture
//!
//! ```text
//! Layer 1: trellis_storage    — Universe, worlds, compositions, relations, queries
//! Layer 0: trellis_foundation — Core types (Value, Entity, Error)
//! ```

pub use trellis_foundation as foundation;
pub use trellis_storage as storage;
