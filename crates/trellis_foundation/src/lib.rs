//! Core types, values, and persistent collections for Trellis.
//!
//! This crate provides:
//! - [`Entity`] - Packed generational entity handles
//! - [`Value`] - The dynamic value type carried by trait fields
//! - [`Error`] - Rich error types with context
//! - Persistent collections ([`LtVec`], [`LtMap`])

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod collections;
pub mod entity;
pub mod error;
pub mod value;

pub use collections::{LtMap, LtVec};
pub use entity::{Entity, WorldId};
pub use error::{CapacityLimit, Error, ErrorContext, ErrorKind, Result};
pub use value::Value;
