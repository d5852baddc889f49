//! Integration tests for Layer 0: Foundation
//!
//! Tests for core types: Entity handles, Value, Error, and persistent collections.

mod entities;
mod values;
