//! Transport implementations.
//!
//! This module provides concrete implementations of the domain-level
//! transport interfaces. Domain code must not depend on
//! transport-specific types; everything is reached through the trait
//! objects defined in `crate::domain`.

mod memory;

pub use memory::MemoryBroker;
