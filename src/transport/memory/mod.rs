// src/transport/memory/mod.rs

//! In-memory transport implementation.
//!
//! This module provides a pure in-process implementation of the
//! domain-level transport interfaces, acting as both the point-to-point
//! and the durable substrate. It is the reference implementation of the
//! interface semantics and the workhorse of the integration tests.

mod broker;

pub use broker::MemoryBroker;
