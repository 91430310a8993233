//! Per-product inventory store boundary.
//!
//! This module defines an infrastructure-facing abstraction for loading a
//! product's state and atomically committing one operation's writes against
//! it, without making any storage assumptions.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryInventoryStore;
pub use r#trait::{CommitSet, InventoryStore, ProductSnapshot, ProductState, ReversalLink};
