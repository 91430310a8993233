//! Storage boundary for the inventory ledger.
//!
//! The engine talks to persistence exclusively through the [`store`] traits;
//! the in-memory implementation backs tests, development, and single-process
//! deployments.

pub mod store;

pub use store::{
    CommitSet, InMemoryInventoryStore, InventoryStore, ProductSnapshot, ProductState, ReversalLink,
};
