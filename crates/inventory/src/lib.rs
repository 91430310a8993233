//! Inventory domain module.
//!
//! This crate contains the business rules for the stock ledger: movement
//! construction, lot lifecycle, weighted-average costing, FEFO consumption
//! planning, and reversal planning. Everything here is deterministic domain
//! logic (no IO, no HTTP, no storage).

pub mod allocation;
pub mod costing;
pub mod lot;
pub mod movement;
pub mod reversal;

pub use allocation::{fefo_ordering, plan_fefo_consumption, ConsumptionPlan, LotAllocation};
pub use costing::{round_to_minor_units, weighted_average_cost, MINOR_UNIT_DP};
pub use lot::{InventoryLot, LotStatus};
pub use movement::{DraftMovement, MovementKind, MovementMetadata, MovementType, StockMovement};
pub use reversal::{plan_reversal, LotRestoration, ReversalPlan};
