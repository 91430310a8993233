//! Weighted-average unit costing.
//!
//! The running average is recomputed on every receipt and kept at full
//! precision; rounding to the currency's minor unit happens only where a value
//! is written into a ledger row or a report, so many small receipts do not
//! compound rounding error.

use rust_decimal::{Decimal, RoundingStrategy};

use lotledger_core::{InventoryError, InventoryResult};

/// Currency minor-unit precision (2 decimal places).
pub const MINOR_UNIT_DP: u32 = 2;

/// Round for persistence/reporting. Not for intermediate computation.
pub fn round_to_minor_units(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MINOR_UNIT_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Blend the incoming receipt into the current weighted-average cost.
///
/// `new = (stock * avg + qty * cost) / (stock + qty)`, with an empty (or
/// negative, after unlotted shrinkage) stock position taking the incoming cost
/// outright.
pub fn weighted_average_cost(
    current_stock: i64,
    current_avg_cost: Decimal,
    incoming_qty: i64,
    incoming_unit_cost: Decimal,
) -> InventoryResult<Decimal> {
    if incoming_qty <= 0 {
        return Err(InventoryError::validation(
            "incoming quantity must be positive",
        ));
    }
    if incoming_unit_cost < Decimal::ZERO {
        return Err(InventoryError::validation("unit cost cannot be negative"));
    }

    if current_stock <= 0 {
        return Ok(incoming_unit_cost);
    }

    let current = Decimal::from(current_stock);
    let incoming = Decimal::from(incoming_qty);

    Ok((current * current_avg_cost + incoming * incoming_unit_cost) / (current + incoming))
}
