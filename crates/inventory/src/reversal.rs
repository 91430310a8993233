//! Reversal planning.
//!
//! A reversal never edits the original entry's quantities: it plans a new
//! compensating movement plus the lot restoration needed to put the product
//! back exactly where it was, and the orchestrator commits both together while
//! flagging the original as reversed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use lotledger_core::{InventoryError, InventoryResult, MovementId};

use crate::lot::InventoryLot;
use crate::movement::{DraftMovement, MovementMetadata, StockMovement};

/// The lot record as it must look after the reversal is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotRestoration {
    pub lot: InventoryLot,
    /// Quantity put back (consumption reversal) or taken out (receipt
    /// reversal).
    pub quantity: i64,
}

/// Everything a commit needs to undo one ledger entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ReversalPlan {
    pub original_id: MovementId,
    pub draft: DraftMovement,
    pub restoration: Option<LotRestoration>,
}

/// Plan the inverse of a prior movement.
///
/// Fails with `AlreadyReversed` on a double reversal, `Validation` when the
/// target is itself a reversal or a zero-quantity entry, `LotConflict` when the
/// touched lot can no longer absorb the restoration (it was consumed or
/// reversed since), and `NegativeStock` when undoing a receipt that has since
/// been spent.
pub fn plan_reversal(
    original: &StockMovement,
    current_stock: i64,
    lots: &[InventoryLot],
    reason: &str,
    now: DateTime<Utc>,
) -> InventoryResult<ReversalPlan> {
    if original.is_reversed {
        return Err(InventoryError::AlreadyReversed(original.id));
    }
    if original.is_reversal() {
        return Err(InventoryError::validation(
            "a reversal cannot itself be reversed",
        ));
    }
    if original.quantity == 0 {
        return Err(InventoryError::validation(
            "movement has no quantity to reverse",
        ));
    }

    let mut draft = DraftMovement::delta(
        original.product_id,
        current_stock,
        -original.quantity,
        original.movement_type,
        now,
    )?
    .reversing(original.id)
    .with_metadata(MovementMetadata::with_notes(reason));

    if let Some(unit_cost) = original.unit_cost {
        draft = draft.with_unit_cost(unit_cost);
    }

    let restoration = match original.lot_id {
        None => None,
        Some(lot_id) => {
            let mut lot = lots
                .iter()
                .find(|l| l.id == lot_id)
                .cloned()
                .ok_or_else(|| InventoryError::not_found(format!("lot {lot_id}")))?;

            if original.quantity < 0 {
                // The original consumed the lot; put the quantity back.
                lot.restore(-original.quantity)?;
            } else {
                // The original received into the lot; take the quantity out
                // again (conflict if it was consumed in the meantime).
                lot.consume(original.quantity, now)?;
            }

            draft = draft.with_lot(lot_id);
            Some(LotRestoration {
                lot,
                quantity: original.quantity.abs(),
            })
        }
    };

    Ok(ReversalPlan {
        original_id: original.id,
        draft,
        restoration,
    })
}
