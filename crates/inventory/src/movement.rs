use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lotledger_core::{Entity, InventoryError, InventoryResult, LotId, MovementId, ProductId};

use crate::costing::round_to_minor_units;

/// Business category of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    In,
    Out,
    Adjustment,
    Transfer,
    Return,
    Loss,
    Found,
    BarcodeSale,
    BarcodeReceive,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "in",
            MovementType::Out => "out",
            MovementType::Adjustment => "adjustment",
            MovementType::Transfer => "transfer",
            MovementType::Return => "return",
            MovementType::Loss => "loss",
            MovementType::Found => "found",
            MovementType::BarcodeSale => "barcode_sale",
            MovementType::BarcodeReceive => "barcode_receive",
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether an entry is an original posting or a compensating reversal.
///
/// Reversals carry a back-reference to the entry they undo; the original is
/// flagged via `is_reversed`/`reversal_movement_id` in the same commit. Nothing
/// is ever edited in place beyond that pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MovementKind {
    Posted,
    Reversal { reverses: MovementId },
}

/// Descriptive fields captured on every ledger entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementMetadata {
    pub document_number: Option<String>,
    pub notes: Option<String>,
    pub processed_by: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl MovementMetadata {
    pub fn with_notes(notes: impl Into<String>) -> Self {
        Self {
            notes: Some(notes.into()),
            ..Self::default()
        }
    }
}

/// A movement the domain has decided on but the store has not committed yet.
///
/// The store assigns the per-product `sequence` during commit, promoting the
/// draft into a [`StockMovement`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftMovement {
    pub id: MovementId,
    pub product_id: ProductId,
    /// Signed stock delta.
    pub quantity: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub movement_type: MovementType,
    pub kind: MovementKind,
    pub lot_id: Option<LotId>,
    pub unit_cost: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    pub metadata: MovementMetadata,
    pub occurred_at: DateTime<Utc>,
}

impl DraftMovement {
    /// Build a delta posting on top of the given stock level.
    ///
    /// Rejects zero deltas and anything that would drive stock below zero.
    pub fn delta(
        product_id: ProductId,
        previous_stock: i64,
        quantity: i64,
        movement_type: MovementType,
        occurred_at: DateTime<Utc>,
    ) -> InventoryResult<Self> {
        if quantity == 0 {
            return Err(InventoryError::validation("quantity cannot be zero"));
        }

        let new_stock = previous_stock + quantity;
        if new_stock < 0 {
            return Err(InventoryError::NegativeStock {
                current: previous_stock,
                delta: quantity,
            });
        }

        Ok(Self {
            id: MovementId::new(),
            product_id,
            quantity,
            previous_stock,
            new_stock,
            movement_type,
            kind: MovementKind::Posted,
            lot_id: None,
            unit_cost: None,
            total_cost: None,
            metadata: MovementMetadata::default(),
            occurred_at,
        })
    }

    /// Build an absolute adjustment; the signed delta is computed from the
    /// admin-supplied target quantity, so it may legitimately drive stock down.
    pub fn adjustment(
        product_id: ProductId,
        previous_stock: i64,
        new_quantity: i64,
        occurred_at: DateTime<Utc>,
    ) -> InventoryResult<Self> {
        if new_quantity < 0 {
            return Err(InventoryError::validation(
                "adjustment target cannot be negative",
            ));
        }

        Ok(Self {
            id: MovementId::new(),
            product_id,
            quantity: new_quantity - previous_stock,
            previous_stock,
            new_stock: new_quantity,
            movement_type: MovementType::Adjustment,
            kind: MovementKind::Posted,
            lot_id: None,
            unit_cost: None,
            total_cost: None,
            metadata: MovementMetadata::default(),
            occurred_at,
        })
    }

    pub fn with_lot(mut self, lot_id: LotId) -> Self {
        self.lot_id = Some(lot_id);
        self
    }

    /// Attach a unit cost; the total is rounded to minor units here, at the
    /// point the value enters the ledger.
    pub fn with_unit_cost(mut self, unit_cost: Decimal) -> Self {
        self.unit_cost = Some(round_to_minor_units(unit_cost));
        self.total_cost = Some(round_to_minor_units(
            unit_cost * Decimal::from(self.quantity.abs()),
        ));
        self
    }

    pub fn with_metadata(mut self, metadata: MovementMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Mark this draft as the compensating entry for `original`.
    pub fn reversing(mut self, original: MovementId) -> Self {
        self.kind = MovementKind::Reversal {
            reverses: original,
        };
        self
    }
}

/// One immutable ledger entry, committed with a store-assigned sequence.
///
/// Append-only by policy: corrections are new compensating entries, never
/// in-place edits. The only post-commit mutation is the reversal pairing
/// (`is_reversed` + `reversal_movement_id`), applied atomically when the
/// compensating entry is posted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: MovementId,
    pub product_id: ProductId,
    /// Contiguous per-product position, assigned at commit.
    pub sequence: u64,
    pub quantity: i64,
    pub previous_stock: i64,
    pub new_stock: i64,
    pub movement_type: MovementType,
    pub kind: MovementKind,
    pub lot_id: Option<LotId>,
    pub unit_cost: Option<Decimal>,
    pub total_cost: Option<Decimal>,
    pub metadata: MovementMetadata,
    pub is_reversed: bool,
    pub reversal_movement_id: Option<MovementId>,
    pub occurred_at: DateTime<Utc>,
}

impl StockMovement {
    /// Promote a draft at commit time.
    pub fn from_draft(draft: DraftMovement, sequence: u64) -> Self {
        Self {
            id: draft.id,
            product_id: draft.product_id,
            sequence,
            quantity: draft.quantity,
            previous_stock: draft.previous_stock,
            new_stock: draft.new_stock,
            movement_type: draft.movement_type,
            kind: draft.kind,
            lot_id: draft.lot_id,
            unit_cost: draft.unit_cost,
            total_cost: draft.total_cost,
            metadata: draft.metadata,
            is_reversed: false,
            reversal_movement_id: None,
            occurred_at: draft.occurred_at,
        }
    }

    pub fn is_reversal(&self) -> bool {
        matches!(self.kind, MovementKind::Reversal { .. })
    }

    /// Whether this entry contributes to the stock reconciliation sum.
    ///
    /// A reversed original and its compensating entry cancel out and are both
    /// excluded, so `stock == Σ quantity` over the counted set at all times.
    pub fn counts_toward_stock(&self) -> bool {
        !self.is_reversed && !self.is_reversal()
    }
}

impl Entity for StockMovement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
