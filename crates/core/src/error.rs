//! Error taxonomy for the inventory ledger.

use thiserror::Error;

use crate::id::{LotId, MovementId, ProductId};

/// Result type used across the engine.
pub type InventoryResult<T> = Result<T, InventoryError>;

/// Deterministic, business-level failure of an inventory operation.
///
/// Every variant is returned to the immediate caller; the engine never retries
/// silently except for `ConcurrencyConflict` (see `is_retryable`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    /// A value failed validation (non-positive quantity, malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown product, movement, or lot.
    #[error("not found: {0}")]
    NotFound(String),

    /// The posting would drive the product's stock below zero.
    #[error("stock cannot go negative (current: {current}, delta: {delta})")]
    NegativeStock { current: i64, delta: i64 },

    /// Open lots cannot cover the requested consumption quantity.
    #[error("insufficient lot stock (requested: {requested}, available: {available})")]
    InsufficientStock { requested: i64, available: i64 },

    /// The product already carries a live lot with this number.
    #[error("duplicate lot number '{lot_number}' for product {product_id}")]
    DuplicateLot {
        product_id: ProductId,
        lot_number: String,
    },

    /// The movement has already been reversed.
    #[error("movement {0} is already reversed")]
    AlreadyReversed(MovementId),

    /// Restoring the lot would exceed its received quantity (e.g. the lot was
    /// further consumed since the original posting).
    #[error("lot conflict on {lot_id}: {reason}")]
    LotConflict { lot_id: LotId, reason: String },

    /// Optimistic concurrency token mismatch; the whole operation is safe to
    /// retry against refreshed state.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),
}

impl InventoryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn lot_conflict(lot_id: LotId, reason: impl Into<String>) -> Self {
        Self::LotConflict {
            lot_id,
            reason: reason.into(),
        }
    }

    pub fn concurrency(msg: impl Into<String>) -> Self {
        Self::ConcurrencyConflict(msg.into())
    }

    /// Whether the caller may safely retry the whole operation unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_concurrency_conflicts_are_retryable() {
        assert!(InventoryError::concurrency("stale token").is_retryable());
        assert!(!InventoryError::validation("bad qty").is_retryable());
        assert!(
            !InventoryError::InsufficientStock {
                requested: 10,
                available: 3
            }
            .is_retryable()
        );
    }
}
