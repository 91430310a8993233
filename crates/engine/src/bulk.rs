//! Bulk stock updates.
//!
//! A batch is a list of independent per-product items; each item either lands
//! or fails on its own, and the batch never aborts early. Items may carry an
//! idempotency key so a re-submitted batch (sync jobs, flaky uploads) posts
//! each item at most once.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lotledger_core::{InventoryResult, ProductId};
use lotledger_infra::InventoryStore;
use lotledger_inventory::{MovementMetadata, StockMovement};

use crate::engine::InventoryEngine;

/// What a single bulk item does to its product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum BulkAction {
    /// Untracked receipt.
    Receive { quantity: i64 },
    /// Lot-tracked receipt with costing.
    ReceiveLot {
        quantity: i64,
        unit_cost: Decimal,
        lot_number: String,
        expiry_date: Option<NaiveDate>,
    },
    /// Untracked issue.
    Issue { quantity: i64 },
    /// FEFO-allocated issue across the product's lots.
    IssueFefo { quantity: i64 },
    /// Absolute stock-take correction.
    SetQuantity { quantity: i64 },
}

/// One item of a bulk update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkStockItem {
    pub product_id: ProductId,
    #[serde(flatten)]
    pub action: BulkAction,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub metadata: MovementMetadata,
}

impl BulkStockItem {
    pub fn new(product_id: ProductId, action: BulkAction) -> Self {
        Self {
            product_id,
            action,
            idempotency_key: None,
            metadata: MovementMetadata::default(),
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_metadata(mut self, metadata: MovementMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Per-item result, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOutcome {
    pub product_id: ProductId,
    pub idempotency_key: Option<String>,
    pub result: InventoryResult<Vec<StockMovement>>,
}

impl BulkOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// The whole batch's outcomes plus success/failure tallies.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkReport {
    pub outcomes: Vec<BulkOutcome>,
    pub succeeded: usize,
    pub failed: usize,
}

impl<S> InventoryEngine<S>
where
    S: InventoryStore,
{
    /// Apply a batch of stock updates, continuing past per-item failures.
    pub fn bulk_stock_update(&self, items: Vec<BulkStockItem>) -> BulkReport {
        let total = items.len();
        let mut outcomes = Vec::with_capacity(total);
        for item in items {
            let product_id = item.product_id;
            let idempotency_key = item.idempotency_key.clone();
            let result = self.apply_bulk_item(item);
            if let Err(err) = &result {
                tracing::warn!(
                    product_id = %product_id,
                    error = %err,
                    "bulk item failed, continuing with the rest of the batch"
                );
            }
            outcomes.push(BulkOutcome {
                product_id,
                idempotency_key,
                result,
            });
        }

        let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
        let failed = total - succeeded;
        tracing::info!(total, succeeded, failed, "bulk stock update finished");
        BulkReport {
            outcomes,
            succeeded,
            failed,
        }
    }

    fn apply_bulk_item(&self, item: BulkStockItem) -> InventoryResult<Vec<StockMovement>> {
        let BulkStockItem {
            product_id,
            action,
            idempotency_key,
            metadata,
        } = item;

        match action {
            BulkAction::Receive { quantity } => self
                .add_stock_keyed(product_id, quantity, metadata, idempotency_key)
                .map(|m| vec![m]),
            BulkAction::ReceiveLot {
                quantity,
                unit_cost,
                lot_number,
                expiry_date,
            } => self
                .receive_lot_keyed(
                    product_id,
                    quantity,
                    unit_cost,
                    &lot_number,
                    expiry_date,
                    metadata,
                    idempotency_key,
                )
                .map(|(movements, _)| movements),
            BulkAction::Issue { quantity } => self
                .remove_stock_keyed(product_id, quantity, metadata, idempotency_key)
                .map(|m| vec![m]),
            BulkAction::IssueFefo { quantity } => {
                self.remove_stock_fefo_keyed(product_id, quantity, metadata, idempotency_key)
            }
            BulkAction::SetQuantity { quantity } => self
                .adjust_stock_keyed(product_id, quantity, metadata, idempotency_key)
                .map(|m| vec![m]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bulk_items_serialize_with_a_tagged_action() {
        let item = BulkStockItem::new(
            ProductId::new(9),
            BulkAction::Receive { quantity: 3 },
        )
        .with_idempotency_key("sync-42");

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["action"], "receive");
        assert_eq!(json["quantity"], 3);
        assert_eq!(json["idempotency_key"], "sync-42");

        let back: BulkStockItem = serde_json::from_value(json).unwrap();
        assert_eq!(back, item);
    }
}
