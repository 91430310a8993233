//! Valuation and reporting aggregates.
//!
//! Reports are plain reads: one line per registered product, valued at cost
//! (weighted average) and at sale price, with low-stock flags from the
//! product's thresholds. All money values are rounded to minor units here,
//! at the reporting boundary.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lotledger_core::{InventoryResult, ProductId};
use lotledger_infra::{InventoryStore, ProductSnapshot};
use lotledger_inventory::{round_to_minor_units, LotStatus};

use crate::engine::InventoryEngine;

/// One product's line in the inventory report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportLine {
    pub product_id: ProductId,
    pub stock: i64,
    /// Weighted-average unit cost, rounded to minor units.
    pub average_cost: Decimal,
    pub sale_price: Option<Decimal>,
    /// `stock * average_cost`, rounded.
    pub cost_value: Decimal,
    /// `stock * sale_price`, rounded; falls back to cost when the product has
    /// no sale price.
    pub sale_value: Decimal,
    pub below_minimum: bool,
    pub needs_reorder: bool,
    pub open_lots: usize,
    pub expired_lots: usize,
}

impl ReportLine {
    pub fn from_snapshot(snapshot: &ProductSnapshot, as_of: NaiveDate) -> Self {
        let product = &snapshot.product;
        let stock = Decimal::from(product.stock);
        let sale_unit = product.sale_price.unwrap_or(product.average_cost);

        let open_lots = snapshot
            .lots
            .iter()
            .filter(|l| l.is_consumable(as_of))
            .count();
        let expired_lots = snapshot
            .lots
            .iter()
            .filter(|l| {
                l.remaining_qty > 0
                    && (l.status == LotStatus::Expired || l.is_expired_as_of(as_of))
            })
            .count();

        Self {
            product_id: product.product_id,
            stock: product.stock,
            average_cost: round_to_minor_units(product.average_cost),
            sale_price: product.sale_price,
            cost_value: round_to_minor_units(stock * product.average_cost),
            sale_value: round_to_minor_units(stock * sale_unit),
            below_minimum: product.is_below_minimum(),
            needs_reorder: product.needs_reorder(),
            open_lots,
            expired_lots,
        }
    }
}

/// Point-in-time report over every registered product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryReport {
    pub generated_at: DateTime<Utc>,
    pub lines: Vec<ReportLine>,
    pub total_cost_value: Decimal,
    pub total_sale_value: Decimal,
}

impl InventoryReport {
    pub fn new(lines: Vec<ReportLine>, generated_at: DateTime<Utc>) -> Self {
        let total_cost_value = lines.iter().map(|l| l.cost_value).sum();
        let total_sale_value = lines.iter().map(|l| l.sale_value).sum();
        Self {
            generated_at,
            lines,
            total_cost_value,
            total_sale_value,
        }
    }
}

impl<S> InventoryEngine<S>
where
    S: InventoryStore,
{
    /// One line per product, ordered by product id.
    pub fn inventory_report(&self) -> InventoryResult<InventoryReport> {
        let as_of = Utc::now().date_naive();
        let mut lines = Vec::new();
        for product_id in self.store().product_ids() {
            let snapshot = self.store().load(product_id)?;
            lines.push(ReportLine::from_snapshot(&snapshot, as_of));
        }
        Ok(InventoryReport::new(lines, Utc::now()))
    }

    /// Total inventory value, at cost or at sale price.
    pub fn inventory_value(&self, use_cost_price: bool) -> InventoryResult<Decimal> {
        let report = self.inventory_report()?;
        Ok(if use_cost_price {
            report.total_cost_value
        } else {
            report.total_sale_value
        })
    }
}
