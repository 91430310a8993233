use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use lotledger_core::{Entity, InventoryError, InventoryResult, LotId, ProductId};

/// Lot lifecycle status.
///
/// `Open → Closed` when consumption drains the lot; `Closed → Open` when a
/// reversal restores quantity; `Expired` once the expiry date has passed with
/// quantity still on hand. Expired lots stay out of consumption planning but
/// remain restorable by reversals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LotStatus {
    Open,
    Closed,
    Expired,
}

/// One receipt batch of a product.
///
/// Lots are historical records: they are mutated only by consumption,
/// restoration, and write-off, and never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryLot {
    pub id: LotId,
    pub product_id: ProductId,
    /// Unique among the product's non-closed lots.
    pub lot_number: String,
    pub expiry_date: Option<NaiveDate>,
    /// Total quantity received into this lot. Grows only when a closed lot is
    /// reopened by a receipt under the same lot number.
    pub received_qty: i64,
    pub remaining_qty: i64,
    pub status: LotStatus,
    /// Cost per unit of the most recent receipt into this lot.
    pub unit_cost: Decimal,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl InventoryLot {
    /// Create a lot from a receipt.
    pub fn receive(
        product_id: ProductId,
        lot_number: impl Into<String>,
        quantity: i64,
        unit_cost: Decimal,
        expiry_date: Option<NaiveDate>,
        now: DateTime<Utc>,
    ) -> InventoryResult<Self> {
        let lot_number = lot_number.into();
        if lot_number.trim().is_empty() {
            return Err(InventoryError::validation("lot number cannot be empty"));
        }
        if quantity <= 0 {
            return Err(InventoryError::validation(
                "lot receipt quantity must be positive",
            ));
        }
        if unit_cost < Decimal::ZERO {
            return Err(InventoryError::validation("unit cost cannot be negative"));
        }

        Ok(Self {
            id: LotId::new(),
            product_id,
            lot_number,
            expiry_date,
            received_qty: quantity,
            remaining_qty: quantity,
            status: LotStatus::Open,
            unit_cost,
            created_at: now,
            closed_at: None,
        })
    }

    /// Expiry is date-based: a lot is still good on its expiry date and
    /// expired strictly after it.
    pub fn is_expired_as_of(&self, as_of: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|d| d < as_of)
    }

    /// Whether FEFO planning may take from this lot.
    pub fn is_consumable(&self, as_of: NaiveDate) -> bool {
        self.status == LotStatus::Open && self.remaining_qty > 0 && !self.is_expired_as_of(as_of)
    }

    /// Take quantity out of the lot; closes it when it reaches zero.
    pub fn consume(&mut self, quantity: i64, now: DateTime<Utc>) -> InventoryResult<()> {
        if quantity <= 0 {
            return Err(InventoryError::validation(
                "consumption quantity must be positive",
            ));
        }
        if quantity > self.remaining_qty {
            return Err(InventoryError::lot_conflict(
                self.id,
                format!(
                    "cannot take {} from lot with {} remaining",
                    quantity, self.remaining_qty
                ),
            ));
        }

        self.remaining_qty -= quantity;
        if self.remaining_qty == 0 {
            self.status = LotStatus::Closed;
            self.closed_at = Some(now);
        }
        Ok(())
    }

    /// Put reversed quantity back into the lot.
    ///
    /// Reopens a closed lot; an expired lot stays expired (it is restorable but
    /// never consumable again). Restoring past `received_qty` is a conflict —
    /// it means the original was already reversed or the lot record diverged.
    pub fn restore(&mut self, quantity: i64) -> InventoryResult<()> {
        if quantity <= 0 {
            return Err(InventoryError::validation(
                "restore quantity must be positive",
            ));
        }
        if self.remaining_qty + quantity > self.received_qty {
            return Err(InventoryError::lot_conflict(
                self.id,
                format!(
                    "restoring {} would exceed received quantity ({} remaining of {})",
                    quantity, self.remaining_qty, self.received_qty
                ),
            ));
        }

        self.remaining_qty += quantity;
        if self.status == LotStatus::Closed {
            self.status = LotStatus::Open;
            self.closed_at = None;
        }
        Ok(())
    }

    /// Fold a new receipt into a closed lot carrying the same lot number.
    ///
    /// The lot reopens with the extra quantity; the unit cost reflects the
    /// latest receipt, and a supplied expiry date replaces the old one.
    pub fn reopen_with_receipt(
        &mut self,
        quantity: i64,
        unit_cost: Decimal,
        expiry_date: Option<NaiveDate>,
    ) -> InventoryResult<()> {
        if self.status != LotStatus::Closed {
            return Err(InventoryError::lot_conflict(
                self.id,
                "only closed lots can be reopened by a receipt",
            ));
        }
        if quantity <= 0 {
            return Err(InventoryError::validation(
                "lot receipt quantity must be positive",
            ));
        }
        if unit_cost < Decimal::ZERO {
            return Err(InventoryError::validation("unit cost cannot be negative"));
        }

        self.received_qty += quantity;
        self.remaining_qty += quantity;
        self.status = LotStatus::Open;
        self.closed_at = None;
        self.unit_cost = unit_cost;
        if expiry_date.is_some() {
            self.expiry_date = expiry_date;
        }
        Ok(())
    }

    /// Transition to `Expired` if the expiry date has passed with quantity on
    /// hand. Returns whether the status changed.
    pub fn mark_expired(&mut self, as_of: NaiveDate) -> bool {
        if self.status != LotStatus::Expired && self.remaining_qty > 0 && self.is_expired_as_of(as_of)
        {
            self.status = LotStatus::Expired;
            true
        } else {
            false
        }
    }

    /// Drain an expired lot for an explicit write-off posting.
    ///
    /// Returns the quantity written off; the lot ends at zero remaining with
    /// `Expired` status.
    pub fn write_off(&mut self) -> i64 {
        let quantity = self.remaining_qty;
        self.remaining_qty = 0;
        self.status = LotStatus::Expired;
        quantity
    }

    /// The bound invariant every mutation must preserve.
    pub fn invariant_holds(&self) -> bool {
        0 <= self.remaining_qty && self.remaining_qty <= self.received_qty
    }
}

impl Entity for InventoryLot {
    type Id = LotId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn test_product_id() -> ProductId {
        ProductId::new(1)
    }

    fn test_lot(quantity: i64) -> InventoryLot {
        InventoryLot::receive(
            test_product_id(),
            "LOT-A",
            quantity,
            dec!(2.50),
            None,
            Utc::now(),
        )
        .unwrap()
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    #[test]
    fn receipt_opens_a_full_lot() {
        let lot = test_lot(10);
        assert_eq!(lot.status, LotStatus::Open);
        assert_eq!(lot.received_qty, 10);
        assert_eq!(lot.remaining_qty, 10);
        assert!(lot.is_consumable(today()));
    }

    #[test]
    fn receipt_rejects_blank_lot_number() {
        let err = InventoryLot::receive(test_product_id(), "  ", 5, dec!(1), None, Utc::now())
            .unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));
    }

    #[test]
    fn consumption_to_zero_closes_the_lot() {
        let mut lot = test_lot(5);
        lot.consume(5, Utc::now()).unwrap();
        assert_eq!(lot.status, LotStatus::Closed);
        assert_eq!(lot.remaining_qty, 0);
        assert!(lot.closed_at.is_some());
        assert!(!lot.is_consumable(today()));
    }

    #[test]
    fn overconsumption_is_a_lot_conflict() {
        let mut lot = test_lot(5);
        let err = lot.consume(6, Utc::now()).unwrap_err();
        assert!(matches!(err, InventoryError::LotConflict { .. }));
        assert_eq!(lot.remaining_qty, 5);
    }

    #[test]
    fn restore_reopens_a_closed_lot() {
        let mut lot = test_lot(5);
        lot.consume(5, Utc::now()).unwrap();
        lot.restore(3).unwrap();
        assert_eq!(lot.status, LotStatus::Open);
        assert_eq!(lot.remaining_qty, 3);
        assert!(lot.closed_at.is_none());
    }

    #[test]
    fn restore_beyond_received_is_a_conflict() {
        let mut lot = test_lot(5);
        lot.consume(2, Utc::now()).unwrap();
        let err = lot.restore(3 + 1).unwrap_err();
        assert!(matches!(err, InventoryError::LotConflict { .. }));
        assert_eq!(lot.remaining_qty, 3);
    }

    #[test]
    fn expired_lot_is_not_consumable_on_the_day_after() {
        let mut lot = test_lot(5);
        lot.expiry_date = Some(today() - Duration::days(1));
        assert!(lot.is_expired_as_of(today()));
        assert!(!lot.is_consumable(today()));
    }

    #[test]
    fn lot_is_still_good_on_its_expiry_date() {
        let mut lot = test_lot(5);
        lot.expiry_date = Some(today());
        assert!(!lot.is_expired_as_of(today()));
        assert!(lot.is_consumable(today()));
    }

    #[test]
    fn restore_into_expired_lot_keeps_it_expired() {
        let mut lot = test_lot(5);
        lot.expiry_date = Some(today() - Duration::days(1));
        lot.consume(5, Utc::now()).unwrap();
        lot.status = LotStatus::Expired;
        lot.restore(5).unwrap();
        assert_eq!(lot.status, LotStatus::Expired);
        assert_eq!(lot.remaining_qty, 5);
        assert!(!lot.is_consumable(today()));
    }

    #[test]
    fn reopen_with_receipt_grows_the_lot() {
        let mut lot = test_lot(5);
        lot.consume(5, Utc::now()).unwrap();
        lot.reopen_with_receipt(4, dec!(3.00), Some(today() + Duration::days(30)))
            .unwrap();
        assert_eq!(lot.status, LotStatus::Open);
        assert_eq!(lot.received_qty, 9);
        assert_eq!(lot.remaining_qty, 4);
        assert_eq!(lot.unit_cost, dec!(3.00));
    }

    #[test]
    fn reopen_is_only_for_closed_lots() {
        let mut lot = test_lot(5);
        let err = lot.reopen_with_receipt(4, dec!(3.00), None).unwrap_err();
        assert!(matches!(err, InventoryError::LotConflict { .. }));
    }

    #[test]
    fn mark_expired_needs_remaining_quantity() {
        let mut drained = test_lot(5);
        drained.expiry_date = Some(today() - Duration::days(1));
        drained.consume(5, Utc::now()).unwrap();
        assert!(!drained.mark_expired(today()));
        assert_eq!(drained.status, LotStatus::Closed);

        let mut holding = test_lot(5);
        holding.expiry_date = Some(today() - Duration::days(1));
        assert!(holding.mark_expired(today()));
        assert_eq!(holding.status, LotStatus::Expired);
    }

    #[test]
    fn write_off_drains_the_lot() {
        let mut lot = test_lot(5);
        lot.expiry_date = Some(today() - Duration::days(1));
        lot.mark_expired(today());
        assert_eq!(lot.write_off(), 5);
        assert_eq!(lot.remaining_qty, 0);
        assert_eq!(lot.status, LotStatus::Expired);
    }

    proptest! {
        /// Property: any interleaving of valid consumptions and restores keeps
        /// `0 ≤ remaining ≤ received`.
        #[test]
        fn bounds_hold_under_consume_and_restore(
            received in 1i64..10_000,
            steps in prop::collection::vec((any::<bool>(), 1i64..500), 0..64),
        ) {
            let mut lot = InventoryLot::receive(
                test_product_id(),
                "LOT-P",
                received,
                dec!(1.00),
                None,
                Utc::now(),
            ).unwrap();

            for (is_consume, qty) in steps {
                if is_consume {
                    let _ = lot.consume(qty, Utc::now());
                } else {
                    let _ = lot.restore(qty);
                }
                prop_assert!(lot.invariant_holds());
                prop_assert_eq!(lot.status == LotStatus::Closed, lot.remaining_qty == 0);
            }
        }
    }
}
