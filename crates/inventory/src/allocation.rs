//! FEFO consumption planning.
//!
//! Selection is a pure planning step over a product's lots; applying the plan
//! (decrementing lots, posting movements) is the orchestrator's job and happens
//! atomically with ledger posting.

use core::cmp::Ordering;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use lotledger_core::{InventoryError, InventoryResult, LotId, ValueObject};

use crate::lot::InventoryLot;

/// One slice of a consumption plan: take `quantity` from `lot_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotAllocation {
    pub lot_id: LotId,
    pub lot_number: String,
    pub quantity: i64,
}

impl ValueObject for LotAllocation {}

/// An all-or-nothing plan covering exactly the requested quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumptionPlan {
    pub requested: i64,
    pub allocations: Vec<LotAllocation>,
}

impl ConsumptionPlan {
    pub fn total(&self) -> i64 {
        self.allocations.iter().map(|a| a.quantity).sum()
    }
}

impl ValueObject for ConsumptionPlan {}

/// FEFO with FIFO tie-break: earliest expiry first, lots without an expiry
/// date after all dated lots, ties broken by receipt time, then lot id for a
/// total order.
pub fn fefo_ordering(a: &InventoryLot, b: &InventoryLot) -> Ordering {
    let by_expiry = match (a.expiry_date, b.expiry_date) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    by_expiry
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Plan a FEFO consumption of `quantity` over the product's lots.
///
/// Candidates are open, unexpired lots with quantity remaining. The walk is
/// greedy: take `min(remaining, still_needed)` from each lot in FEFO order.
/// If the candidates cannot cover the request the whole selection fails with
/// `InsufficientStock` — the caller never sees a partial plan.
pub fn plan_fefo_consumption(
    lots: &[InventoryLot],
    quantity: i64,
    as_of: NaiveDate,
) -> InventoryResult<ConsumptionPlan> {
    if quantity <= 0 {
        return Err(InventoryError::validation(
            "consumption quantity must be positive",
        ));
    }

    let mut candidates: Vec<&InventoryLot> =
        lots.iter().filter(|l| l.is_consumable(as_of)).collect();
    candidates.sort_by(|a, b| fefo_ordering(a, b));

    let available: i64 = candidates.iter().map(|l| l.remaining_qty).sum();
    if available < quantity {
        return Err(InventoryError::InsufficientStock {
            requested: quantity,
            available,
        });
    }

    let mut still_needed = quantity;
    let mut allocations = Vec::new();
    for lot in candidates {
        if still_needed == 0 {
            break;
        }
        let take = lot.remaining_qty.min(still_needed);
        allocations.push(LotAllocation {
            lot_id: lot.id,
            lot_number: lot.lot_number.clone(),
            quantity: take,
        });
        still_needed -= take;
    }

    Ok(ConsumptionPlan {
        requested: quantity,
        allocations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    use lotledger_core::ProductId;
    use crate::lot::LotStatus;

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    fn lot_with(
        number: &str,
        quantity: i64,
        expiry: Option<NaiveDate>,
        created_at: DateTime<Utc>,
    ) -> InventoryLot {
        InventoryLot::receive(
            ProductId::new(1),
            number,
            quantity,
            dec!(1.00),
            expiry,
            created_at,
        )
        .unwrap()
    }

    #[test]
    fn earliest_expiry_is_taken_first() {
        let now = Utc::now();
        let lots = vec![
            lot_with("L2", 5, Some(today() + Duration::days(30)), now),
            lot_with("L1", 5, Some(today() + Duration::days(10)), now),
            lot_with("L3", 5, None, now),
        ];

        let plan = plan_fefo_consumption(&lots, 12, today()).unwrap();
        let numbers: Vec<&str> = plan
            .allocations
            .iter()
            .map(|a| a.lot_number.as_str())
            .collect();
        assert_eq!(numbers, vec!["L1", "L2", "L3"]);
        assert_eq!(
            plan.allocations.iter().map(|a| a.quantity).collect::<Vec<_>>(),
            vec![5, 5, 2]
        );
        assert_eq!(plan.total(), 12);
    }

    #[test]
    fn undated_lots_sort_after_all_dated_lots() {
        let now = Utc::now();
        let lots = vec![
            lot_with("NO-EXP", 10, None, now - Duration::hours(5)),
            lot_with("DATED", 10, Some(today() + Duration::days(365)), now),
        ];

        let plan = plan_fefo_consumption(&lots, 10, today()).unwrap();
        assert_eq!(plan.allocations.len(), 1);
        assert_eq!(plan.allocations[0].lot_number, "DATED");
    }

    #[test]
    fn equal_expiries_fall_back_to_receipt_order() {
        let now = Utc::now();
        let expiry = Some(today() + Duration::days(20));
        let lots = vec![
            lot_with("NEWER", 5, expiry, now),
            lot_with("OLDER", 5, expiry, now - Duration::hours(3)),
        ];

        let plan = plan_fefo_consumption(&lots, 6, today()).unwrap();
        assert_eq!(plan.allocations[0].lot_number, "OLDER");
        assert_eq!(plan.allocations[0].quantity, 5);
        assert_eq!(plan.allocations[1].lot_number, "NEWER");
        assert_eq!(plan.allocations[1].quantity, 1);
    }

    #[test]
    fn absent_expiries_also_tie_break_by_receipt_order() {
        let now = Utc::now();
        let lots = vec![
            lot_with("B", 5, None, now),
            lot_with("A", 5, None, now - Duration::hours(1)),
        ];

        let plan = plan_fefo_consumption(&lots, 7, today()).unwrap();
        assert_eq!(plan.allocations[0].lot_number, "A");
        assert_eq!(plan.allocations[1].lot_number, "B");
    }

    #[test]
    fn expired_and_closed_lots_are_never_offered() {
        let now = Utc::now();
        let mut expired = lot_with("EXPIRED", 10, Some(today() - Duration::days(1)), now);
        expired.mark_expired(today());
        let mut closed = lot_with("CLOSED", 10, None, now);
        closed.consume(10, now).unwrap();
        let open = lot_with("OPEN", 4, None, now);

        let lots = vec![expired, closed, open];

        let plan = plan_fefo_consumption(&lots, 4, today()).unwrap();
        assert_eq!(plan.allocations.len(), 1);
        assert_eq!(plan.allocations[0].lot_number, "OPEN");

        // Even an expired lot that was never re-marked is filtered by date.
        let stale = vec![lot_with("STALE", 10, Some(today() - Duration::days(2)), now)];
        let err = plan_fefo_consumption(&stale, 1, today()).unwrap_err();
        assert_eq!(
            err,
            InventoryError::InsufficientStock {
                requested: 1,
                available: 0
            }
        );
    }

    #[test]
    fn oversized_request_fails_whole_with_insufficient_stock() {
        let now = Utc::now();
        let lots = vec![
            lot_with("L1", 5, Some(today() + Duration::days(10)), now),
            lot_with("L2", 5, Some(today() + Duration::days(30)), now),
        ];

        let err = plan_fefo_consumption(&lots, 11, today()).unwrap_err();
        assert_eq!(
            err,
            InventoryError::InsufficientStock {
                requested: 11,
                available: 10
            }
        );
    }

    #[test]
    fn non_positive_quantity_is_rejected() {
        assert!(plan_fefo_consumption(&[], 0, today()).is_err());
        assert!(plan_fefo_consumption(&[], -4, today()).is_err());
    }

    proptest! {
        /// Property: a successful plan covers exactly the requested quantity,
        /// never over-allocates a lot, and never skips an earlier-expiring lot
        /// while taking from a later one.
        #[test]
        fn plans_are_exact_ordered_and_within_bounds(
            quantities in prop::collection::vec(1i64..50, 1..12),
            expiry_offsets in prop::collection::vec(prop::option::of(0i64..90), 1..12),
            requested in 1i64..300,
        ) {
            let now = Utc::now();
            let lots: Vec<InventoryLot> = quantities
                .iter()
                .zip(expiry_offsets.iter().cycle())
                .enumerate()
                .map(|(i, (&qty, offset))| {
                    lot_with(
                        &format!("L{i}"),
                        qty,
                        offset.map(|d| today() + Duration::days(d)),
                        now + Duration::seconds(i as i64),
                    )
                })
                .collect();

            let available: i64 = lots.iter().map(|l| l.remaining_qty).sum();

            match plan_fefo_consumption(&lots, requested, today()) {
                Ok(plan) => {
                    prop_assert!(requested <= available);
                    prop_assert_eq!(plan.total(), requested);

                    let mut sorted = lots.clone();
                    sorted.retain(|l| l.status == LotStatus::Open);
                    sorted.sort_by(fefo_ordering);

                    // The plan must be a prefix of the FEFO ordering.
                    for (allocation, lot) in plan.allocations.iter().zip(sorted.iter()) {
                        prop_assert_eq!(allocation.lot_id, lot.id);
                        prop_assert!(allocation.quantity <= lot.remaining_qty);
                        prop_assert!(allocation.quantity > 0);
                    }

                    // Every allocation except the last drains its lot fully.
                    for (allocation, lot) in plan
                        .allocations
                        .iter()
                        .take(plan.allocations.len().saturating_sub(1))
                        .zip(sorted.iter())
                    {
                        prop_assert_eq!(allocation.quantity, lot.remaining_qty);
                    }
                }
                Err(InventoryError::InsufficientStock { requested: r, available: a }) => {
                    prop_assert_eq!(r, requested);
                    prop_assert_eq!(a, available);
                    prop_assert!(available < requested);
                }
                Err(other) => prop_assert!(false, "unexpected error: {other:?}"),
            }
        }
    }
}
