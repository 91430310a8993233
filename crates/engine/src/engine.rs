use chrono::Utc;
use rust_decimal::Decimal;

use lotledger_core::{
    ExpectedVersion, InventoryError, InventoryResult, MovementId, ProductId,
};
use lotledger_infra::{CommitSet, InventoryStore, ProductSnapshot, ProductState, ReversalLink};
use lotledger_inventory::{
    plan_fefo_consumption, plan_reversal, weighted_average_cost, DraftMovement, InventoryLot,
    LotStatus, MovementMetadata, MovementType, StockMovement,
};

/// Commit attempts per operation before a version race is surfaced.
const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// The result of a lot-tracked receipt: the posted movement, the lot it landed
/// in (created or reopened), and the product's refreshed weighted-average cost.
#[derive(Debug, Clone, PartialEq)]
pub struct LotReceipt {
    pub movement: StockMovement,
    pub lot: InventoryLot,
    pub average_cost: Decimal,
}

/// Orchestrator for all inventory operations.
///
/// Every mutation follows the same shape: load the product snapshot, plan the
/// writes with pure domain code, then commit the whole plan under the
/// snapshot's version token. A lost version race replans against refreshed
/// state up to [`DEFAULT_MAX_ATTEMPTS`] times; any other failure goes straight
/// to the caller. Operations on different products never contend.
pub struct InventoryEngine<S> {
    store: S,
    max_attempts: u32,
}

impl<S> InventoryEngine<S>
where
    S: InventoryStore,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Register a product with the ledger before any stock can move.
    pub fn register_product(
        &self,
        product_id: ProductId,
        minimum_stock: i64,
        reorder_level: i64,
        sale_price: Option<Decimal>,
    ) -> InventoryResult<()> {
        if minimum_stock < 0 || reorder_level < 0 {
            return Err(InventoryError::validation(
                "stock thresholds cannot be negative",
            ));
        }

        let mut state = ProductState::new(product_id).with_thresholds(minimum_stock, reorder_level);
        if let Some(price) = sale_price {
            if price < Decimal::ZERO {
                return Err(InventoryError::validation("sale price cannot be negative"));
            }
            state = state.with_sale_price(price);
        }

        self.store.insert_product(state)?;
        tracing::info!(product_id = %product_id, "product registered");
        Ok(())
    }

    /// Post an untracked receipt (no lot, no cost).
    pub fn add_stock(
        &self,
        product_id: ProductId,
        quantity: i64,
        metadata: MovementMetadata,
    ) -> InventoryResult<StockMovement> {
        self.add_stock_keyed(product_id, quantity, metadata, None)
    }

    pub(crate) fn add_stock_keyed(
        &self,
        product_id: ProductId,
        quantity: i64,
        metadata: MovementMetadata,
        idempotency_key: Option<String>,
    ) -> InventoryResult<StockMovement> {
        require_positive(quantity, "receipt quantity")?;

        let movements = self.execute("add_stock", product_id, idempotency_key, |snapshot| {
            let draft = DraftMovement::delta(
                product_id,
                snapshot.product.stock,
                quantity,
                MovementType::In,
                Utc::now(),
            )?
            .with_metadata(metadata.clone());
            let new_stock = draft.new_stock;
            Ok(CommitSet::new(new_stock).with_movement(draft))
        })?;
        Self::single(movements)
    }

    /// Post a lot-tracked receipt, blending its cost into the running average.
    ///
    /// A lot number that matches one of the product's live (open or expired)
    /// lots is a `DuplicateLot`; matching a closed lot reopens it with the new
    /// quantity and cost.
    pub fn add_stock_with_lot(
        &self,
        product_id: ProductId,
        quantity: i64,
        unit_cost: Decimal,
        lot_number: &str,
        expiry_date: Option<chrono::NaiveDate>,
        metadata: MovementMetadata,
    ) -> InventoryResult<LotReceipt> {
        let (movements, planned) =
            self.receive_lot_keyed(product_id, quantity, unit_cost, lot_number, expiry_date, metadata, None)?;
        let movement = Self::single(movements)?;
        let (lot, average_cost) = planned.ok_or_else(|| {
            // Unreachable without an idempotency key: the planner ran for the
            // commit that produced this movement.
            InventoryError::validation("receipt plan missing after commit")
        })?;
        Ok(LotReceipt {
            movement,
            lot,
            average_cost,
        })
    }

    pub(crate) fn receive_lot_keyed(
        &self,
        product_id: ProductId,
        quantity: i64,
        unit_cost: Decimal,
        lot_number: &str,
        expiry_date: Option<chrono::NaiveDate>,
        metadata: MovementMetadata,
        idempotency_key: Option<String>,
    ) -> InventoryResult<(Vec<StockMovement>, Option<(InventoryLot, Decimal)>)> {
        require_positive(quantity, "receipt quantity")?;

        let mut planned: Option<(InventoryLot, Decimal)> = None;
        let movements = self.execute("add_stock_with_lot", product_id, idempotency_key, |snapshot| {
            if snapshot.live_lot_by_number(lot_number).is_some() {
                return Err(InventoryError::DuplicateLot {
                    product_id,
                    lot_number: lot_number.to_string(),
                });
            }

            let now = Utc::now();
            let lot = match snapshot.closed_lot_by_number(lot_number) {
                Some(closed) => {
                    let mut lot = closed.clone();
                    lot.reopen_with_receipt(quantity, unit_cost, expiry_date)?;
                    lot
                }
                None => InventoryLot::receive(
                    product_id,
                    lot_number,
                    quantity,
                    unit_cost,
                    expiry_date,
                    now,
                )?,
            };

            let average_cost = weighted_average_cost(
                snapshot.product.stock,
                snapshot.product.average_cost,
                quantity,
                unit_cost,
            )?;

            let draft = DraftMovement::delta(
                product_id,
                snapshot.product.stock,
                quantity,
                MovementType::In,
                now,
            )?
            .with_lot(lot.id)
            .with_unit_cost(unit_cost)
            .with_metadata(metadata.clone());

            planned = Some((lot.clone(), average_cost));
            let new_stock = draft.new_stock;
            Ok(CommitSet::new(new_stock)
                .with_movement(draft)
                .with_lot(lot)
                .with_average_cost(average_cost))
        })?;

        Ok((movements, planned))
    }

    /// Consume stock lot by lot in first-expired-first-out order.
    ///
    /// Posts one `Out` movement per consumed lot, all in a single commit; an
    /// oversized request fails with `InsufficientStock` and posts nothing.
    pub fn remove_stock_fefo(
        &self,
        product_id: ProductId,
        quantity: i64,
        metadata: MovementMetadata,
    ) -> InventoryResult<Vec<StockMovement>> {
        self.remove_stock_fefo_keyed(product_id, quantity, metadata, None)
    }

    pub(crate) fn remove_stock_fefo_keyed(
        &self,
        product_id: ProductId,
        quantity: i64,
        metadata: MovementMetadata,
        idempotency_key: Option<String>,
    ) -> InventoryResult<Vec<StockMovement>> {
        require_positive(quantity, "consumption quantity")?;

        self.execute("remove_stock_fefo", product_id, idempotency_key, |snapshot| {
            let now = Utc::now();
            let plan = plan_fefo_consumption(&snapshot.lots, quantity, now.date_naive())?;

            let mut cursor = snapshot.product.stock;
            let mut drafts = Vec::with_capacity(plan.allocations.len());
            let mut lots = Vec::with_capacity(plan.allocations.len());
            for allocation in &plan.allocations {
                let mut lot = snapshot
                    .lot(allocation.lot_id)
                    .cloned()
                    .ok_or_else(|| InventoryError::not_found(format!("lot {}", allocation.lot_id)))?;
                lot.consume(allocation.quantity, now)?;

                let draft = DraftMovement::delta(
                    product_id,
                    cursor,
                    -allocation.quantity,
                    MovementType::Out,
                    now,
                )?
                .with_lot(lot.id)
                .with_unit_cost(lot.unit_cost)
                .with_metadata(metadata.clone());
                cursor = draft.new_stock;
                drafts.push(draft);
                lots.push(lot);
            }

            let mut set = CommitSet::new(cursor);
            for draft in drafts {
                set = set.with_movement(draft);
            }
            for lot in lots {
                set = set.with_lot(lot);
            }
            Ok(set)
        })
    }

    /// Post an untracked issue (no lot accounting).
    pub fn remove_stock(
        &self,
        product_id: ProductId,
        quantity: i64,
        metadata: MovementMetadata,
    ) -> InventoryResult<StockMovement> {
        self.remove_stock_keyed(product_id, quantity, metadata, None)
    }

    pub(crate) fn remove_stock_keyed(
        &self,
        product_id: ProductId,
        quantity: i64,
        metadata: MovementMetadata,
        idempotency_key: Option<String>,
    ) -> InventoryResult<StockMovement> {
        require_positive(quantity, "issue quantity")?;

        let movements = self.execute("remove_stock", product_id, idempotency_key, |snapshot| {
            let draft = DraftMovement::delta(
                product_id,
                snapshot.product.stock,
                -quantity,
                MovementType::Out,
                Utc::now(),
            )?
            .with_metadata(metadata.clone());
            let new_stock = draft.new_stock;
            Ok(CommitSet::new(new_stock).with_movement(draft))
        })?;
        Self::single(movements)
    }

    /// Set the stock counter to an absolute quantity (stock-take correction).
    pub fn adjust_stock(
        &self,
        product_id: ProductId,
        new_quantity: i64,
        metadata: MovementMetadata,
    ) -> InventoryResult<StockMovement> {
        self.adjust_stock_keyed(product_id, new_quantity, metadata, None)
    }

    pub(crate) fn adjust_stock_keyed(
        &self,
        product_id: ProductId,
        new_quantity: i64,
        metadata: MovementMetadata,
        idempotency_key: Option<String>,
    ) -> InventoryResult<StockMovement> {
        let movements = self.execute("adjust_stock", product_id, idempotency_key, |snapshot| {
            let draft = DraftMovement::adjustment(
                product_id,
                snapshot.product.stock,
                new_quantity,
                Utc::now(),
            )?
            .with_metadata(metadata.clone());
            Ok(CommitSet::new(new_quantity).with_movement(draft))
        })?;
        Self::single(movements)
    }

    /// Undo a prior movement with a compensating entry.
    ///
    /// The original is flagged reversed and its lot (if any) restored, all in
    /// one commit. The running average cost is left untouched; the ledger keeps
    /// the full cost trail.
    pub fn cancel_movement(
        &self,
        movement_id: MovementId,
        reason: &str,
    ) -> InventoryResult<StockMovement> {
        let product_id = self.store.find_movement(movement_id)?.product_id;

        let store = &self.store;
        let movements = self.execute("cancel_movement", product_id, None, |snapshot| {
            // Re-fetch per attempt: a concurrent reversal must fail the
            // replan, not just the commit.
            let original = store.find_movement(movement_id)?;
            let plan = plan_reversal(
                &original,
                snapshot.product.stock,
                &snapshot.lots,
                reason,
                Utc::now(),
            )?;

            let link = ReversalLink {
                original: plan.original_id,
                reversal: plan.draft.id,
            };
            let new_stock = plan.draft.new_stock;
            let mut set = CommitSet::new(new_stock)
                .with_movement(plan.draft)
                .with_reversal_link(link);
            if let Some(restoration) = plan.restoration {
                set = set.with_lot(restoration.lot);
            }
            Ok(set)
        })?;
        Self::single(movements)
    }

    /// Write off every expired lot still holding quantity.
    ///
    /// Posts one `Loss` movement per lot and drains it; lots whose expiry date
    /// has passed but still sit at `Open` are flagged `Expired` on the way.
    /// Returns an empty vec when there is nothing to write off.
    pub fn write_off_expired(&self, product_id: ProductId) -> InventoryResult<Vec<StockMovement>> {
        let probe = self.store.load(product_id)?;
        let today = Utc::now().date_naive();
        let has_expired = probe.lots.iter().any(|lot| {
            lot.remaining_qty > 0
                && (lot.status == LotStatus::Expired || lot.is_expired_as_of(today))
        });
        if !has_expired {
            return Ok(Vec::new());
        }

        self.execute("write_off_expired", product_id, None, |snapshot| {
            let now = Utc::now();
            let today = now.date_naive();

            let mut cursor = snapshot.product.stock;
            let mut drafts = Vec::new();
            let mut lots = Vec::new();
            for lot in &snapshot.lots {
                let mut lot = lot.clone();
                lot.mark_expired(today);
                if lot.status != LotStatus::Expired || lot.remaining_qty == 0 {
                    continue;
                }

                let quantity = lot.write_off();
                let draft = DraftMovement::delta(product_id, cursor, -quantity, MovementType::Loss, now)?
                    .with_lot(lot.id)
                    .with_unit_cost(lot.unit_cost)
                    .with_metadata(MovementMetadata::with_notes(format!(
                        "expired lot {} written off",
                        lot.lot_number
                    )));
                cursor = draft.new_stock;
                drafts.push(draft);
                lots.push(lot);
            }

            let mut set = CommitSet::new(cursor);
            for draft in drafts {
                set = set.with_movement(draft);
            }
            for lot in lots {
                set = set.with_lot(lot);
            }
            Ok(set)
        })
    }

    pub fn current_stock(&self, product_id: ProductId) -> InventoryResult<i64> {
        Ok(self.store.load(product_id)?.product.stock)
    }

    /// Read-only view of a product's state and lots.
    pub fn product_snapshot(&self, product_id: ProductId) -> InventoryResult<ProductSnapshot> {
        self.store.load(product_id)
    }

    /// Full ledger for a product, ordered by sequence.
    pub fn movements(&self, product_id: ProductId) -> InventoryResult<Vec<StockMovement>> {
        self.store.movements(product_id)
    }

    /// load → plan → commit with bounded replanning on version races.
    fn execute<F>(
        &self,
        operation: &'static str,
        product_id: ProductId,
        idempotency_key: Option<String>,
        mut plan: F,
    ) -> InventoryResult<Vec<StockMovement>>
    where
        F: FnMut(&ProductSnapshot) -> InventoryResult<CommitSet>,
    {
        // Keyed replays short-circuit before planning: the planner would see
        // post-commit state and could reject an operation that already landed.
        if let Some(key) = idempotency_key.as_deref() {
            if let Some(prior) = self.store.recorded_result(product_id, key)? {
                tracing::info!(
                    operation,
                    product_id = %product_id,
                    idempotency_key = key,
                    "replayed idempotency key, returning recorded movements"
                );
                return Ok(prior);
            }
        }

        let mut attempt = 1u32;
        loop {
            let snapshot = self.store.load(product_id)?;
            let set = plan(&snapshot)?.with_idempotency_key(idempotency_key.clone());
            match self.store.commit(
                product_id,
                ExpectedVersion::Exact(snapshot.product.version),
                set,
            ) {
                Ok(movements) => {
                    tracing::debug!(
                        operation,
                        product_id = %product_id,
                        movements = movements.len(),
                        attempt,
                        "operation committed"
                    );
                    return Ok(movements);
                }
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    tracing::warn!(
                        operation,
                        product_id = %product_id,
                        attempt,
                        "lost the version race, replanning against refreshed state"
                    );
                    attempt += 1;
                }
                Err(err) => {
                    tracing::debug!(
                        operation,
                        product_id = %product_id,
                        error = %err,
                        "operation failed"
                    );
                    return Err(err);
                }
            }
        }
    }

    fn single(movements: Vec<StockMovement>) -> InventoryResult<StockMovement> {
        movements
            .into_iter()
            .next()
            .ok_or_else(|| InventoryError::validation("commit returned no movement"))
    }
}

fn require_positive(quantity: i64, what: &str) -> InventoryResult<()> {
    if quantity <= 0 {
        return Err(InventoryError::validation(format!(
            "{what} must be positive"
        )));
    }
    Ok(())
}
