use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use lotledger_core::{
    ExpectedVersion, InventoryResult, LotId, MovementId, ProductId,
};
use lotledger_inventory::{DraftMovement, InventoryLot, LotStatus, StockMovement};

/// Denormalized product row guarded by the optimistic concurrency token.
///
/// `stock` is the cached counter the ledger reconciles against; `version`
/// increments on every successful commit and is the token writers race on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductState {
    pub product_id: ProductId,
    pub stock: i64,
    /// Rolling weighted-average unit cost, kept at full precision.
    pub average_cost: Decimal,
    pub sale_price: Option<Decimal>,
    pub minimum_stock: i64,
    pub reorder_level: i64,
    pub version: u64,
}

impl ProductState {
    pub fn new(product_id: ProductId) -> Self {
        Self {
            product_id,
            stock: 0,
            average_cost: Decimal::ZERO,
            sale_price: None,
            minimum_stock: 0,
            reorder_level: 0,
            version: 0,
        }
    }

    pub fn with_thresholds(mut self, minimum_stock: i64, reorder_level: i64) -> Self {
        self.minimum_stock = minimum_stock;
        self.reorder_level = reorder_level;
        self
    }

    pub fn with_sale_price(mut self, sale_price: Decimal) -> Self {
        self.sale_price = Some(sale_price);
        self
    }

    pub fn is_below_minimum(&self) -> bool {
        self.stock < self.minimum_stock
    }

    pub fn needs_reorder(&self) -> bool {
        self.stock <= self.reorder_level
    }
}

/// A consistent read of one product: its row plus all of its lots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product: ProductState,
    pub lots: Vec<InventoryLot>,
}

impl ProductSnapshot {
    pub fn lot(&self, lot_id: LotId) -> Option<&InventoryLot> {
        self.lots.iter().find(|l| l.id == lot_id)
    }

    /// Find a non-closed (open or expired) lot by number — the set the
    /// duplicate-lot-number rule applies to.
    pub fn live_lot_by_number(&self, lot_number: &str) -> Option<&InventoryLot> {
        self.lots
            .iter()
            .find(|l| l.status != LotStatus::Closed && l.lot_number == lot_number)
    }

    /// Find a closed lot by number — the set a new receipt may reopen.
    pub fn closed_lot_by_number(&self, lot_number: &str) -> Option<&InventoryLot> {
        self.lots
            .iter()
            .find(|l| l.status == LotStatus::Closed && l.lot_number == lot_number)
    }
}

/// Pair the original entry with its compensating entry at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReversalLink {
    pub original: MovementId,
    pub reversal: MovementId,
}

/// Every write of one operation against one product, applied all-or-nothing.
///
/// A FEFO consumption spanning three lots carries three drafts and three lot
/// upserts; either all of them land together with the counter update, or none
/// do.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitSet {
    pub movements: Vec<DraftMovement>,
    pub lot_upserts: Vec<InventoryLot>,
    /// The product's stock counter after this operation.
    pub new_stock: i64,
    pub new_average_cost: Option<Decimal>,
    pub reversal_link: Option<ReversalLink>,
    /// Recorded with the commit so a replay of the same key is a no-op
    /// returning the movements committed here.
    pub idempotency_key: Option<String>,
}

impl CommitSet {
    pub fn new(new_stock: i64) -> Self {
        Self {
            movements: Vec::new(),
            lot_upserts: Vec::new(),
            new_stock,
            new_average_cost: None,
            reversal_link: None,
            idempotency_key: None,
        }
    }

    pub fn with_movement(mut self, draft: DraftMovement) -> Self {
        self.movements.push(draft);
        self
    }

    pub fn with_lot(mut self, lot: InventoryLot) -> Self {
        self.lot_upserts.push(lot);
        self
    }

    pub fn with_average_cost(mut self, average_cost: Decimal) -> Self {
        self.new_average_cost = Some(average_cost);
        self
    }

    pub fn with_reversal_link(mut self, link: ReversalLink) -> Self {
        self.reversal_link = Some(link);
        self
    }

    pub fn with_idempotency_key(mut self, key: Option<String>) -> Self {
        self.idempotency_key = key;
        self
    }
}

/// Atomic, per-product inventory store.
///
/// Implementations must:
/// - keep each product's ledger append-only with contiguous sequences and a
///   gapless `previous_stock → new_stock` chain
/// - enforce optimistic concurrency against the product's version token
/// - apply a whole `CommitSet` atomically (movements, lots, counter, reversal
///   flagging, idempotency record), or nothing of it
/// - serialize commits per product while leaving other products untouched
pub trait InventoryStore: Send + Sync {
    /// Register a product row. Fails when the product is already known.
    fn insert_product(&self, state: ProductState) -> InventoryResult<()>;

    /// Load the product row and all its lots.
    fn load(&self, product_id: ProductId) -> InventoryResult<ProductSnapshot>;

    /// Apply one operation's writes. Returns the committed movements with
    /// their assigned sequences.
    fn commit(
        &self,
        product_id: ProductId,
        expected: ExpectedVersion,
        set: CommitSet,
    ) -> InventoryResult<Vec<StockMovement>>;

    /// Full ledger for a product, ordered by sequence.
    fn movements(&self, product_id: ProductId) -> InventoryResult<Vec<StockMovement>>;

    /// Look a movement up across products.
    fn find_movement(&self, movement_id: MovementId) -> InventoryResult<StockMovement>;

    /// All registered products.
    fn product_ids(&self) -> Vec<ProductId>;

    /// Movements previously committed under this idempotency key, if any.
    fn recorded_result(
        &self,
        product_id: ProductId,
        key: &str,
    ) -> InventoryResult<Option<Vec<StockMovement>>>;
}

impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    fn insert_product(&self, state: ProductState) -> InventoryResult<()> {
        (**self).insert_product(state)
    }

    fn load(&self, product_id: ProductId) -> InventoryResult<ProductSnapshot> {
        (**self).load(product_id)
    }

    fn commit(
        &self,
        product_id: ProductId,
        expected: ExpectedVersion,
        set: CommitSet,
    ) -> InventoryResult<Vec<StockMovement>> {
        (**self).commit(product_id, expected, set)
    }

    fn movements(&self, product_id: ProductId) -> InventoryResult<Vec<StockMovement>> {
        (**self).movements(product_id)
    }

    fn find_movement(&self, movement_id: MovementId) -> InventoryResult<StockMovement> {
        (**self).find_movement(movement_id)
    }

    fn product_ids(&self) -> Vec<ProductId> {
        (**self).product_ids()
    }

    fn recorded_result(
        &self,
        product_id: ProductId,
        key: &str,
    ) -> InventoryResult<Option<Vec<StockMovement>>> {
        (**self).recorded_result(product_id, key)
    }
}
