use std::collections::HashMap;
use std::sync::RwLock;

use lotledger_core::{
    ExpectedVersion, InventoryError, InventoryResult, MovementId, ProductId,
};
use lotledger_inventory::StockMovement;

use super::r#trait::{CommitSet, InventoryStore, ProductSnapshot, ProductState};

#[derive(Debug)]
struct ProductRecord {
    state: ProductState,
    lots: Vec<lotledger_inventory::InventoryLot>,
    movements: Vec<StockMovement>,
    idempotency: HashMap<String, Vec<MovementId>>,
}

/// In-memory per-product inventory store.
///
/// Commits take the write lock for their whole critical section, which gives
/// the serialize-per-product guarantee trivially; the optimistic version check
/// still runs so engine-level load/commit races behave exactly as they would
/// against a multi-process backend. Intended for tests/dev; not optimized.
#[derive(Debug, Default)]
pub struct InMemoryInventoryStore {
    products: RwLock<HashMap<ProductId, ProductRecord>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_sequence(record: &ProductRecord) -> u64 {
        record.movements.last().map(|m| m.sequence).unwrap_or(0) + 1
    }

    /// Check the draft chain extends the current counter gaplessly before
    /// anything is applied.
    fn validate_chain(record: &ProductRecord, set: &CommitSet) -> InventoryResult<()> {
        let mut cursor = record.state.stock;
        for draft in &set.movements {
            if draft.product_id != record.state.product_id {
                return Err(InventoryError::validation(format!(
                    "draft movement targets product {}, commit targets {}",
                    draft.product_id, record.state.product_id
                )));
            }
            if draft.previous_stock != cursor {
                return Err(InventoryError::validation(format!(
                    "stock chain mismatch (expected previous_stock {}, found {})",
                    cursor, draft.previous_stock
                )));
            }
            if draft.new_stock != draft.previous_stock + draft.quantity {
                return Err(InventoryError::validation(
                    "draft movement breaks previous_stock + quantity = new_stock",
                ));
            }
            cursor = draft.new_stock;
        }
        if cursor != set.new_stock {
            return Err(InventoryError::validation(format!(
                "commit counter {} does not match chain end {}",
                set.new_stock, cursor
            )));
        }
        Ok(())
    }

    fn validate_lots(record: &ProductRecord, set: &CommitSet) -> InventoryResult<()> {
        for lot in &set.lot_upserts {
            if lot.product_id != record.state.product_id {
                return Err(InventoryError::validation(format!(
                    "lot upsert targets product {}, commit targets {}",
                    lot.product_id, record.state.product_id
                )));
            }
            if !lot.invariant_holds() {
                return Err(InventoryError::lot_conflict(
                    lot.id,
                    format!(
                        "lot bounds violated ({} remaining of {})",
                        lot.remaining_qty, lot.received_qty
                    ),
                ));
            }
        }
        Ok(())
    }
}

impl InventoryStore for InMemoryInventoryStore {
    fn insert_product(&self, state: ProductState) -> InventoryResult<()> {
        let mut products = self
            .products
            .write()
            .map_err(|_| InventoryError::concurrency("lock poisoned"))?;

        if products.contains_key(&state.product_id) {
            return Err(InventoryError::validation(format!(
                "product {} is already registered",
                state.product_id
            )));
        }

        products.insert(
            state.product_id,
            ProductRecord {
                state,
                lots: Vec::new(),
                movements: Vec::new(),
                idempotency: HashMap::new(),
            },
        );
        Ok(())
    }

    fn load(&self, product_id: ProductId) -> InventoryResult<ProductSnapshot> {
        let products = self
            .products
            .read()
            .map_err(|_| InventoryError::concurrency("lock poisoned"))?;

        let record = products
            .get(&product_id)
            .ok_or_else(|| InventoryError::not_found(format!("product {product_id}")))?;

        Ok(ProductSnapshot {
            product: record.state.clone(),
            lots: record.lots.clone(),
        })
    }

    fn commit(
        &self,
        product_id: ProductId,
        expected: ExpectedVersion,
        set: CommitSet,
    ) -> InventoryResult<Vec<StockMovement>> {
        let mut products = self
            .products
            .write()
            .map_err(|_| InventoryError::concurrency("lock poisoned"))?;

        let record = products
            .get_mut(&product_id)
            .ok_or_else(|| InventoryError::not_found(format!("product {product_id}")))?;

        // Exactly-once per key: a replayed commit returns the prior result
        // without touching the ledger.
        if let Some(key) = &set.idempotency_key {
            if let Some(ids) = record.idempotency.get(key) {
                let prior = record
                    .movements
                    .iter()
                    .filter(|m| ids.contains(&m.id))
                    .cloned()
                    .collect();
                return Ok(prior);
            }
        }

        expected.check(record.state.version)?;
        Self::validate_chain(record, &set)?;
        Self::validate_lots(record, &set)?;

        // Validate the reversal pairing before any mutation.
        if let Some(link) = set.reversal_link {
            let original = record
                .movements
                .iter()
                .find(|m| m.id == link.original)
                .ok_or_else(|| {
                    InventoryError::not_found(format!("movement {}", link.original))
                })?;
            if original.is_reversed {
                return Err(InventoryError::AlreadyReversed(original.id));
            }
        }

        // All validations passed; apply the whole set.
        let mut next = Self::next_sequence(record);
        let mut committed = Vec::with_capacity(set.movements.len());
        for draft in set.movements {
            let movement = StockMovement::from_draft(draft, next);
            next += 1;
            record.movements.push(movement.clone());
            committed.push(movement);
        }

        for lot in set.lot_upserts {
            match record.lots.iter_mut().find(|l| l.id == lot.id) {
                Some(existing) => *existing = lot,
                None => record.lots.push(lot),
            }
        }

        if let Some(link) = set.reversal_link {
            if let Some(original) = record.movements.iter_mut().find(|m| m.id == link.original)
            {
                original.is_reversed = true;
                original.reversal_movement_id = Some(link.reversal);
            }
        }

        record.state.stock = set.new_stock;
        if let Some(average_cost) = set.new_average_cost {
            record.state.average_cost = average_cost;
        }
        record.state.version += 1;

        if let Some(key) = set.idempotency_key {
            record
                .idempotency
                .insert(key, committed.iter().map(|m| m.id).collect());
        }

        Ok(committed)
    }

    fn movements(&self, product_id: ProductId) -> InventoryResult<Vec<StockMovement>> {
        let products = self
            .products
            .read()
            .map_err(|_| InventoryError::concurrency("lock poisoned"))?;

        let record = products
            .get(&product_id)
            .ok_or_else(|| InventoryError::not_found(format!("product {product_id}")))?;

        Ok(record.movements.clone())
    }

    fn find_movement(&self, movement_id: MovementId) -> InventoryResult<StockMovement> {
        let products = self
            .products
            .read()
            .map_err(|_| InventoryError::concurrency("lock poisoned"))?;

        products
            .values()
            .flat_map(|r| r.movements.iter())
            .find(|m| m.id == movement_id)
            .cloned()
            .ok_or_else(|| InventoryError::not_found(format!("movement {movement_id}")))
    }

    fn product_ids(&self) -> Vec<ProductId> {
        match self.products.read() {
            Ok(products) => {
                let mut ids: Vec<ProductId> = products.keys().copied().collect();
                ids.sort();
                ids
            }
            Err(_) => Vec::new(),
        }
    }

    fn recorded_result(
        &self,
        product_id: ProductId,
        key: &str,
    ) -> InventoryResult<Option<Vec<StockMovement>>> {
        let products = self
            .products
            .read()
            .map_err(|_| InventoryError::concurrency("lock poisoned"))?;

        let record = products
            .get(&product_id)
            .ok_or_else(|| InventoryError::not_found(format!("product {product_id}")))?;

        Ok(record.idempotency.get(key).map(|ids| {
            record
                .movements
                .iter()
                .filter(|m| ids.contains(&m.id))
                .cloned()
                .collect()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use lotledger_inventory::{DraftMovement, InventoryLot, MovementType};

    fn store_with_product(product_id: ProductId) -> InMemoryInventoryStore {
        let store = InMemoryInventoryStore::new();
        store
            .insert_product(ProductState::new(product_id))
            .unwrap();
        store
    }

    fn receipt_set(product_id: ProductId, previous: i64, quantity: i64) -> CommitSet {
        let draft = DraftMovement::delta(
            product_id,
            previous,
            quantity,
            MovementType::In,
            Utc::now(),
        )
        .unwrap();
        let new_stock = draft.new_stock;
        CommitSet::new(new_stock).with_movement(draft)
    }

    #[test]
    fn registering_twice_fails() {
        let product_id = ProductId::new(1);
        let store = store_with_product(product_id);
        let err = store.insert_product(ProductState::new(product_id)).unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));
    }

    #[test]
    fn commit_assigns_contiguous_sequences_and_bumps_version() {
        let product_id = ProductId::new(1);
        let store = store_with_product(product_id);

        let first = store
            .commit(product_id, ExpectedVersion::Exact(0), receipt_set(product_id, 0, 10))
            .unwrap();
        let second = store
            .commit(product_id, ExpectedVersion::Exact(1), receipt_set(product_id, 10, 5))
            .unwrap();

        assert_eq!(first[0].sequence, 1);
        assert_eq!(second[0].sequence, 2);

        let snapshot = store.load(product_id).unwrap();
        assert_eq!(snapshot.product.stock, 15);
        assert_eq!(snapshot.product.version, 2);
    }

    #[test]
    fn stale_version_is_a_concurrency_conflict() {
        let product_id = ProductId::new(1);
        let store = store_with_product(product_id);

        store
            .commit(product_id, ExpectedVersion::Exact(0), receipt_set(product_id, 0, 10))
            .unwrap();

        let err = store
            .commit(product_id, ExpectedVersion::Exact(0), receipt_set(product_id, 10, 5))
            .unwrap_err();
        assert!(err.is_retryable());

        // Nothing from the failed commit landed.
        assert_eq!(store.movements(product_id).unwrap().len(), 1);
        assert_eq!(store.load(product_id).unwrap().product.stock, 10);
    }

    #[test]
    fn broken_stock_chain_is_rejected_without_side_effects() {
        let product_id = ProductId::new(1);
        let store = store_with_product(product_id);

        // Draft built against stock 7, but the product sits at 0.
        let err = store
            .commit(product_id, ExpectedVersion::Exact(0), receipt_set(product_id, 7, 5))
            .unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));
        assert!(store.movements(product_id).unwrap().is_empty());
    }

    #[test]
    fn multi_movement_commit_is_all_or_nothing() {
        let product_id = ProductId::new(1);
        let store = store_with_product(product_id);
        store
            .commit(product_id, ExpectedVersion::Exact(0), receipt_set(product_id, 0, 10))
            .unwrap();

        // Two chained outs, but the declared counter is wrong.
        let a = DraftMovement::delta(product_id, 10, -4, MovementType::Out, Utc::now()).unwrap();
        let b = DraftMovement::delta(product_id, 6, -2, MovementType::Out, Utc::now()).unwrap();
        let set = CommitSet::new(3).with_movement(a).with_movement(b);

        let err = store
            .commit(product_id, ExpectedVersion::Exact(1), set)
            .unwrap_err();
        assert!(matches!(err, InventoryError::Validation(_)));
        assert_eq!(store.movements(product_id).unwrap().len(), 1);
        assert_eq!(store.load(product_id).unwrap().product.stock, 10);
    }

    #[test]
    fn lot_upserts_land_with_the_commit() {
        let product_id = ProductId::new(1);
        let store = store_with_product(product_id);

        let lot =
            InventoryLot::receive(product_id, "L1", 10, dec!(2.50), None, Utc::now()).unwrap();
        let draft = DraftMovement::delta(product_id, 0, 10, MovementType::In, Utc::now())
            .unwrap()
            .with_lot(lot.id);
        let set = CommitSet::new(10)
            .with_movement(draft)
            .with_lot(lot.clone())
            .with_average_cost(dec!(2.50));

        store.commit(product_id, ExpectedVersion::Exact(0), set).unwrap();

        let snapshot = store.load(product_id).unwrap();
        assert_eq!(snapshot.lots.len(), 1);
        assert_eq!(snapshot.lots[0].id, lot.id);
        assert_eq!(snapshot.product.average_cost, dec!(2.50));
    }

    #[test]
    fn idempotency_key_replay_returns_the_prior_movements() {
        let product_id = ProductId::new(1);
        let store = store_with_product(product_id);

        let set = receipt_set(product_id, 0, 10).with_idempotency_key(Some("sync-1".into()));
        let first = store
            .commit(product_id, ExpectedVersion::Exact(0), set)
            .unwrap();

        // Same key again, even with a bogus payload: no new posting.
        let replay_set =
            receipt_set(product_id, 10, 99).with_idempotency_key(Some("sync-1".into()));
        let replay = store
            .commit(product_id, ExpectedVersion::Exact(1), replay_set)
            .unwrap();

        assert_eq!(first, replay);
        assert_eq!(store.movements(product_id).unwrap().len(), 1);
        assert_eq!(store.load(product_id).unwrap().product.stock, 10);

        let recorded = store.recorded_result(product_id, "sync-1").unwrap().unwrap();
        assert_eq!(recorded, first);
        assert!(store.recorded_result(product_id, "sync-2").unwrap().is_none());
    }

    #[test]
    fn unknown_product_is_not_found() {
        let store = InMemoryInventoryStore::new();
        let missing = ProductId::new(404);
        assert!(matches!(
            store.load(missing).unwrap_err(),
            InventoryError::NotFound(_)
        ));
        assert!(matches!(
            store.find_movement(MovementId::new()).unwrap_err(),
            InventoryError::NotFound(_)
        ));
    }
}
