use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::Utc;

use kardex_core::{AggregateRoot, ExpectedVersion};
use kardex_inventory::{InventoryItem, InventoryItemId, InventoryMovement, ItemSnapshot, StockKey};
use kardex_requisition::{Requisition, RequisitionId, RequisitionSnapshot};

use super::r#trait::{CommitReceipt, LogisticsStore, StoreError, UnitOfWork};

#[derive(Debug, Default)]
struct Tables {
    requisitions: HashMap<RequisitionId, RequisitionSnapshot>,
    items: HashMap<InventoryItemId, ItemSnapshot>,
    keys: HashMap<StockKey, InventoryItemId>,
    movements: HashMap<InventoryItemId, Vec<InventoryMovement>>,
}

/// In-memory store holding persisted shapes behind one lock.
///
/// Intended for tests/dev. The write lock is the commit critical section.
#[derive(Debug, Default)]
pub struct InMemoryLogisticsStore {
    tables: RwLock<Tables>,
}

impl InMemoryLogisticsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of ledger entries across all items.
    pub fn movement_count(&self) -> Result<usize, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        Ok(tables.movements.values().map(Vec::len).sum())
    }

    fn check_requisition(tables: &Tables, requisition: &Requisition) -> Result<(), StoreError> {
        let id = requisition.id_typed();
        let current = tables.requisitions.get(&id).map(|s| s.version);
        check_version(
            "requisition",
            &id.to_string(),
            requisition.expected_version(),
            current,
        )
    }

    fn check_item(tables: &Tables, item: &InventoryItem) -> Result<(), StoreError> {
        let id = item.id_typed();
        let current = tables.items.get(&id).map(|s| s.version);
        check_version("inventory item", &id.to_string(), item.expected_version(), current)?;

        match tables.keys.get(item.key()) {
            Some(owner) if *owner != id => Err(StoreError::Concurrency(format!(
                "stock head for {}/{} in warehouse {} already exists as {owner}",
                item.resource(),
                item.unit(),
                item.warehouse_id()
            ))),
            _ => Ok(()),
        }
    }
}

fn check_version(
    kind: &str,
    id: &str,
    expected: ExpectedVersion,
    current: Option<u64>,
) -> Result<(), StoreError> {
    match (expected, current) {
        (ExpectedVersion::Exact(0), Some(found)) => Err(StoreError::Concurrency(format!(
            "{kind} {id} already exists at version {found}"
        ))),
        (ExpectedVersion::Exact(v), None) if v != 0 => Err(StoreError::Concurrency(format!(
            "{kind} {id} expected at version {v} but does not exist"
        ))),
        (expected, Some(found)) if !expected.matches(found) => Err(StoreError::Concurrency(
            format!("{kind} {id}: expected {expected:?}, found {found}"),
        )),
        _ => Ok(()),
    }
}

fn ensure_distinct<T: core::fmt::Display>(
    kind: &str,
    ids: impl IntoIterator<Item = T>,
) -> Result<(), StoreError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id.to_string()) {
            return Err(StoreError::Invalid(format!(
                "{kind} {id} appears twice in one unit of work"
            )));
        }
    }
    Ok(())
}

impl LogisticsStore for InMemoryLogisticsStore {
    fn load_requisition(&self, id: RequisitionId) -> Result<Option<Requisition>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        tables
            .requisitions
            .get(&id)
            .cloned()
            .map(|snap| Requisition::restore(snap).map_err(|e| StoreError::Invalid(e.to_string())))
            .transpose()
    }

    fn load_item(&self, id: InventoryItemId) -> Result<Option<InventoryItem>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        tables
            .items
            .get(&id)
            .cloned()
            .map(|snap| InventoryItem::restore(snap).map_err(|e| StoreError::Invalid(e.to_string())))
            .transpose()
    }

    fn find_item(&self, key: &StockKey) -> Result<Option<InventoryItem>, StoreError> {
        let id = {
            let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
            match tables.keys.get(key) {
                Some(id) => *id,
                None => return Ok(None),
            }
        };
        self.load_item(id)
    }

    fn movements(&self, item_id: InventoryItemId) -> Result<Vec<InventoryMovement>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::Poisoned)?;
        Ok(tables.movements.get(&item_id).cloned().unwrap_or_default())
    }

    fn commit(&self, unit: UnitOfWork) -> Result<CommitReceipt, StoreError> {
        ensure_distinct("requisition", unit.requisitions().iter().map(|r| r.id_typed()))?;
        ensure_distinct("inventory item", unit.items().iter().map(|i| i.id_typed()))?;
        ensure_distinct("stock key", unit.items().iter().map(|i| {
            format!("{}/{}/{}/{}", i.project_id(), i.resource(), i.unit(), i.warehouse_id())
        }))?;

        let mut tables = self.tables.write().map_err(|_| StoreError::Poisoned)?;

        // 1) Check every version before touching anything.
        for requisition in unit.requisitions() {
            Self::check_requisition(&tables, requisition)?;
        }
        for item in unit.items() {
            Self::check_item(&tables, item)?;
        }

        // 2) Write.
        let committed_at = Utc::now();
        let (requisitions, items) = unit.into_parts();

        let mut saved_requisitions = Vec::with_capacity(requisitions.len());
        for requisition in requisitions {
            let next = requisition.version() + 1;
            let saved = requisition.mark_persisted(next);
            tables
                .requisitions
                .insert(saved.id_typed(), saved.snapshot());
            saved_requisitions.push(saved);
        }

        let mut saved_items = Vec::with_capacity(items.len());
        let mut movements = Vec::new();
        for item in items {
            let appended = item.pending_movements().to_vec();
            let next = item.version() + 1;
            let saved = item.mark_persisted(next);
            let id = saved.id_typed();

            tables.keys.insert(saved.key().clone(), id);
            tables.items.insert(id, saved.snapshot());
            tables
                .movements
                .entry(id)
                .or_default()
                .extend(appended.iter().cloned());

            movements.extend(appended);
            saved_items.push(saved);
        }

        Ok(CommitReceipt {
            requisitions: saved_requisitions,
            items: saved_items,
            movements,
            committed_at,
            publish_failures: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use kardex_core::{AggregateId, EntityId, ProjectId, ResourceRef, UnitOfMeasure, WarehouseId};
    use kardex_inventory::{ItemProfile, LedgerPolicy, NewInventoryItem, ReceiveStock};
    use kardex_requisition::{NewRequisition, NewRequisitionLine, RequisitionLineId};
    use rust_decimal_macros::dec;

    fn new_item(key: StockKey) -> InventoryItem {
        InventoryItem::open(NewInventoryItem {
            id: InventoryItemId::new(AggregateId::new()),
            key,
            profile: ItemProfile::new("Gravel 3/4", "AGGREGATE").unwrap(),
            opened_at: Utc::now(),
        })
    }

    fn key() -> StockKey {
        StockKey::new(
            ProjectId::new(),
            ResourceRef::new("AGG-34").unwrap(),
            UnitOfMeasure::new("M3").unwrap(),
            WarehouseId::new(),
        )
    }

    fn received(item: &InventoryItem, quantity: rust_decimal::Decimal) -> InventoryItem {
        item.receive(
            &ReceiveStock {
                quantity,
                unit_cost: dec!(30),
                purchase_detail_id: None,
                reference: "GRN-9".to_string(),
                occurred_at: Utc::now(),
            },
            &LedgerPolicy::default(),
        )
        .unwrap()
        .item
    }

    fn requisition() -> Requisition {
        Requisition::create(NewRequisition {
            id: RequisitionId::new(AggregateId::new()),
            project_id: ProjectId::new(),
            requester: "foreman".to_string(),
            work_front: None,
            notes: None,
            lines: vec![NewRequisitionLine {
                id: RequisitionLineId::new(EntityId::new()),
                resource: ResourceRef::new("AGG-34").unwrap(),
                unit: UnitOfMeasure::new("M3").unwrap(),
                budget_line_id: None,
                solicited: dec!(3),
                justification: None,
            }],
            requested_at: Utc::now(),
        })
        .unwrap()
    }

    #[test]
    fn commit_bumps_versions_and_appends_movements() {
        let store = InMemoryLogisticsStore::new();
        let item = received(&new_item(key()), dec!(5));

        let receipt = store.commit(UnitOfWork::new().with_item(item.clone())).unwrap();
        let saved = receipt.item(item.id_typed()).unwrap();
        assert_eq!(saved.version(), 1);
        assert!(saved.pending_movements().is_empty());
        assert_eq!(receipt.movements.len(), 1);

        let loaded = store.find_item(item.key()).unwrap().unwrap();
        assert_eq!(loaded.quantity(), dec!(5));
        assert_eq!(loaded.version(), 1);
        assert_eq!(store.movements(item.id_typed()).unwrap().len(), 1);
    }

    #[test]
    fn stale_version_rejects_the_whole_unit() {
        let store = InMemoryLogisticsStore::new();
        let item = received(&new_item(key()), dec!(5));
        store.commit(UnitOfWork::new().with_item(item.clone())).unwrap();

        let loaded = store.load_item(item.id_typed()).unwrap().unwrap();
        let winner = received(&loaded, dec!(1));
        let loser = received(&loaded, dec!(2));
        store.commit(UnitOfWork::new().with_item(winner)).unwrap();

        let req = requisition();
        let err = store
            .commit(UnitOfWork::new().with_requisition(req.clone()).with_item(loser))
            .unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));

        // nothing from the rejected unit landed
        assert!(store.load_requisition(req.id_typed()).unwrap().is_none());
        assert_eq!(store.movement_count().unwrap(), 2);
        assert_eq!(
            store.load_item(item.id_typed()).unwrap().unwrap().quantity(),
            dec!(6)
        );
    }

    #[test]
    fn second_head_for_the_same_key_is_rejected() {
        let store = InMemoryLogisticsStore::new();
        let k = key();
        store
            .commit(UnitOfWork::new().with_item(received(&new_item(k.clone()), dec!(1))))
            .unwrap();
        let err = store
            .commit(UnitOfWork::new().with_item(received(&new_item(k), dec!(1))))
            .unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
    }

    #[test]
    fn creating_an_existing_requisition_conflicts() {
        let store = InMemoryLogisticsStore::new();
        let req = requisition();
        store.commit(UnitOfWork::new().with_requisition(req.clone())).unwrap();
        let err = store
            .commit(UnitOfWork::new().with_requisition(req))
            .unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
    }

    #[test]
    fn duplicate_aggregates_in_one_unit_are_invalid() {
        let store = InMemoryLogisticsStore::new();
        let req = requisition();
        let err = store
            .commit(
                UnitOfWork::new()
                    .with_requisition(req.clone())
                    .with_requisition(req),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }
}
