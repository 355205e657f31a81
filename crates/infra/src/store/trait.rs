use chrono::{DateTime, Utc};
use thiserror::Error;

use kardex_inventory::{InventoryItem, InventoryItemId, InventoryMovement, StockKey};
use kardex_requisition::{Requisition, RequisitionId};
use std::sync::Arc;

/// Aggregates to persist together in one atomic write.
///
/// Each value carries the version it was loaded from; new aggregates carry 0.
/// Movements are taken from each item's pending buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitOfWork {
    requisitions: Vec<Requisition>,
    items: Vec<InventoryItem>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_requisition(mut self, requisition: Requisition) -> Self {
        self.requisitions.push(requisition);
        self
    }

    pub fn with_item(mut self, item: InventoryItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn with_items(mut self, items: impl IntoIterator<Item = InventoryItem>) -> Self {
        self.items.extend(items);
        self
    }

    pub fn requisitions(&self) -> &[Requisition] {
        &self.requisitions
    }

    pub fn items(&self) -> &[InventoryItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.requisitions.is_empty() && self.items.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Requisition>, Vec<InventoryItem>) {
        (self.requisitions, self.items)
    }
}

/// What a successful commit wrote.
///
/// Aggregates come back at their new version with empty movement buffers;
/// `movements` lists the ledger entries appended, in commit order.
/// `publish_failures` holds one message per event that could not be handed to
/// the bus after the write landed; the write itself stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub requisitions: Vec<Requisition>,
    pub items: Vec<InventoryItem>,
    pub movements: Vec<InventoryMovement>,
    pub committed_at: DateTime<Utc>,
    pub publish_failures: Vec<String>,
}

impl CommitReceipt {
    pub fn requisition(&self, id: RequisitionId) -> Option<&Requisition> {
        self.requisitions.iter().find(|r| r.id_typed() == id)
    }

    pub fn item(&self, id: InventoryItemId) -> Option<&InventoryItem> {
        self.items.iter().find(|i| i.id_typed() == id)
    }

    pub fn fully_published(&self) -> bool {
        self.publish_failures.is_empty()
    }
}

/// Storage operation error.
///
/// Infrastructure failures, as opposed to domain rule violations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Optimistic concurrency check failed; nothing was written.
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    /// The unit of work is malformed (duplicates, stored data that fails to restore).
    #[error("invalid unit of work: {0}")]
    Invalid(String),

    #[error("store lock poisoned")]
    Poisoned,
}

/// Persistence boundary for requisitions, stock heads and the movement ledger.
///
/// Implementations must:
/// - check every aggregate's expected version before writing anything
/// - write requisitions, heads and movements all-or-nothing
/// - keep at most one head per [`StockKey`]
/// - never update or delete a stored movement
pub trait LogisticsStore: Send + Sync {
    fn load_requisition(&self, id: RequisitionId) -> Result<Option<Requisition>, StoreError>;

    fn load_item(&self, id: InventoryItemId) -> Result<Option<InventoryItem>, StoreError>;

    fn find_item(&self, key: &StockKey) -> Result<Option<InventoryItem>, StoreError>;

    /// Ledger of one item, in append order.
    fn movements(&self, item_id: InventoryItemId) -> Result<Vec<InventoryMovement>, StoreError>;

    fn commit(&self, unit: UnitOfWork) -> Result<CommitReceipt, StoreError>;
}

impl<S> LogisticsStore for Arc<S>
where
    S: LogisticsStore + ?Sized,
{
    fn load_requisition(&self, id: RequisitionId) -> Result<Option<Requisition>, StoreError> {
        (**self).load_requisition(id)
    }

    fn load_item(&self, id: InventoryItemId) -> Result<Option<InventoryItem>, StoreError> {
        (**self).load_item(id)
    }

    fn find_item(&self, key: &StockKey) -> Result<Option<InventoryItem>, StoreError> {
        (**self).find_item(key)
    }

    fn movements(&self, item_id: InventoryItemId) -> Result<Vec<InventoryMovement>, StoreError> {
        (**self).movements(item_id)
    }

    fn commit(&self, unit: UnitOfWork) -> Result<CommitReceipt, StoreError> {
        (**self).commit(unit)
    }
}
