//! Persistence boundary for the logistics aggregates.
//!
//! One commit writes requisitions, stock heads and their new movements as a
//! single all-or-nothing unit under optimistic version checks.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryLogisticsStore;
pub use r#trait::{CommitReceipt, LogisticsStore, StoreError, UnitOfWork};

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::warn;

use kardex_core::AggregateRoot;
use kardex_events::{Event, EventBus, EventEnvelope};
use kardex_inventory::{InventoryEvent, InventoryItem, InventoryItemId, InventoryMovement, StockKey};
use kardex_requisition::{Requisition, RequisitionEvent, RequisitionId};

/// Adapter that publishes committed changes to an `EventBus` after a successful commit.
///
/// Publishing happens only after the commit succeeds. A failed publish never
/// turns a landed write into an error: it is logged and recorded in
/// [`CommitReceipt::publish_failures`], and the remaining events still go out.
pub struct PublishingStore<S, B> {
    store: S,
    bus: B,
}

impl<S, B> PublishingStore<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> PublishingStore<S, B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    fn publish<E>(&self, aggregate_version: u64, event: &E) -> Result<(), String>
    where
        E: Event + Serialize,
    {
        let envelope = EventEnvelope::from_typed(aggregate_version, event)
            .map_err(|e| format!("{} not serializable: {e}", event.event_type()))?;
        self.bus
            .publish(envelope)
            .map_err(|e| format!("{} not published: {e:?}", event.event_type()))
    }
}

/// Movement events captured before the commit clears the item buffers.
fn pending_events(unit: &UnitOfWork) -> Vec<(InventoryItemId, InventoryEvent)> {
    unit.items()
        .iter()
        .flat_map(|item: &InventoryItem| {
            InventoryEvent::pending_for(item)
                .into_iter()
                .map(move |e| (item.id_typed(), e))
        })
        .collect()
}

impl<S, B> LogisticsStore for PublishingStore<S, B>
where
    S: LogisticsStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    fn load_requisition(&self, id: RequisitionId) -> Result<Option<Requisition>, StoreError> {
        self.store.load_requisition(id)
    }

    fn load_item(&self, id: InventoryItemId) -> Result<Option<InventoryItem>, StoreError> {
        self.store.load_item(id)
    }

    fn find_item(&self, key: &StockKey) -> Result<Option<InventoryItem>, StoreError> {
        self.store.find_item(key)
    }

    fn movements(&self, item_id: InventoryItemId) -> Result<Vec<InventoryMovement>, StoreError> {
        self.store.movements(item_id)
    }

    fn commit(&self, unit: UnitOfWork) -> Result<CommitReceipt, StoreError> {
        let movement_events = pending_events(&unit);

        // 1) Commit (durable step)
        let mut receipt = self.store.commit(unit)?;

        // 2) Publish (best-effort; at-least-once acceptable)
        let mut failures = Vec::new();
        for requisition in &receipt.requisitions {
            let event = RequisitionEvent::saved(
                requisition,
                requisition.version(),
                receipt.committed_at,
            );
            if let Err(failure) = self.publish(requisition.version(), &event) {
                failures.push(failure);
            }
        }

        for (item_id, event) in &movement_events {
            let version = receipt.item(*item_id).map(|i| i.version()).unwrap_or_default();
            if let Err(failure) = self.publish(version, event) {
                failures.push(failure);
            }
        }

        for failure in &failures {
            warn!(%failure, "committed change not published");
        }
        receipt.publish_failures = failures;
        Ok(receipt)
    }
}
