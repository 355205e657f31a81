use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kardex_core::{AggregateId, ProjectId, ResourceRef, UnitOfMeasure, WarehouseId};
use kardex_events::Event;

use crate::item::InventoryItem;
use crate::movement::InventoryMovement;

/// Inventory domain events, published after a successful commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum InventoryEvent {
    MovementRecorded(MovementRecorded),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecorded {
    pub project_id: ProjectId,
    pub warehouse_id: WarehouseId,
    pub resource: ResourceRef,
    pub unit: UnitOfMeasure,
    pub movement: InventoryMovement,
}

impl InventoryEvent {
    /// One event per movement still buffered on `item`.
    pub fn pending_for(item: &InventoryItem) -> Vec<InventoryEvent> {
        item.pending_movements()
            .iter()
            .map(|movement| {
                InventoryEvent::MovementRecorded(MovementRecorded {
                    project_id: item.project_id(),
                    warehouse_id: item.warehouse_id(),
                    resource: item.resource().clone(),
                    unit: item.unit().clone(),
                    movement: movement.clone(),
                })
            })
            .collect()
    }
}

impl Event for InventoryEvent {
    const AGGREGATE_TYPE: &'static str = "inventory.item";

    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::MovementRecorded(_) => "inventory.movement.recorded",
        }
    }

    fn project_id(&self) -> ProjectId {
        match self {
            InventoryEvent::MovementRecorded(e) => e.project_id,
        }
    }

    fn aggregate_id(&self) -> AggregateId {
        match self {
            InventoryEvent::MovementRecorded(e) => e.movement.item_id().0,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::MovementRecorded(e) => e.movement.recorded_at(),
        }
    }
}
