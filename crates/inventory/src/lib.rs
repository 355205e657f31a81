//! Inventory ledger (kardex).
//!
//! Stock heads per (project, resource, unit, warehouse) with moving
//! weighted-average costing, and the append-only movement ledger they produce.
//! Pure domain logic: no IO, no storage.

pub mod event;
pub mod item;
pub mod ledger;
pub mod movement;
pub mod policy;

pub use event::{InventoryEvent, MovementRecorded};
pub use item::{
    AdjustStock, DispatchCorrelation, InventoryItem, InventoryItemId, InventoryTransaction,
    IssueStock, ItemProfile, ItemSnapshot, NewInventoryItem, ReceiveStock, StockKey, TransferIn,
    TransferMode, TransferOut,
};
pub use ledger::{LedgerDrift, StockPosition, replay, verify, weighted_average};
pub use movement::{
    Direction, InventoryMovement, MovementCorrelation, MovementId, MovementKind,
};
pub use policy::LedgerPolicy;
