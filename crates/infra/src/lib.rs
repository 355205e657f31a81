//! Infrastructure and application layer: storage, collaborator adapters,
//! configuration and the logistics use cases.

pub mod adapters;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod ports;
pub mod retry;
pub mod service;
pub mod store;


pub use config::{ConfigError, DispatchSettings, LogisticsConfig};
pub use dispatch::{DispatchIntent, DispatchOrchestrator, DispatchOutcome, DispatchedLine};
pub use error::LogisticsError;
pub use ports::{
    ApproverDirectory, BacklogPort, BacklogRequest, Collaborators, CostAllocation,
    CostAllocationPort, ExpenseNature, PortError, WarehouseResolver,
};
pub use retry::with_conflict_retry;
pub use service::{LogisticsService, ReceiveInventory, TransferOutcome, TransferStock};
pub use store::{
    CommitReceipt, InMemoryLogisticsStore, LogisticsStore, PublishingStore, StoreError,
    UnitOfWork,
};
