//! In-memory collaborator adapters for tests/dev.

pub mod backlog;
pub mod cost_ledger;
pub mod directory;

pub use backlog::InMemoryBacklog;
pub use cost_ledger::RecordingCostAllocation;
pub use directory::{StaticApproverDirectory, StaticWarehouseResolver};
