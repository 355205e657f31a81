//! `kardex-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the ledger,
//! requisition and purchasing crates (no infrastructure concerns).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    AggregateId, BudgetLineId, EntityId, ProjectId, PurchaseDetailId, TransferId, UserId,
    WarehouseId,
};
pub use value_object::{ResourceRef, UnitOfMeasure, ValueObject, ensure_positive, round_half_up};
