//! Purchasing backlog entries raised when site stock cannot cover a dispatch.
//!
//! Pure domain logic (no IO, no storage). The purchasing workflow proper
//! (quotes, orders, receipts) lives outside this workspace.

pub mod request;

pub use request::{
    NewPurchaseRequest, PurchasePriority, PurchaseRequest, PurchaseRequestEvent,
    PurchaseRequestId, PurchaseRequestRaised, PurchaseRequestStatus,
};
