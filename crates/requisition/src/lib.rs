//! Requisition domain module (material requests from the work site).
//!
//! Workflow state machine and per-line dispatch progress, implemented as pure
//! domain logic (no IO, no storage).

pub mod event;
pub mod requisition;

pub use event::{RequisitionEvent, RequisitionSaved};
pub use requisition::{
    NewRequisition, NewRequisitionLine, Requisition, RequisitionId, RequisitionLine,
    RequisitionLineId, RequisitionSnapshot, RequisitionStatus,
};
