//! Outbound collaborator boundaries.
//!
//! Everything the logistics core needs from the rest of the ERP (warehouse
//! setup, project staffing, purchasing, cost control) goes through these
//! traits. `adapters` ships in-memory implementations.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use kardex_core::{BudgetLineId, ProjectId, ResourceRef, UnitOfMeasure, UserId, WarehouseId};
use kardex_purchasing::{PurchasePriority, PurchaseRequest, PurchaseRequestId};
use kardex_requisition::RequisitionId;

/// Collaborator call failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PortError {
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("collaborator rejected the request: {0}")]
    Rejected(String),
}

/// Default warehouse lookup per project.
pub trait WarehouseResolver: Send + Sync {
    fn default_for_project(&self, project_id: ProjectId) -> Result<Option<WarehouseId>, PortError>;
}

/// Project staffing lookup: who may approve requisitions.
pub trait ApproverDirectory: Send + Sync {
    fn assigned_approver(&self, project_id: ProjectId) -> Result<Option<UserId>, PortError>;
}

/// Purchase request raised on a stock shortfall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogRequest {
    pub project_id: ProjectId,
    pub requisition_id: RequisitionId,
    pub resource: ResourceRef,
    pub quantity: Decimal,
    pub unit: UnitOfMeasure,
    pub priority: PurchasePriority,
}

/// Purchasing backlog.
pub trait BacklogPort: Send + Sync {
    fn create_purchase_request(
        &self,
        request: BacklogRequest,
    ) -> Result<PurchaseRequestId, PortError>;

    /// Requests raised for `requisition_id` that still await goods.
    fn pending_for_requisition(
        &self,
        requisition_id: RequisitionId,
    ) -> Result<Vec<PurchaseRequest>, PortError>;

    /// Requests still awaiting one resource of a project, in raise order.
    fn pending_for_resource(
        &self,
        project_id: ProjectId,
        resource: &ResourceRef,
        unit: &UnitOfMeasure,
    ) -> Result<Vec<PurchaseRequest>, PortError>;

    /// The goods for `id` arrived. Idempotent; rejected for a cancelled request.
    fn mark_received(&self, id: PurchaseRequestId) -> Result<PurchaseRequest, PortError>;
}

/// How a dispatched cost is booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpenseNature {
    /// Charged to the requisition line's budget line.
    DirectBudgetLine,
    /// No budget line on the requisition line; absorbed by site overhead.
    GeneralSiteOverhead,
}

impl ExpenseNature {
    pub fn for_budget_line(budget_line_id: Option<BudgetLineId>) -> Self {
        match budget_line_id {
            Some(_) => ExpenseNature::DirectBudgetLine,
            None => ExpenseNature::GeneralSiteOverhead,
        }
    }
}

/// Realized cost of goods issued to the site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostAllocation {
    pub budget_line_id: Option<BudgetLineId>,
    pub nature: ExpenseNature,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub reference: String,
}

impl CostAllocation {
    pub fn total_cost(&self) -> Decimal {
        self.quantity * self.unit_cost
    }
}

/// Budget cost control.
pub trait CostAllocationPort: Send + Sync {
    fn record_actual_cost(&self, allocation: CostAllocation) -> Result<(), PortError>;
}

/// The set of collaborators the logistics services call out to.
#[derive(Clone)]
pub struct Collaborators {
    pub warehouses: Arc<dyn WarehouseResolver>,
    pub approvers: Arc<dyn ApproverDirectory>,
    pub backlog: Arc<dyn BacklogPort>,
    pub costs: Arc<dyn CostAllocationPort>,
}

impl core::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
