//! Ledger entries.
//!
//! A movement is created only as a side effect of an `InventoryItem` operation
//! and is never updated or deleted afterwards.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use kardex_core::{
    BudgetLineId, DomainError, DomainResult, Entity, EntityId, PurchaseDetailId, TransferId,
    ensure_positive,
};
use kardex_requisition::{RequisitionId, RequisitionLineId};

use crate::item::InventoryItemId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(pub EntityId);

impl MovementId {
    pub fn new(id: EntityId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(EntityId::new())
    }
}

impl core::fmt::Display for MovementId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    ReceiptByPurchase,
    IssueByConsumption,
    TransferOut,
    TransferIn,
    LoanOut,
    LoanIn,
    Adjustment,
}

impl MovementKind {
    /// Direction implied by the kind; `None` for adjustments, which go either way.
    pub fn fixed_direction(self) -> Option<Direction> {
        match self {
            MovementKind::ReceiptByPurchase | MovementKind::TransferIn | MovementKind::LoanIn => {
                Some(Direction::Inbound)
            }
            MovementKind::IssueByConsumption | MovementKind::TransferOut | MovementKind::LoanOut => {
                Some(Direction::Outbound)
            }
            MovementKind::Adjustment => None,
        }
    }

    /// Inbound kinds that carry their own unit cost and re-average the head.
    pub fn revalues_stock(self) -> bool {
        matches!(
            self,
            MovementKind::ReceiptByPurchase | MovementKind::TransferIn | MovementKind::LoanIn
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Optional links from a movement to the document that caused it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementCorrelation {
    pub requisition_id: Option<RequisitionId>,
    pub requisition_line_id: Option<RequisitionLineId>,
    pub budget_line_id: Option<BudgetLineId>,
    pub transfer_id: Option<TransferId>,
    pub purchase_detail_id: Option<PurchaseDetailId>,
}

/// One immutable kardex entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryMovement {
    id: MovementId,
    item_id: InventoryItemId,
    kind: MovementKind,
    direction: Direction,
    quantity: Decimal,
    unit_cost: Decimal,
    total_cost: Decimal,
    correlation: MovementCorrelation,
    reference: String,
    justification: Option<String>,
    recorded_at: DateTime<Utc>,
}

/// Fields needed to record a movement; validated by [`InventoryMovement::record`].
#[derive(Debug, Clone)]
pub(crate) struct MovementDraft {
    pub item_id: InventoryItemId,
    pub kind: MovementKind,
    pub direction: Direction,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub correlation: MovementCorrelation,
    pub reference: String,
    pub justification: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl InventoryMovement {
    pub(crate) fn record(draft: MovementDraft) -> DomainResult<Self> {
        ensure_positive("movement quantity", draft.quantity)?;
        if draft.unit_cost < Decimal::ZERO {
            return Err(DomainError::validation("unit cost cannot be negative"));
        }
        let reference = draft.reference.trim();
        if reference.is_empty() {
            return Err(DomainError::validation("movement reference cannot be blank"));
        }
        if let Some(expected) = draft.kind.fixed_direction() {
            if expected != draft.direction {
                return Err(DomainError::invariant(format!(
                    "{:?} movements are always {:?}",
                    draft.kind, expected
                )));
            }
        }
        let justification = draft
            .justification
            .map(|j| j.trim().to_string())
            .filter(|j| !j.is_empty());
        if draft.kind == MovementKind::Adjustment && justification.is_none() {
            return Err(DomainError::validation(
                "adjustment movements require a justification",
            ));
        }
        let total_cost = draft
            .quantity
            .checked_mul(draft.unit_cost)
            .ok_or_else(|| DomainError::validation("movement total cost overflows"))?;

        Ok(Self {
            id: MovementId::generate(),
            item_id: draft.item_id,
            kind: draft.kind,
            direction: draft.direction,
            quantity: draft.quantity,
            unit_cost: draft.unit_cost,
            total_cost,
            correlation: draft.correlation,
            reference: reference.to_string(),
            justification,
            recorded_at: draft.recorded_at,
        })
    }

    pub fn id_typed(&self) -> MovementId {
        self.id
    }

    pub fn item_id(&self) -> InventoryItemId {
        self.item_id
    }

    pub fn kind(&self) -> MovementKind {
        self.kind
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Quantity with the sign of its direction (+ inbound, - outbound).
    pub fn signed_quantity(&self) -> Decimal {
        match self.direction {
            Direction::Inbound => self.quantity,
            Direction::Outbound => -self.quantity,
        }
    }

    pub fn unit_cost(&self) -> Decimal {
        self.unit_cost
    }

    pub fn total_cost(&self) -> Decimal {
        self.total_cost
    }

    pub fn correlation(&self) -> &MovementCorrelation {
        &self.correlation
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn justification(&self) -> Option<&str> {
        self.justification.as_deref()
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

impl Entity for InventoryMovement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
