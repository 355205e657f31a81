use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use kardex_core::{
    AggregateId, AggregateRoot, DomainError, DomainResult, ProjectId, ResourceRef, UnitOfMeasure,
    ensure_positive,
};
use kardex_events::Event;
use kardex_requisition::RequisitionId;

/// Purchase request identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseRequestId(pub AggregateId);

impl PurchaseRequestId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PurchaseRequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchasePriority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseRequestStatus {
    Pending,
    Received,
    Cancelled,
}

impl core::fmt::Display for PurchaseRequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            PurchaseRequestStatus::Pending => "PENDING",
            PurchaseRequestStatus::Received => "RECEIVED",
            PurchaseRequestStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Input for [`PurchaseRequest::raise`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchaseRequest {
    pub id: PurchaseRequestId,
    pub project_id: ProjectId,
    pub requisition_id: RequisitionId,
    pub resource: ResourceRef,
    pub quantity: Decimal,
    pub unit: UnitOfMeasure,
    pub priority: PurchasePriority,
    pub raised_at: DateTime<Utc>,
}

/// Aggregate root: PurchaseRequest (a backlog entry for purchasing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequest {
    id: PurchaseRequestId,
    project_id: ProjectId,
    requisition_id: RequisitionId,
    resource: ResourceRef,
    quantity: Decimal,
    unit: UnitOfMeasure,
    priority: PurchasePriority,
    status: PurchaseRequestStatus,
    raised_at: DateTime<Utc>,
    version: u64,
}

impl PurchaseRequest {
    pub fn raise(new: NewPurchaseRequest) -> DomainResult<Self> {
        ensure_positive("needed quantity", new.quantity)?;
        Ok(Self {
            id: new.id,
            project_id: new.project_id,
            requisition_id: new.requisition_id,
            resource: new.resource,
            quantity: new.quantity,
            unit: new.unit,
            priority: new.priority,
            status: PurchaseRequestStatus::Pending,
            raised_at: new.raised_at,
            version: 0,
        })
    }

    pub fn id_typed(&self) -> PurchaseRequestId {
        self.id
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn requisition_id(&self) -> RequisitionId {
        self.requisition_id
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    pub fn unit(&self) -> &UnitOfMeasure {
        &self.unit
    }

    pub fn priority(&self) -> PurchasePriority {
        self.priority
    }

    pub fn status(&self) -> PurchaseRequestStatus {
        self.status
    }

    pub fn raised_at(&self) -> DateTime<Utc> {
        self.raised_at
    }

    /// Idempotent; a cancelled request cannot be received.
    pub fn mark_received(&self) -> DomainResult<Self> {
        match self.status {
            PurchaseRequestStatus::Received => Ok(self.clone()),
            PurchaseRequestStatus::Cancelled => {
                Err(DomainError::invalid_transition(self.status, "mark received"))
            }
            PurchaseRequestStatus::Pending => Ok(self.bumped(PurchaseRequestStatus::Received)),
        }
    }

    /// Idempotent; a received request cannot be cancelled.
    pub fn cancel(&self) -> DomainResult<Self> {
        match self.status {
            PurchaseRequestStatus::Cancelled => Ok(self.clone()),
            PurchaseRequestStatus::Received => {
                Err(DomainError::invalid_transition(self.status, "cancel"))
            }
            PurchaseRequestStatus::Pending => Ok(self.bumped(PurchaseRequestStatus::Cancelled)),
        }
    }

    fn bumped(&self, status: PurchaseRequestStatus) -> Self {
        Self {
            status,
            version: self.version + 1,
            ..self.clone()
        }
    }
}

impl AggregateRoot for PurchaseRequest {
    type Id = PurchaseRequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Event: PurchaseRequestRaised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseRequestRaised {
    pub request_id: PurchaseRequestId,
    pub project_id: ProjectId,
    pub requisition_id: RequisitionId,
    pub resource: ResourceRef,
    pub quantity: Decimal,
    pub unit: UnitOfMeasure,
    pub priority: PurchasePriority,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PurchaseRequestEvent {
    Raised(PurchaseRequestRaised),
}

impl PurchaseRequestEvent {
    pub fn raised(request: &PurchaseRequest) -> Self {
        PurchaseRequestEvent::Raised(PurchaseRequestRaised {
            request_id: request.id,
            project_id: request.project_id,
            requisition_id: request.requisition_id,
            resource: request.resource.clone(),
            quantity: request.quantity,
            unit: request.unit.clone(),
            priority: request.priority,
            occurred_at: request.raised_at,
        })
    }
}

impl Event for PurchaseRequestEvent {
    const AGGREGATE_TYPE: &'static str = "purchasing.request";

    fn event_type(&self) -> &'static str {
        match self {
            PurchaseRequestEvent::Raised(_) => "purchasing.request.raised",
        }
    }

    fn project_id(&self) -> ProjectId {
        match self {
            PurchaseRequestEvent::Raised(e) => e.project_id,
        }
    }

    fn aggregate_id(&self) -> AggregateId {
        match self {
            PurchaseRequestEvent::Raised(e) => e.request_id.0,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseRequestEvent::Raised(e) => e.occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_request() -> PurchaseRequest {
        PurchaseRequest::raise(NewPurchaseRequest {
            id: PurchaseRequestId::new(AggregateId::new()),
            project_id: ProjectId::new(),
            requisition_id: RequisitionId::new(AggregateId::new()),
            resource: ResourceRef::new("MAT-001").unwrap(),
            quantity: dec!(40),
            unit: UnitOfMeasure::new("BAG").unwrap(),
            priority: PurchasePriority::Urgent,
            raised_at: Utc::now(),
        })
        .unwrap()
    }

    #[test]
    fn raise_starts_pending() {
        let r = test_request();
        assert_eq!(r.status(), PurchaseRequestStatus::Pending);
        assert_eq!(r.version(), 0);
        assert_eq!(
            PurchaseRequestEvent::raised(&r).event_type(),
            "purchasing.request.raised"
        );
    }

    #[test]
    fn raise_rejects_non_positive_quantity() {
        let err = PurchaseRequest::raise(NewPurchaseRequest {
            id: PurchaseRequestId::new(AggregateId::new()),
            project_id: ProjectId::new(),
            requisition_id: RequisitionId::new(AggregateId::new()),
            resource: ResourceRef::new("MAT-001").unwrap(),
            quantity: Decimal::ZERO,
            unit: UnitOfMeasure::new("BAG").unwrap(),
            priority: PurchasePriority::Normal,
            raised_at: Utc::now(),
        })
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn receive_is_idempotent_and_blocks_cancel() {
        let received = test_request().mark_received().unwrap();
        let again = received.mark_received().unwrap();
        assert_eq!(again, received);
        assert!(matches!(
            received.cancel(),
            Err(DomainError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn cancel_is_idempotent_and_blocks_receive() {
        let cancelled = test_request().cancel().unwrap();
        assert_eq!(cancelled.cancel().unwrap(), cancelled);
        assert!(cancelled.mark_received().is_err());
    }

    #[test]
    fn priorities_are_ordered() {
        assert!(PurchasePriority::Urgent > PurchasePriority::High);
        assert!(PurchasePriority::Low < PurchasePriority::Normal);
    }
}
