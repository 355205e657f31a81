use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use kardex_core::{
    AggregateId, AggregateRoot, BudgetLineId, DomainError, DomainResult, Entity, EntityId,
    ProjectId, ResourceRef, UnitOfMeasure, UserId, ensure_positive,
};

/// Requisition identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequisitionId(pub AggregateId);

impl RequisitionId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for RequisitionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Requisition line identifier (unique within the owning requisition).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequisitionLineId(pub EntityId);

impl RequisitionLineId {
    pub fn new(id: EntityId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for RequisitionLineId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Requisition workflow state.
///
/// `Closed` and `Rejected` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequisitionStatus {
    Draft,
    Submitted,
    Approved,
    PartiallyDispatched,
    FullyDispatched,
    Closed,
    Rejected,
    PendingPurchase,
}

impl RequisitionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequisitionStatus::Draft => "DRAFT",
            RequisitionStatus::Submitted => "SUBMITTED",
            RequisitionStatus::Approved => "APPROVED",
            RequisitionStatus::PartiallyDispatched => "PARTIALLY_DISPATCHED",
            RequisitionStatus::FullyDispatched => "FULLY_DISPATCHED",
            RequisitionStatus::Closed => "CLOSED",
            RequisitionStatus::Rejected => "REJECTED",
            RequisitionStatus::PendingPurchase => "PENDING_PURCHASE",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RequisitionStatus::Closed | RequisitionStatus::Rejected)
    }

    /// States from which stock may be issued against the requisition.
    pub fn is_dispatchable(self) -> bool {
        matches!(
            self,
            RequisitionStatus::Approved
                | RequisitionStatus::PartiallyDispatched
                | RequisitionStatus::PendingPurchase
        )
    }

    /// States from which a shortfall escalates to purchasing.
    pub fn can_escalate(self) -> bool {
        matches!(
            self,
            RequisitionStatus::Approved | RequisitionStatus::PartiallyDispatched
        )
    }
}

impl core::fmt::Display for RequisitionStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested resource. `solicited` never changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionLine {
    id: RequisitionLineId,
    resource: ResourceRef,
    unit: UnitOfMeasure,
    budget_line_id: Option<BudgetLineId>,
    solicited: Decimal,
    dispatched: Decimal,
    justification: Option<String>,
}

impl RequisitionLine {
    pub fn id_typed(&self) -> RequisitionLineId {
        self.id
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.resource
    }

    pub fn unit(&self) -> &UnitOfMeasure {
        &self.unit
    }

    pub fn budget_line_id(&self) -> Option<BudgetLineId> {
        self.budget_line_id
    }

    pub fn solicited(&self) -> Decimal {
        self.solicited
    }

    pub fn dispatched(&self) -> Decimal {
        self.dispatched
    }

    pub fn justification(&self) -> Option<&str> {
        self.justification.as_deref()
    }

    pub fn remaining(&self) -> Decimal {
        self.solicited - self.dispatched
    }

    pub fn is_fully_dispatched(&self) -> bool {
        self.dispatched >= self.solicited
    }

    fn from_new(new: NewRequisitionLine) -> DomainResult<Self> {
        ensure_positive("solicited quantity", new.solicited)?;
        Ok(Self {
            id: new.id,
            resource: new.resource,
            unit: new.unit,
            budget_line_id: new.budget_line_id,
            solicited: new.solicited,
            dispatched: Decimal::ZERO,
            justification: new
                .justification
                .map(|j| j.trim().to_string())
                .filter(|j| !j.is_empty()),
        })
    }
}

impl Entity for RequisitionLine {
    type Id = RequisitionLineId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Input for one line of a new requisition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequisitionLine {
    pub id: RequisitionLineId,
    pub resource: ResourceRef,
    pub unit: UnitOfMeasure,
    pub budget_line_id: Option<BudgetLineId>,
    pub solicited: Decimal,
    pub justification: Option<String>,
}

/// Input for [`Requisition::create`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRequisition {
    pub id: RequisitionId,
    pub project_id: ProjectId,
    pub requester: String,
    pub work_front: Option<String>,
    pub notes: Option<String>,
    pub lines: Vec<NewRequisitionLine>,
    pub requested_at: DateTime<Utc>,
}

/// Persisted shape of a requisition with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionSnapshot {
    pub id: RequisitionId,
    pub project_id: ProjectId,
    pub requester: String,
    pub work_front: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub approver: Option<UserId>,
    pub status: RequisitionStatus,
    pub notes: Option<String>,
    pub lines: Vec<RequisitionLine>,
    pub version: u64,
}

/// Aggregate root: Requisition.
///
/// Immutable value: every transition returns the next state. `version` is the
/// persisted revision this value was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requisition {
    id: RequisitionId,
    project_id: ProjectId,
    requester: String,
    work_front: Option<String>,
    requested_at: DateTime<Utc>,
    approver: Option<UserId>,
    status: RequisitionStatus,
    notes: Option<String>,
    lines: Vec<RequisitionLine>,
    version: u64,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Requisition {
    /// Open a new requisition in `Draft`.
    pub fn create(new: NewRequisition) -> DomainResult<Self> {
        let requester = new.requester.trim();
        if requester.is_empty() {
            return Err(DomainError::validation("requester cannot be blank"));
        }
        if new.lines.is_empty() {
            return Err(DomainError::validation(
                "a requisition needs at least one line",
            ));
        }
        let lines = new
            .lines
            .into_iter()
            .map(RequisitionLine::from_new)
            .collect::<DomainResult<Vec<_>>>()?;
        ensure_unique_lines(&lines)?;

        Ok(Self {
            id: new.id,
            project_id: new.project_id,
            requester: requester.to_string(),
            work_front: trimmed(new.work_front),
            requested_at: new.requested_at,
            approver: None,
            status: RequisitionStatus::Draft,
            notes: trimmed(new.notes),
            lines,
            version: 0,
        })
    }

    pub fn restore(snapshot: RequisitionSnapshot) -> DomainResult<Self> {
        if snapshot.lines.is_empty() {
            return Err(DomainError::invariant(format!(
                "stored requisition {} has no lines",
                snapshot.id
            )));
        }
        if let Some(line) = snapshot
            .lines
            .iter()
            .find(|l| l.dispatched < Decimal::ZERO || l.dispatched > l.solicited)
        {
            return Err(DomainError::invariant(format!(
                "stored line {} dispatched {} of {}",
                line.id, line.dispatched, line.solicited
            )));
        }
        ensure_unique_lines(&snapshot.lines)?;
        Ok(Self {
            id: snapshot.id,
            project_id: snapshot.project_id,
            requester: snapshot.requester,
            work_front: snapshot.work_front,
            requested_at: snapshot.requested_at,
            approver: snapshot.approver,
            status: snapshot.status,
            notes: snapshot.notes,
            lines: snapshot.lines,
            version: snapshot.version,
        })
    }

    pub fn snapshot(&self) -> RequisitionSnapshot {
        RequisitionSnapshot {
            id: self.id,
            project_id: self.project_id,
            requester: self.requester.clone(),
            work_front: self.work_front.clone(),
            requested_at: self.requested_at,
            approver: self.approver,
            status: self.status,
            notes: self.notes.clone(),
            lines: self.lines.clone(),
            version: self.version,
        }
    }

    pub fn id_typed(&self) -> RequisitionId {
        self.id
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn requester(&self) -> &str {
        &self.requester
    }

    pub fn work_front(&self) -> Option<&str> {
        self.work_front.as_deref()
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.requested_at
    }

    pub fn approver(&self) -> Option<UserId> {
        self.approver
    }

    pub fn status(&self) -> RequisitionStatus {
        self.status
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn lines(&self) -> &[RequisitionLine] {
        &self.lines
    }

    pub fn line(&self, line_id: RequisitionLineId) -> Option<&RequisitionLine> {
        self.lines.iter().find(|l| l.id == line_id)
    }

    pub fn is_dispatchable(&self) -> bool {
        self.status.is_dispatchable()
    }

    /// Lines with quantity still to dispatch.
    pub fn open_lines(&self) -> impl Iterator<Item = &RequisitionLine> {
        self.lines.iter().filter(|l| !l.is_fully_dispatched())
    }

    pub fn add_line(&self, line: NewRequisitionLine) -> DomainResult<Self> {
        self.require(&[RequisitionStatus::Draft], "add a line")?;
        let mut lines = self.lines.clone();
        lines.push(RequisitionLine::from_new(line)?);
        ensure_unique_lines(&lines)?;
        Ok(Self {
            lines,
            ..self.clone()
        })
    }

    pub fn submit(&self) -> DomainResult<Self> {
        self.require(&[RequisitionStatus::Draft], "submit")?;
        Ok(self.with_status(RequisitionStatus::Submitted))
    }

    /// Approve on behalf of `approver`, who must be the project's `assigned` approver.
    pub fn approve(&self, approver: UserId, assigned: Option<UserId>) -> DomainResult<Self> {
        self.require(&[RequisitionStatus::Submitted], "approve")?;
        match assigned {
            None => {
                return Err(DomainError::unauthorized(format!(
                    "project {} has no assigned approver",
                    self.project_id
                )));
            }
            Some(assigned) if assigned != approver => {
                return Err(DomainError::unauthorized(format!(
                    "user {approver} is not the assigned approver of project {}",
                    self.project_id
                )));
            }
            Some(_) => {}
        }
        Ok(Self {
            approver: Some(approver),
            status: RequisitionStatus::Approved,
            ..self.clone()
        })
    }

    pub fn reject(&self) -> DomainResult<Self> {
        self.require(&[RequisitionStatus::Submitted], "reject")?;
        Ok(self.with_status(RequisitionStatus::Rejected))
    }

    pub fn mark_pending_purchase(&self) -> DomainResult<Self> {
        self.require(
            &[
                RequisitionStatus::Approved,
                RequisitionStatus::PartiallyDispatched,
            ],
            "mark pending purchase",
        )?;
        Ok(self.with_status(RequisitionStatus::PendingPurchase))
    }

    pub fn reactivate(&self) -> DomainResult<Self> {
        self.require(&[RequisitionStatus::PendingPurchase], "reactivate")?;
        Ok(self.with_status(RequisitionStatus::Approved))
    }

    pub fn close(&self) -> DomainResult<Self> {
        self.require(&[RequisitionStatus::FullyDispatched], "close")?;
        Ok(self.with_status(RequisitionStatus::Closed))
    }

    /// Add `quantity` to a line's dispatched total and recompute the state.
    pub fn record_dispatch(
        &self,
        line_id: RequisitionLineId,
        quantity: Decimal,
    ) -> DomainResult<Self> {
        if !self.status.is_dispatchable() {
            return Err(DomainError::invalid_transition(self.status, "record dispatch"));
        }
        ensure_positive("dispatch quantity", quantity)?;

        let index = self
            .lines
            .iter()
            .position(|l| l.id == line_id)
            .ok_or_else(|| DomainError::not_found(format!("requisition line {line_id}")))?;

        let line = &self.lines[index];
        if quantity > line.remaining() {
            return Err(DomainError::validation(format!(
                "dispatch of {quantity} exceeds remaining {} on line {line_id}",
                line.remaining()
            )));
        }

        let mut lines = self.lines.clone();
        lines[index].dispatched += quantity;

        let status = if lines.iter().all(RequisitionLine::is_fully_dispatched) {
            RequisitionStatus::FullyDispatched
        } else if lines.iter().any(|l| l.dispatched > Decimal::ZERO) {
            RequisitionStatus::PartiallyDispatched
        } else {
            self.status
        };

        Ok(Self {
            lines,
            status,
            ..self.clone()
        })
    }

    /// Adopt the revision written by the store.
    pub fn mark_persisted(self, version: u64) -> Self {
        Self { version, ..self }
    }

    fn require(&self, allowed: &[RequisitionStatus], action: &'static str) -> DomainResult<()> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(DomainError::invalid_transition(self.status, action))
        }
    }

    fn with_status(&self, status: RequisitionStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

fn ensure_unique_lines(lines: &[RequisitionLine]) -> DomainResult<()> {
    for (i, line) in lines.iter().enumerate() {
        if lines[..i].iter().any(|other| other.id == line.id) {
            return Err(DomainError::validation(format!(
                "duplicate requisition line {}",
                line.id
            )));
        }
    }
    Ok(())
}

impl AggregateRoot for Requisition {
    type Id = RequisitionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn line(solicited: Decimal) -> NewRequisitionLine {
        NewRequisitionLine {
            id: RequisitionLineId::new(EntityId::new()),
            resource: ResourceRef::new("MAT-001").unwrap(),
            unit: UnitOfMeasure::new("BAG").unwrap(),
            budget_line_id: None,
            solicited,
            justification: Some("ground floor slab".to_string()),
        }
    }

    fn draft_with(lines: Vec<NewRequisitionLine>) -> Requisition {
        Requisition::create(NewRequisition {
            id: RequisitionId::new(AggregateId::new()),
            project_id: ProjectId::new(),
            requester: "site foreman".to_string(),
            work_front: Some("Block A".to_string()),
            notes: None,
            lines,
            requested_at: Utc::now(),
        })
        .unwrap()
    }

    fn approved_with(lines: Vec<NewRequisitionLine>) -> Requisition {
        let approver = UserId::new();
        draft_with(lines)
            .submit()
            .unwrap()
            .approve(approver, Some(approver))
            .unwrap()
    }

    #[test]
    fn create_requires_requester_and_lines() {
        let base = NewRequisition {
            id: RequisitionId::new(AggregateId::new()),
            project_id: ProjectId::new(),
            requester: "   ".to_string(),
            work_front: None,
            notes: None,
            lines: vec![line(dec!(1))],
            requested_at: Utc::now(),
        };
        assert!(matches!(
            Requisition::create(base.clone()),
            Err(DomainError::Validation(_))
        ));

        let no_lines = NewRequisition {
            requester: "foreman".to_string(),
            lines: vec![],
            ..base.clone()
        };
        assert!(Requisition::create(no_lines).is_err());

        let zero_line = NewRequisition {
            requester: "foreman".to_string(),
            lines: vec![line(Decimal::ZERO)],
            ..base
        };
        assert!(Requisition::create(zero_line).is_err());
    }

    #[test]
    fn add_line_only_in_draft() {
        let draft = draft_with(vec![line(dec!(1))]);
        let draft = draft.add_line(line(dec!(2))).unwrap();
        assert_eq!(draft.lines().len(), 2);

        let submitted = draft.submit().unwrap();
        let err = submitted.add_line(line(dec!(3))).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
    }

    #[test]
    fn approval_requires_the_assigned_approver() {
        let submitted = draft_with(vec![line(dec!(1))]).submit().unwrap();
        let approver = UserId::new();

        match submitted.approve(approver, None).unwrap_err() {
            DomainError::Unauthorized(msg) if msg.contains("no assigned approver") => {}
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            submitted.approve(approver, Some(UserId::new())),
            Err(DomainError::Unauthorized(_))
        ));

        let approved = submitted.approve(approver, Some(approver)).unwrap();
        assert_eq!(approved.status(), RequisitionStatus::Approved);
        assert_eq!(approved.approver(), Some(approver));
    }

    #[test]
    fn approve_from_draft_is_an_invalid_transition() {
        let approver = UserId::new();
        let err = draft_with(vec![line(dec!(1))])
            .approve(approver, Some(approver))
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidStateTransition {
                from: "DRAFT".to_string(),
                action: "approve"
            }
        );
    }

    #[test]
    fn partial_then_full_dispatch() {
        let first = line(dec!(100));
        let second = line(dec!(10));
        let (a, b) = (first.id, second.id);
        let req = approved_with(vec![first, second]);

        let req = req.record_dispatch(a, dec!(60)).unwrap();
        assert_eq!(req.status(), RequisitionStatus::PartiallyDispatched);
        assert_eq!(req.line(a).unwrap().remaining(), dec!(40));

        let req = req.record_dispatch(a, dec!(40)).unwrap();
        assert_eq!(req.status(), RequisitionStatus::PartiallyDispatched);

        let req = req.record_dispatch(b, dec!(10)).unwrap();
        assert_eq!(req.status(), RequisitionStatus::FullyDispatched);

        let closed = req.close().unwrap();
        assert_eq!(closed.status(), RequisitionStatus::Closed);
        assert!(closed.status().is_terminal());
    }

    #[test]
    fn record_dispatch_rejects_over_dispatch_and_unknown_lines() {
        let l = line(dec!(5));
        let id = l.id;
        let req = approved_with(vec![l]);

        assert!(matches!(
            req.record_dispatch(id, dec!(6)),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            req.record_dispatch(id, Decimal::ZERO),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            req.record_dispatch(RequisitionLineId::new(EntityId::new()), dec!(1)),
            Err(DomainError::NotFound(_))
        ));
    }

    #[test]
    fn pending_purchase_round_trip() {
        let l = line(dec!(5));
        let id = l.id;
        let req = approved_with(vec![l]).mark_pending_purchase().unwrap();
        assert!(req.is_dispatchable());
        assert!(req.mark_pending_purchase().is_err());

        // dispatching straight out of pending purchase is allowed
        let partly = req.record_dispatch(id, dec!(2)).unwrap();
        assert_eq!(partly.status(), RequisitionStatus::PartiallyDispatched);

        let reactivated = req.reactivate().unwrap();
        assert_eq!(reactivated.status(), RequisitionStatus::Approved);
    }

    #[test]
    fn terminal_states_reject_everything() {
        let rejected = draft_with(vec![line(dec!(1))]).submit().unwrap().reject().unwrap();
        assert!(rejected.submit().is_err());
        assert!(rejected.reactivate().is_err());
        assert!(rejected.close().is_err());
        assert!(!rejected.is_dispatchable());
    }

    #[test]
    fn restore_rejects_over_dispatched_lines() {
        let mut snap = approved_with(vec![line(dec!(2))]).snapshot();
        snap.lines[0].dispatched = dec!(3);
        assert!(matches!(
            Requisition::restore(snap),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: dispatched quantities only grow and never pass solicited.
        #[test]
        fn dispatched_is_monotonic_and_bounded(
            solicited in 1u32..200,
            attempts in prop::collection::vec(1u32..80, 1..20)
        ) {
            let l = line(Decimal::from(solicited));
            let id = l.id;
            let mut req = approved_with(vec![l]);
            let mut last = Decimal::ZERO;

            for qty in attempts {
                if let Ok(next) = req.record_dispatch(id, Decimal::from(qty)) {
                    req = next;
                }
                let line = req.line(id).unwrap();
                prop_assert!(line.dispatched() >= last);
                prop_assert!(line.dispatched() <= line.solicited());
                last = line.dispatched();
            }
        }
    }
}
