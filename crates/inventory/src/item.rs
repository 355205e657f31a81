use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use kardex_core::{
    AggregateId, AggregateRoot, BudgetLineId, DomainError, DomainResult, ProjectId,
    PurchaseDetailId, ResourceRef, TransferId, UnitOfMeasure, WarehouseId, ensure_positive,
};
use kardex_requisition::{RequisitionId, RequisitionLineId};

use crate::ledger::weighted_average;
use crate::movement::{
    Direction, InventoryMovement, MovementCorrelation, MovementDraft, MovementKind,
};
use crate::policy::LedgerPolicy;

/// Inventory item identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryItemId(pub AggregateId);

impl InventoryItemId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InventoryItemId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Natural key of a stock head. Exactly one item exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub project_id: ProjectId,
    pub resource: ResourceRef,
    pub unit: UnitOfMeasure,
    pub warehouse_id: WarehouseId,
}

impl StockKey {
    pub fn new(
        project_id: ProjectId,
        resource: ResourceRef,
        unit: UnitOfMeasure,
        warehouse_id: WarehouseId,
    ) -> Self {
        Self {
            project_id,
            resource,
            unit,
            warehouse_id,
        }
    }

    /// Same project/resource/unit held in another warehouse.
    pub fn in_warehouse(&self, warehouse_id: WarehouseId) -> Self {
        Self {
            warehouse_id,
            ..self.clone()
        }
    }
}

/// Display metadata copied from the catalog when the head is opened (reporting only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemProfile {
    pub name: String,
    pub classification: String,
}

impl ItemProfile {
    pub fn new(name: impl AsRef<str>, classification: impl AsRef<str>) -> DomainResult<Self> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return Err(DomainError::validation("item name cannot be blank"));
        }
        Ok(Self {
            name: name.to_string(),
            classification: classification.as_ref().trim().to_string(),
        })
    }
}

/// Aggregate root: InventoryItem (stock head).
///
/// Operations never mutate in place; each returns the next head value together
/// with the movement it appended. Movements accumulate in `pending` until the
/// store commits them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItem {
    id: InventoryItemId,
    key: StockKey,
    profile: ItemProfile,
    quantity: Decimal,
    average_cost: Decimal,
    updated_at: DateTime<Utc>,
    version: u64,
    pending: Vec<InventoryMovement>,
}

/// Input for opening a new, empty stock head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInventoryItem {
    pub id: InventoryItemId,
    pub key: StockKey,
    pub profile: ItemProfile,
    pub opened_at: DateTime<Utc>,
}

/// Persisted shape of a stock head (`inventory_item` row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub id: InventoryItemId,
    pub key: StockKey,
    pub profile: ItemProfile,
    pub quantity: Decimal,
    pub average_cost: Decimal,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

/// Result of a ledger operation: next head + the movement it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryTransaction {
    pub item: InventoryItem,
    pub movement: InventoryMovement,
}

/// Command: ReceiveStock (receipt by purchase).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveStock {
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub purchase_detail_id: Option<PurchaseDetailId>,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Requisition links stamped on an issue movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchCorrelation {
    pub requisition_id: RequisitionId,
    pub requisition_line_id: RequisitionLineId,
    pub budget_line_id: Option<BudgetLineId>,
}

/// Command: IssueStock (issue by consumption).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueStock {
    pub quantity: Decimal,
    pub dispatch: Option<DispatchCorrelation>,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustStock (physical-count correction).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub new_quantity: Decimal,
    pub justification: String,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Whether stock moves between warehouses for good or on loan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferMode {
    Transfer,
    Loan,
}

/// Command: TransferOut (outbound leg of a transfer or loan).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOut {
    pub mode: TransferMode,
    pub transfer_id: TransferId,
    pub quantity: Decimal,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: TransferIn (inbound leg; valued at the source's average cost).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferIn {
    pub mode: TransferMode,
    pub transfer_id: TransferId,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub reference: String,
    pub occurred_at: DateTime<Utc>,
}

impl InventoryItem {
    /// Open an empty stock head (quantity 0, never persisted).
    pub fn open(new: NewInventoryItem) -> Self {
        Self {
            id: new.id,
            key: new.key,
            profile: new.profile,
            quantity: Decimal::ZERO,
            average_cost: Decimal::ZERO,
            updated_at: new.opened_at,
            version: 0,
            pending: Vec::new(),
        }
    }

    /// Rebuild a head from its persisted row.
    pub fn restore(snapshot: ItemSnapshot) -> DomainResult<Self> {
        if snapshot.quantity < Decimal::ZERO {
            return Err(DomainError::invariant(format!(
                "stored quantity for item {} is negative",
                snapshot.id
            )));
        }
        if snapshot.average_cost < Decimal::ZERO {
            return Err(DomainError::invariant(format!(
                "stored average cost for item {} is negative",
                snapshot.id
            )));
        }
        Ok(Self {
            id: snapshot.id,
            key: snapshot.key,
            profile: snapshot.profile,
            quantity: snapshot.quantity,
            average_cost: snapshot.average_cost,
            updated_at: snapshot.updated_at,
            version: snapshot.version,
            pending: Vec::new(),
        })
    }

    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            id: self.id,
            key: self.key.clone(),
            profile: self.profile.clone(),
            quantity: self.quantity,
            average_cost: self.average_cost,
            updated_at: self.updated_at,
            version: self.version,
        }
    }

    pub fn id_typed(&self) -> InventoryItemId {
        self.id
    }

    pub fn key(&self) -> &StockKey {
        &self.key
    }

    pub fn project_id(&self) -> ProjectId {
        self.key.project_id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.key.warehouse_id
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.key.resource
    }

    pub fn unit(&self) -> &UnitOfMeasure {
        &self.key.unit
    }

    pub fn profile(&self) -> &ItemProfile {
        &self.profile
    }

    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Weighted-average unit cost. Meaningless while quantity is zero.
    pub fn average_cost(&self) -> Decimal {
        self.average_cost
    }

    pub fn stock_value(&self) -> Decimal {
        self.quantity * self.average_cost
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Movements produced since the last commit.
    pub fn pending_movements(&self) -> &[InventoryMovement] {
        &self.pending
    }

    pub fn has_stock(&self, quantity: Decimal) -> bool {
        quantity > Decimal::ZERO && self.quantity >= quantity
    }

    /// Called by the store after a successful write: adopt the new version and
    /// drop the movement buffer (those entries now live in the ledger).
    pub fn mark_persisted(self, version: u64) -> Self {
        Self {
            version,
            pending: Vec::new(),
            ..self
        }
    }

    pub fn receive(
        &self,
        cmd: &ReceiveStock,
        policy: &LedgerPolicy,
    ) -> DomainResult<InventoryTransaction> {
        let correlation = MovementCorrelation {
            purchase_detail_id: cmd.purchase_detail_id,
            ..MovementCorrelation::default()
        };
        self.apply_inbound(
            MovementKind::ReceiptByPurchase,
            cmd.quantity,
            cmd.unit_cost,
            correlation,
            &cmd.reference,
            cmd.occurred_at,
            policy,
        )
    }

    pub fn issue(&self, cmd: &IssueStock) -> DomainResult<InventoryTransaction> {
        let correlation = match cmd.dispatch {
            Some(d) => MovementCorrelation {
                requisition_id: Some(d.requisition_id),
                requisition_line_id: Some(d.requisition_line_id),
                budget_line_id: d.budget_line_id,
                ..MovementCorrelation::default()
            },
            None => MovementCorrelation::default(),
        };
        self.apply_outbound(
            MovementKind::IssueByConsumption,
            cmd.quantity,
            correlation,
            &cmd.reference,
            cmd.occurred_at,
        )
    }

    pub fn adjust(
        &self,
        cmd: &AdjustStock,
        policy: &LedgerPolicy,
    ) -> DomainResult<InventoryTransaction> {
        let justification = cmd.justification.trim();
        if justification.chars().count() < policy.min_justification_len {
            return Err(DomainError::validation(format!(
                "adjustment justification must be at least {} characters",
                policy.min_justification_len
            )));
        }
        if cmd.new_quantity < Decimal::ZERO {
            return Err(DomainError::validation("adjusted quantity cannot be negative"));
        }
        let delta = cmd.new_quantity - self.quantity;
        if delta.is_zero() {
            return Err(DomainError::validation(
                "adjustment does not change the quantity on hand",
            ));
        }
        let direction = if delta > Decimal::ZERO {
            Direction::Inbound
        } else {
            Direction::Outbound
        };

        let movement = InventoryMovement::record(MovementDraft {
            item_id: self.id,
            kind: MovementKind::Adjustment,
            direction,
            quantity: delta.abs(),
            unit_cost: self.average_cost,
            correlation: MovementCorrelation::default(),
            reference: cmd.reference.clone(),
            justification: Some(justification.to_string()),
            recorded_at: cmd.occurred_at,
        })?;

        Ok(self.evolve(cmd.new_quantity, self.average_cost, movement, cmd.occurred_at))
    }

    pub fn transfer_out(&self, cmd: &TransferOut) -> DomainResult<InventoryTransaction> {
        let kind = match cmd.mode {
            TransferMode::Transfer => MovementKind::TransferOut,
            TransferMode::Loan => MovementKind::LoanOut,
        };
        let correlation = MovementCorrelation {
            transfer_id: Some(cmd.transfer_id),
            ..MovementCorrelation::default()
        };
        self.apply_outbound(kind, cmd.quantity, correlation, &cmd.reference, cmd.occurred_at)
    }

    pub fn transfer_in(
        &self,
        cmd: &TransferIn,
        policy: &LedgerPolicy,
    ) -> DomainResult<InventoryTransaction> {
        let kind = match cmd.mode {
            TransferMode::Transfer => MovementKind::TransferIn,
            TransferMode::Loan => MovementKind::LoanIn,
        };
        let correlation = MovementCorrelation {
            transfer_id: Some(cmd.transfer_id),
            ..MovementCorrelation::default()
        };
        self.apply_inbound(
            kind,
            cmd.quantity,
            cmd.unit_cost,
            correlation,
            &cmd.reference,
            cmd.occurred_at,
            policy,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_inbound(
        &self,
        kind: MovementKind,
        quantity: Decimal,
        unit_cost: Decimal,
        correlation: MovementCorrelation,
        reference: &str,
        at: DateTime<Utc>,
        policy: &LedgerPolicy,
    ) -> DomainResult<InventoryTransaction> {
        ensure_positive("inbound quantity", quantity)?;
        if unit_cost < Decimal::ZERO {
            return Err(DomainError::validation("unit cost cannot be negative"));
        }

        let average_cost = weighted_average(
            self.quantity,
            self.average_cost,
            quantity,
            unit_cost,
            policy.cost_scale,
        )?;
        let new_quantity = self
            .quantity
            .checked_add(quantity)
            .ok_or_else(|| DomainError::validation("quantity on hand overflows"))?;

        let movement = InventoryMovement::record(MovementDraft {
            item_id: self.id,
            kind,
            direction: Direction::Inbound,
            quantity,
            unit_cost,
            correlation,
            reference: reference.to_string(),
            justification: None,
            recorded_at: at,
        })?;

        Ok(self.evolve(new_quantity, average_cost, movement, at))
    }

    fn apply_outbound(
        &self,
        kind: MovementKind,
        quantity: Decimal,
        correlation: MovementCorrelation,
        reference: &str,
        at: DateTime<Utc>,
    ) -> DomainResult<InventoryTransaction> {
        ensure_positive("outbound quantity", quantity)?;
        if self.quantity < quantity {
            return Err(DomainError::insufficient_stock(self.quantity, quantity));
        }

        let movement = InventoryMovement::record(MovementDraft {
            item_id: self.id,
            kind,
            direction: Direction::Outbound,
            quantity,
            unit_cost: self.average_cost,
            correlation,
            reference: reference.to_string(),
            justification: None,
            recorded_at: at,
        })?;

        Ok(self.evolve(self.quantity - quantity, self.average_cost, movement, at))
    }

    fn evolve(
        &self,
        quantity: Decimal,
        average_cost: Decimal,
        movement: InventoryMovement,
        at: DateTime<Utc>,
    ) -> InventoryTransaction {
        let mut pending = self.pending.clone();
        pending.push(movement.clone());
        let item = Self {
            id: self.id,
            key: self.key.clone(),
            profile: self.profile.clone(),
            quantity,
            average_cost,
            updated_at: at,
            version: self.version,
            pending,
        };
        InventoryTransaction { item, movement }
    }
}

impl AggregateRoot for InventoryItem {
    type Id = InventoryItemId;

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
    use kardex_core::EntityId;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn test_item() -> InventoryItem {
        InventoryItem::open(NewInventoryItem {
            id: InventoryItemId::new(AggregateId::new()),
            key: StockKey::new(
                ProjectId::new(),
                ResourceRef::new("MAT-001").unwrap(),
                UnitOfMeasure::new("BAG").unwrap(),
                WarehouseId::new(),
            ),
            profile: ItemProfile::new("Portland cement 42.5kg", "MATERIAL").unwrap(),
            opened_at: Utc::now(),
        })
    }

    fn receipt(quantity: Decimal, unit_cost: Decimal) -> ReceiveStock {
        ReceiveStock {
            quantity,
            unit_cost,
            purchase_detail_id: Some(PurchaseDetailId::new()),
            reference: "GRN-001".to_string(),
            occurred_at: Utc::now(),
        }
    }

    fn issue(quantity: Decimal) -> IssueStock {
        IssueStock {
            quantity,
            dispatch: None,
            reference: "site consumption".to_string(),
            occurred_at: Utc::now(),
        }
    }

    fn adjustment(new_quantity: Decimal, justification: &str) -> AdjustStock {
        AdjustStock {
            new_quantity,
            justification: justification.to_string(),
            reference: "cycle count".to_string(),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn receipts_and_issue_follow_moving_average() {
        let policy = LedgerPolicy::default();
        let item = test_item();

        let tx = item.receive(&receipt(dec!(100), dec!(10.00)), &policy).unwrap();
        assert_eq!(tx.item.quantity(), dec!(100));
        assert_eq!(tx.item.average_cost(), dec!(10.00));

        let tx = tx.item.receive(&receipt(dec!(50), dec!(20.00)), &policy).unwrap();
        assert_eq!(tx.item.quantity(), dec!(150));
        assert_eq!(tx.item.average_cost(), dec!(13.33));

        let tx = tx.item.issue(&issue(dec!(10))).unwrap();
        assert_eq!(tx.item.quantity(), dec!(140));
        assert_eq!(tx.item.average_cost(), dec!(13.33));
        assert_eq!(tx.movement.kind(), MovementKind::IssueByConsumption);
        assert_eq!(tx.movement.unit_cost(), dec!(13.33));
        assert_eq!(tx.movement.total_cost(), dec!(133.30));
        assert_eq!(tx.item.pending_movements().len(), 3);
    }

    #[test]
    fn operations_leave_the_original_value_untouched() {
        let item = test_item();
        let tx = item
            .receive(&receipt(dec!(5), dec!(1)), &LedgerPolicy::default())
            .unwrap();
        assert_eq!(item.quantity(), Decimal::ZERO);
        assert!(item.pending_movements().is_empty());
        assert_eq!(tx.item.quantity(), dec!(5));
    }

    #[test]
    fn issue_beyond_on_hand_is_insufficient_stock() {
        let item = test_item()
            .receive(&receipt(dec!(3), dec!(1)), &LedgerPolicy::default())
            .unwrap()
            .item;
        let err = item.issue(&issue(dec!(4))).unwrap_err();
        assert_eq!(err, DomainError::insufficient_stock(dec!(3), dec!(4)));
    }

    #[test]
    fn receive_rejects_bad_input() {
        let policy = LedgerPolicy::default();
        let item = test_item();
        assert!(matches!(
            item.receive(&receipt(Decimal::ZERO, dec!(1)), &policy),
            Err(DomainError::Validation(_))
        ));
        assert!(matches!(
            item.receive(&receipt(dec!(1), dec!(-0.01)), &policy),
            Err(DomainError::Validation(_))
        ));
        // free-of-charge receipts are allowed
        assert!(item.receive(&receipt(dec!(1), Decimal::ZERO), &policy).is_ok());
    }

    #[test]
    fn dispatch_issue_carries_correlation_ids() {
        let item = test_item()
            .receive(&receipt(dec!(10), dec!(2)), &LedgerPolicy::default())
            .unwrap()
            .item;
        let correlation = DispatchCorrelation {
            requisition_id: RequisitionId::new(AggregateId::new()),
            requisition_line_id: RequisitionLineId::new(EntityId::new()),
            budget_line_id: Some(BudgetLineId::new()),
        };
        let tx = item
            .issue(&IssueStock {
                dispatch: Some(correlation),
                ..issue(dec!(4))
            })
            .unwrap();
        let c = tx.movement.correlation();
        assert_eq!(c.requisition_id, Some(correlation.requisition_id));
        assert_eq!(c.requisition_line_id, Some(correlation.requisition_line_id));
        assert_eq!(c.budget_line_id, correlation.budget_line_id);
    }

    #[test]
    fn adjust_requires_minimum_justification() {
        let policy = LedgerPolicy::default();
        let item = test_item()
            .receive(&receipt(dec!(10), dec!(2)), &policy)
            .unwrap()
            .item;

        let err = item.adjust(&adjustment(dec!(8), "short"), &policy).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let long = "Physical count on level 3 found two bags damaged by rain; written off after supervisor review of the storage area.";
        assert!(long.len() >= 90);
        let tx = item.adjust(&adjustment(dec!(8), &long[..90]), &policy).unwrap();
        assert_eq!(tx.item.quantity(), dec!(8));
        assert_eq!(tx.item.average_cost(), dec!(2));
        assert_eq!(tx.movement.kind(), MovementKind::Adjustment);
        assert_eq!(tx.movement.direction(), Direction::Outbound);
        assert_eq!(tx.movement.quantity(), dec!(2));
        assert_eq!(tx.movement.justification(), Some(long[..90].trim()));
    }

    #[test]
    fn adjust_up_records_inbound_movement() {
        let policy = LedgerPolicy::default();
        let tx = test_item()
            .adjust(
                &adjustment(dec!(12), "Opening balance taken from the site physical count"),
                &policy,
            )
            .unwrap();
        assert_eq!(tx.item.quantity(), dec!(12));
        assert_eq!(tx.movement.direction(), Direction::Inbound);
    }

    #[test]
    fn adjust_rejects_negative_and_no_op_targets() {
        let policy = LedgerPolicy::default();
        let item = test_item();
        let why = "Counted twice by the warehouse keeper and the resident engineer";
        assert!(item.adjust(&adjustment(dec!(-1), why), &policy).is_err());
        assert!(item.adjust(&adjustment(Decimal::ZERO, why), &policy).is_err());
    }

    #[test]
    fn transfer_legs_use_their_own_kinds() {
        let policy = LedgerPolicy::default();
        let source = test_item()
            .receive(&receipt(dec!(10), dec!(4)), &policy)
            .unwrap()
            .item;
        let transfer_id = TransferId::new();

        let out = source
            .transfer_out(&TransferOut {
                mode: TransferMode::Loan,
                transfer_id,
                quantity: dec!(6),
                reference: "loan to tower B".to_string(),
                occurred_at: Utc::now(),
            })
            .unwrap();
        assert_eq!(out.movement.kind(), MovementKind::LoanOut);
        assert_eq!(out.item.quantity(), dec!(4));

        let target = InventoryItem::open(NewInventoryItem {
            id: InventoryItemId::new(AggregateId::new()),
            key: source.key().in_warehouse(WarehouseId::new()),
            profile: source.profile().clone(),
            opened_at: Utc::now(),
        });
        let inbound = target
            .transfer_in(
                &TransferIn {
                    mode: TransferMode::Loan,
                    transfer_id,
                    quantity: dec!(6),
                    unit_cost: out.movement.unit_cost(),
                    reference: "loan from tower A".to_string(),
                    occurred_at: Utc::now(),
                },
                &policy,
            )
            .unwrap();
        assert_eq!(inbound.movement.kind(), MovementKind::LoanIn);
        assert_eq!(inbound.item.average_cost(), dec!(4));
        assert_eq!(
            inbound.movement.correlation().transfer_id,
            Some(transfer_id)
        );
    }

    #[test]
    fn restore_rejects_negative_quantity() {
        let mut snap = test_item().snapshot();
        snap.quantity = dec!(-1);
        assert!(matches!(
            InventoryItem::restore(snap),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn mark_persisted_clears_buffer_and_sets_version() {
        let item = test_item()
            .receive(&receipt(dec!(1), dec!(1)), &LedgerPolicy::default())
            .unwrap()
            .item
            .mark_persisted(1);
        assert_eq!(item.version(), 1);
        assert!(item.pending_movements().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Receive(u32, u32),
        Issue(u32),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u32..500, 0u32..100_000).prop_map(|(q, c)| Op::Receive(q, c)),
            (1u32..500).prop_map(Op::Issue),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: quantity never goes negative, and an issue fails exactly
        /// when it asks for more than is on hand.
        #[test]
        fn quantity_never_negative(ops in prop::collection::vec(op_strategy(), 1..40)) {
            let policy = LedgerPolicy::default();
            let mut item = test_item();
            let mut model = Decimal::ZERO;

            for op in ops {
                match op {
                    Op::Receive(q, c) => {
                        let q = Decimal::from(q);
                        item = item.receive(&receipt(q, Decimal::new(c as i64, 2)), &policy).unwrap().item;
                        model += q;
                    }
                    Op::Issue(q) => {
                        let q = Decimal::from(q);
                        match item.issue(&issue(q)) {
                            Ok(tx) => {
                                prop_assert!(q <= model);
                                let before = item.average_cost();
                                item = tx.item;
                                prop_assert_eq!(item.average_cost(), before);
                                model -= q;
                            }
                            Err(DomainError::InsufficientStock { .. }) => prop_assert!(q > model),
                            Err(other) => prop_assert!(false, "unexpected error {other:?}"),
                        }
                    }
                }
                prop_assert!(item.quantity() >= Decimal::ZERO);
                prop_assert_eq!(item.quantity(), model);
            }
        }

        /// Property: after receipts only, the average equals total value over
        /// total quantity regardless of the order of receipts.
        #[test]
        fn average_is_order_independent(
            receipts in prop::collection::vec((1u32..1_000, 0u32..1_000_000), 1..12)
        ) {
            let policy = LedgerPolicy { cost_scale: 12, ..LedgerPolicy::default() };
            let to_dec = |(q, c): (u32, u32)| (Decimal::from(q), Decimal::new(c as i64, 2));

            let total_qty: Decimal = receipts.iter().map(|r| to_dec(*r).0).sum();
            let total_value: Decimal = receipts.iter().map(|r| { let (q, c) = to_dec(*r); q * c }).sum();
            let expected = total_value / total_qty;

            let run = |order: Vec<(u32, u32)>| {
                let mut item = test_item();
                for r in order {
                    let (q, c) = to_dec(r);
                    item = item.receive(&receipt(q, c), &policy).unwrap().item;
                }
                item.average_cost()
            };

            let forward = run(receipts.clone());
            let mut reversed = receipts.clone();
            reversed.reverse();
            let backward = run(reversed);

            let tolerance = dec!(0.000001);
            prop_assert!((forward - expected).abs() <= tolerance);
            prop_assert!((backward - expected).abs() <= tolerance);
        }
    }
}
