//! Inbound logistics operations.
//!
//! `LogisticsService` is the single entry point used by the outer layers: it
//! loads aggregates, applies one domain operation, commits, and maps every
//! failure into [`LogisticsError`].

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use kardex_core::{
    AggregateId, DomainResult, ProjectId, PurchaseDetailId, ResourceRef, TransferId,
    UnitOfMeasure, UserId, WarehouseId,
};
use kardex_inventory::{
    AdjustStock, InventoryItem, InventoryItemId, InventoryMovement, InventoryTransaction,
    ItemProfile, LedgerDrift, NewInventoryItem, ReceiveStock, StockKey, TransferIn, TransferMode,
    TransferOut, verify,
};
use kardex_requisition::{
    NewRequisition, NewRequisitionLine, Requisition, RequisitionId, RequisitionStatus,
};

use crate::config::LogisticsConfig;
use crate::dispatch::{DispatchIntent, DispatchOrchestrator, DispatchOutcome};
use crate::error::LogisticsError;
use crate::ports::Collaborators;
use crate::retry::with_conflict_retry;
use crate::store::{CommitReceipt, LogisticsStore, UnitOfWork};

const DEFAULT_ADJUSTMENT_REFERENCE: &str = "Physical count adjustment";

/// Goods received into a warehouse (purchase receipt).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveInventory {
    pub project_id: ProjectId,
    pub resource: ResourceRef,
    pub unit: UnitOfMeasure,
    pub warehouse_id: WarehouseId,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub reference: String,
    pub purchase_detail_id: Option<PurchaseDetailId>,
    /// Display metadata for a head opened by this receipt; defaults to the resource code.
    pub profile: Option<ItemProfile>,
}

/// Move stock from one head into the same resource in another warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStock {
    pub source_item_id: InventoryItemId,
    pub target_warehouse_id: WarehouseId,
    pub quantity: Decimal,
    pub mode: TransferMode,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub transfer_id: TransferId,
    pub source_item_id: InventoryItemId,
    pub target_item_id: InventoryItemId,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
}

#[derive(Debug)]
pub struct LogisticsService<S> {
    dispatcher: DispatchOrchestrator<S>,
    ports: Collaborators,
    config: LogisticsConfig,
}

impl<S> LogisticsService<S>
where
    S: LogisticsStore,
{
    pub fn new(store: S, ports: Collaborators, config: LogisticsConfig) -> Self {
        Self {
            dispatcher: DispatchOrchestrator::new(store, ports.clone(), config.ledger),
            ports,
            config,
        }
    }

    pub fn config(&self) -> &LogisticsConfig {
        &self.config
    }

    fn store(&self) -> &S {
        self.dispatcher.store()
    }

    pub fn requisition(&self, id: RequisitionId) -> Result<Requisition, LogisticsError> {
        self.store()
            .load_requisition(id)?
            .ok_or_else(|| LogisticsError::NotFound(format!("requisition {id}")))
    }

    pub fn item(&self, id: InventoryItemId) -> Result<InventoryItem, LogisticsError> {
        self.store()
            .load_item(id)?
            .ok_or_else(|| LogisticsError::NotFound(format!("inventory item {id}")))
    }

    pub fn movements(&self, id: InventoryItemId) -> Result<Vec<InventoryMovement>, LogisticsError> {
        Ok(self.store().movements(id)?)
    }

    // --- requisitions -----------------------------------------------------

    pub fn create_requisition(&self, new: NewRequisition) -> Result<Requisition, LogisticsError> {
        let requisition = Requisition::create(new)?;
        let id = requisition.id_typed();
        let receipt = self
            .store()
            .commit(UnitOfWork::new().with_requisition(requisition))?;
        info!(requisition_id = %id, "requisition created");
        saved_requisition(&receipt, id)
    }

    pub fn add_requisition_line(
        &self,
        id: RequisitionId,
        line: NewRequisitionLine,
    ) -> Result<Requisition, LogisticsError> {
        self.transition(id, "add_line", |r| r.add_line(line.clone()))
    }

    pub fn submit_requisition(&self, id: RequisitionId) -> Result<Requisition, LogisticsError> {
        self.transition(id, "submit", Requisition::submit)
    }

    /// Approve as `approver`, who must be the project's assigned approver.
    pub fn approve_requisition(
        &self,
        id: RequisitionId,
        approver: UserId,
    ) -> Result<Requisition, LogisticsError> {
        let requisition = self.requisition(id)?;
        let assigned = self
            .ports
            .approvers
            .assigned_approver(requisition.project_id())?;
        self.transition(id, "approve", |r| r.approve(approver, assigned))
    }

    pub fn reject_requisition(&self, id: RequisitionId) -> Result<Requisition, LogisticsError> {
        self.transition(id, "reject", Requisition::reject)
    }

    pub fn close_requisition(&self, id: RequisitionId) -> Result<Requisition, LogisticsError> {
        self.transition(id, "close", Requisition::close)
    }

    pub fn reactivate_requisition(&self, id: RequisitionId) -> Result<Requisition, LogisticsError> {
        self.transition(id, "reactivate", Requisition::reactivate)
    }

    pub fn dispatch_requisition(
        &self,
        id: RequisitionId,
        intents: &[DispatchIntent],
    ) -> Result<DispatchOutcome, LogisticsError> {
        with_conflict_retry(self.config.dispatch.max_conflict_retries, |_| {
            self.dispatcher.dispatch(id, intents, Utc::now())
        })
    }

    /// Reactivate a `PENDING_PURCHASE` requisition once stock in the default
    /// warehouse covers every open line, and mark its pending purchase requests
    /// received. Returns whether it was reactivated.
    pub fn resolve_backlog_for_requisition(
        &self,
        id: RequisitionId,
    ) -> Result<bool, LogisticsError> {
        let span = info_span!("resolve_backlog", requisition_id = %id);
        let _guard = span.enter();

        let requisition = self.requisition(id)?;
        if requisition.status() != RequisitionStatus::PendingPurchase {
            debug!(status = %requisition.status(), "not pending purchase");
            return Ok(false);
        }

        let warehouse_id = self
            .ports
            .warehouses
            .default_for_project(requisition.project_id())?
            .ok_or_else(|| {
                LogisticsError::Configuration(format!(
                    "project {} has no default warehouse",
                    requisition.project_id()
                ))
            })?;

        let mut needed: HashMap<StockKey, Decimal> = HashMap::new();
        for line in requisition.open_lines() {
            let key = StockKey::new(
                requisition.project_id(),
                line.resource().clone(),
                line.unit().clone(),
                warehouse_id,
            );
            *needed.entry(key).or_default() += line.remaining();
        }

        for (key, quantity) in &needed {
            let on_hand = self
                .store()
                .find_item(key)?
                .map(|item| item.quantity())
                .unwrap_or_default();
            if on_hand < *quantity {
                debug!(resource = %key.resource, %on_hand, needed = %quantity, "still short");
                return Ok(false);
            }
        }

        let reactivated = requisition.reactivate()?;
        self.store()
            .commit(UnitOfWork::new().with_requisition(reactivated))?;
        info!("backlog covered, requisition reactivated");

        match self.ports.backlog.pending_for_requisition(id) {
            Ok(requests) => {
                for request in requests {
                    let request_id = request.id_typed();
                    if let Err(err) = self.ports.backlog.mark_received(request_id) {
                        warn!(%request_id, error = %err, "purchase request not marked received");
                    }
                }
            }
            Err(err) => warn!(error = %err, "pending purchase requests not listed"),
        }
        Ok(true)
    }

    /// Try to reactivate every requisition waiting on the received resource.
    /// Never fails the receipt that triggered it.
    fn resolve_backlog_after_receipt(
        &self,
        project_id: ProjectId,
        resource: &ResourceRef,
        unit: &UnitOfMeasure,
    ) {
        let waiting: BTreeSet<RequisitionId> =
            match self.ports.backlog.pending_for_resource(project_id, resource, unit) {
                Ok(requests) => requests.iter().map(|r| r.requisition_id()).collect(),
                Err(err) => {
                    warn!(error = %err, "purchasing backlog not consulted");
                    return;
                }
            };

        for requisition_id in waiting {
            match self.resolve_backlog_for_requisition(requisition_id) {
                Ok(true) => info!(%requisition_id, "receipt resolved purchasing backlog"),
                Ok(false) => {}
                Err(err) => {
                    warn!(%requisition_id, error = %err, "backlog resolution after receipt failed")
                }
            }
        }
    }

    fn transition(
        &self,
        id: RequisitionId,
        action: &'static str,
        apply: impl Fn(&Requisition) -> DomainResult<Requisition>,
    ) -> Result<Requisition, LogisticsError> {
        let requisition = self.requisition(id)?;
        let next = apply(&requisition)?;
        let receipt = self.store().commit(UnitOfWork::new().with_requisition(next))?;
        let saved = saved_requisition(&receipt, id)?;
        info!(requisition_id = %id, action, status = %saved.status(), "requisition updated");
        Ok(saved)
    }

    // --- inventory --------------------------------------------------------

    /// Record a purchase receipt, opening the stock head if the natural key has none.
    pub fn receive_inventory(
        &self,
        cmd: ReceiveInventory,
    ) -> Result<InventoryTransaction, LogisticsError> {
        let span = info_span!(
            "receive_inventory",
            resource = %cmd.resource,
            warehouse_id = %cmd.warehouse_id,
            quantity = %cmd.quantity
        );
        let _guard = span.enter();

        let key = StockKey::new(
            cmd.project_id,
            cmd.resource.clone(),
            cmd.unit.clone(),
            cmd.warehouse_id,
        );
        let receipt = ReceiveStock {
            quantity: cmd.quantity,
            unit_cost: cmd.unit_cost,
            purchase_detail_id: cmd.purchase_detail_id,
            reference: cmd.reference.clone(),
            occurred_at: Utc::now(),
        };

        let committed = with_conflict_retry(self.config.dispatch.max_conflict_retries, |_| {
            let item = match self.store().find_item(&key)? {
                Some(item) => item,
                None => self.open_item(key.clone(), cmd.profile.clone())?,
            };
            let tx = item.receive(&receipt, &self.config.ledger)?;
            let committed = self.commit_item(tx)?;
            info!(
                item_id = %committed.item.id_typed(),
                average_cost = %committed.item.average_cost(),
                "stock received"
            );
            Ok(committed)
        })?;

        self.resolve_backlog_after_receipt(cmd.project_id, &cmd.resource, &cmd.unit);
        Ok(committed)
    }

    /// Set on-hand quantity after a physical count. `reference` defaults to
    /// "Physical count adjustment".
    pub fn adjust_inventory(
        &self,
        item_id: InventoryItemId,
        new_quantity: Decimal,
        justification: &str,
        reference: Option<&str>,
    ) -> Result<InventoryTransaction, LogisticsError> {
        let span = info_span!("adjust_inventory", %item_id, %new_quantity);
        let _guard = span.enter();

        let item = self.item(item_id)?;
        let tx = item.adjust(
            &AdjustStock {
                new_quantity,
                justification: justification.to_string(),
                reference: reference.unwrap_or(DEFAULT_ADJUSTMENT_REFERENCE).to_string(),
                occurred_at: Utc::now(),
            },
            &self.config.ledger,
        )?;
        let committed = self.commit_item(tx)?;
        info!(
            direction = ?committed.movement.direction(),
            delta = %committed.movement.quantity(),
            "stock adjusted"
        );
        Ok(committed)
    }

    /// Move stock to another warehouse at the source's average cost.
    pub fn transfer_stock(&self, cmd: TransferStock) -> Result<TransferOutcome, LogisticsError> {
        let span = info_span!(
            "transfer_stock",
            source_item_id = %cmd.source_item_id,
            target_warehouse_id = %cmd.target_warehouse_id,
            mode = ?cmd.mode
        );
        let _guard = span.enter();

        let source = self.item(cmd.source_item_id)?;
        if source.warehouse_id() == cmd.target_warehouse_id {
            return Err(LogisticsError::Validation(
                "source and target warehouse are the same".to_string(),
            ));
        }

        let transfer_id = TransferId::new();
        let now = Utc::now();
        let outbound = source.transfer_out(&TransferOut {
            mode: cmd.mode,
            transfer_id,
            quantity: cmd.quantity,
            reference: cmd.reference.clone(),
            occurred_at: now,
        })?;

        let target_key = source.key().in_warehouse(cmd.target_warehouse_id);
        let target = match self.store().find_item(&target_key)? {
            Some(item) => item,
            None => self.open_item(target_key, Some(source.profile().clone()))?,
        };
        let inbound = target.transfer_in(
            &TransferIn {
                mode: cmd.mode,
                transfer_id,
                quantity: cmd.quantity,
                unit_cost: outbound.movement.unit_cost(),
                reference: cmd.reference,
                occurred_at: now,
            },
            &self.config.ledger,
        )?;

        let outcome = TransferOutcome {
            transfer_id,
            source_item_id: outbound.item.id_typed(),
            target_item_id: inbound.item.id_typed(),
            quantity: cmd.quantity,
            unit_cost: outbound.movement.unit_cost(),
        };
        self.store().commit(
            UnitOfWork::new()
                .with_item(outbound.item)
                .with_item(inbound.item),
        )?;
        info!(%transfer_id, quantity = %outcome.quantity, "stock transferred");
        Ok(outcome)
    }

    /// Replay the item's ledger and compare it with the stored head.
    pub fn verify_ledger(
        &self,
        item_id: InventoryItemId,
    ) -> Result<Option<LedgerDrift>, LogisticsError> {
        let item = self.item(item_id)?;
        let movements = self.store().movements(item_id)?;
        let drift = verify(&item, &movements, &self.config.ledger)?;
        if let Some(d) = &drift {
            warn!(
                %item_id,
                recorded_quantity = %d.recorded.quantity,
                replayed_quantity = %d.replayed.quantity,
                recorded_average = %d.recorded.average_cost,
                replayed_average = %d.replayed.average_cost,
                "ledger drift"
            );
        }
        Ok(drift)
    }

    fn open_item(
        &self,
        key: StockKey,
        profile: Option<ItemProfile>,
    ) -> Result<InventoryItem, LogisticsError> {
        let profile = match profile {
            Some(p) => p,
            None => ItemProfile::new(key.resource.as_str(), "")?,
        };
        debug!(resource = %key.resource, warehouse_id = %key.warehouse_id, "opening stock head");
        Ok(InventoryItem::open(NewInventoryItem {
            id: InventoryItemId::new(AggregateId::new()),
            key,
            profile,
            opened_at: Utc::now(),
        }))
    }

    fn commit_item(&self, tx: InventoryTransaction) -> Result<InventoryTransaction, LogisticsError> {
        let id = tx.item.id_typed();
        let receipt = self.store().commit(UnitOfWork::new().with_item(tx.item))?;
        let item = receipt.item(id).cloned().ok_or_else(|| {
            LogisticsError::Invariant(format!("commit receipt lacks inventory item {id}"))
        })?;
        Ok(InventoryTransaction {
            item,
            movement: tx.movement,
        })
    }
}

fn saved_requisition(
    receipt: &CommitReceipt,
    id: RequisitionId,
) -> Result<Requisition, LogisticsError> {
    receipt
        .requisition(id)
        .cloned()
        .ok_or_else(|| LogisticsError::Invariant(format!("commit receipt lacks requisition {id}")))
}
