//! Requisition dispatch: issue stock from the project's default warehouse
//! against approved requisition lines.
//!
//! ```text
//! dispatch(requisition, [(line, qty)…])
//!   ↓
//! 1. Load requisition, require a dispatchable state
//!   ↓
//! 2. Per intent: check line + quantity, resolve warehouse, find the head
//!   ↓
//! 3. Enough stock  → issue (correlated movement), record progress on the line
//!    Short on stock → PENDING_PURCHASE + commit earlier intents, raise backlog,
//!                     report earlier issues, fail
//!   ↓
//! 4. Commit requisition + touched heads + movements as one unit
//!   ↓
//! 5. Report realized cost per issue to cost allocation
//! ```
//!
//! Nothing is written before step 4 (or the escalation commit), so every
//! validation or state error leaves storage untouched.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use kardex_core::{AggregateRoot, WarehouseId};
use kardex_inventory::{
    DispatchCorrelation, InventoryItem, InventoryItemId, IssueStock, LedgerPolicy, MovementId,
    StockKey,
};
use kardex_purchasing::PurchasePriority;
use kardex_requisition::{
    Requisition, RequisitionId, RequisitionLine, RequisitionLineId, RequisitionStatus,
};

use crate::error::LogisticsError;
use crate::ports::{BacklogRequest, Collaborators, CostAllocation, ExpenseNature, PortError};
use crate::store::{LogisticsStore, UnitOfWork};

/// One requested issue: `quantity` against requisition line `line_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchIntent {
    pub line_id: RequisitionLineId,
    pub quantity: Decimal,
}

impl DispatchIntent {
    pub fn new(line_id: RequisitionLineId, quantity: Decimal) -> Self {
        Self { line_id, quantity }
    }
}

/// Result of one applied intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchedLine {
    pub line_id: RequisitionLineId,
    pub item_id: InventoryItemId,
    pub movement_id: MovementId,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub requisition_id: RequisitionId,
    pub status: RequisitionStatus,
    pub version: u64,
    pub lines: Vec<DispatchedLine>,
}

/// Heads touched during one call, in first-touch order.
#[derive(Debug, Default)]
struct WorkingSet {
    items: Vec<InventoryItem>,
}

impl WorkingSet {
    fn get(&self, key: &StockKey) -> Option<&InventoryItem> {
        self.items.iter().find(|i| i.key() == key)
    }

    fn put(&mut self, item: InventoryItem) {
        match self.items.iter_mut().find(|i| i.id_typed() == item.id_typed()) {
            Some(slot) => *slot = item,
            None => self.items.push(item),
        }
    }

    fn into_items(self) -> Vec<InventoryItem> {
        self.items
    }
}

/// Orchestrates dispatch calls against a [`LogisticsStore`].
///
/// One call is one logical transaction. Conflicts surface as
/// `ConcurrentModification`; retrying is the caller's decision
/// (see [`crate::retry::with_conflict_retry`]).
#[derive(Debug)]
pub struct DispatchOrchestrator<S> {
    store: S,
    ports: Collaborators,
    policy: LedgerPolicy,
}

impl<S> DispatchOrchestrator<S> {
    pub fn new(store: S, ports: Collaborators, policy: LedgerPolicy) -> Self {
        Self {
            store,
            ports,
            policy,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> &LedgerPolicy {
        &self.policy
    }
}

impl<S> DispatchOrchestrator<S>
where
    S: LogisticsStore,
{
    pub fn dispatch(
        &self,
        requisition_id: RequisitionId,
        intents: &[DispatchIntent],
        at: DateTime<Utc>,
    ) -> Result<DispatchOutcome, LogisticsError> {
        let span = info_span!("dispatch_requisition", %requisition_id, intents = intents.len());
        let _guard = span.enter();

        if intents.is_empty() {
            return Err(LogisticsError::Validation(
                "dispatch needs at least one line".to_string(),
            ));
        }

        let mut requisition = self
            .store
            .load_requisition(requisition_id)?
            .ok_or_else(|| LogisticsError::NotFound(format!("requisition {requisition_id}")))?;
        if !requisition.is_dispatchable() {
            return Err(LogisticsError::RequisitionNotApproved {
                status: requisition.status(),
            });
        }

        let reference = format!(
            "Dispatch of requisition #{} - {}",
            requisition_id,
            requisition.requester()
        );
        let mut warehouse: Option<WarehouseId> = None;
        let mut working = WorkingSet::default();
        let mut allocations = Vec::with_capacity(intents.len());
        let mut dispatched = Vec::with_capacity(intents.len());

        for intent in intents {
            let line = requisition
                .line(intent.line_id)
                .cloned()
                .ok_or(LogisticsError::LineNotFound(intent.line_id))?;

            if intent.quantity <= Decimal::ZERO {
                return Err(LogisticsError::Validation(format!(
                    "dispatch quantity must be positive (got {})",
                    intent.quantity
                )));
            }
            if intent.quantity > line.remaining() {
                return Err(LogisticsError::Validation(format!(
                    "dispatch of {} exceeds remaining {} on line {}",
                    intent.quantity,
                    line.remaining(),
                    line.id_typed()
                )));
            }

            let warehouse_id = match warehouse {
                Some(w) => w,
                None => {
                    let w = self.default_warehouse(&requisition)?;
                    warehouse = Some(w);
                    w
                }
            };

            let key = StockKey::new(
                requisition.project_id(),
                line.resource().clone(),
                line.unit().clone(),
                warehouse_id,
            );
            let item = match working.get(&key) {
                Some(item) => item.clone(),
                None => self.store.find_item(&key)?.ok_or_else(|| {
                    LogisticsError::Validation(format!(
                        "no inventory of {} ({}) in warehouse {warehouse_id}",
                        line.resource(),
                        line.unit()
                    ))
                })?,
            };

            if !item.has_stock(intent.quantity) {
                warn!(
                    line_id = %line.id_typed(),
                    resource = %line.resource(),
                    available = %item.quantity(),
                    requested = %intent.quantity,
                    "stock shortfall"
                );
                let cost_report_error = self.escalate(requisition, &line, working, allocations)?;
                return Err(LogisticsError::InsufficientStock {
                    available: item.quantity(),
                    requested: intent.quantity,
                    cost_report_error,
                });
            }

            let tx = item.issue(&IssueStock {
                quantity: intent.quantity,
                dispatch: Some(DispatchCorrelation {
                    requisition_id,
                    requisition_line_id: line.id_typed(),
                    budget_line_id: line.budget_line_id(),
                }),
                reference: reference.clone(),
                occurred_at: at,
            })?;

            allocations.push(CostAllocation {
                budget_line_id: line.budget_line_id(),
                nature: ExpenseNature::for_budget_line(line.budget_line_id()),
                quantity: tx.movement.quantity(),
                unit_cost: tx.movement.unit_cost(),
                reference: reference.clone(),
            });
            dispatched.push(DispatchedLine {
                line_id: line.id_typed(),
                item_id: tx.item.id_typed(),
                movement_id: tx.movement.id_typed(),
                quantity: tx.movement.quantity(),
                unit_cost: tx.movement.unit_cost(),
                total_cost: tx.movement.total_cost(),
            });
            debug!(
                line_id = %line.id_typed(),
                quantity = %intent.quantity,
                unit_cost = %tx.movement.unit_cost(),
                "issued"
            );

            requisition = requisition.record_dispatch(line.id_typed(), intent.quantity)?;
            working.put(tx.item);
        }

        let receipt = self.store.commit(
            UnitOfWork::new()
                .with_requisition(requisition)
                .with_items(working.into_items()),
        )?;
        if let Some(err) = self.report_costs(allocations) {
            return Err(err.into());
        }

        let saved = receipt.requisition(requisition_id).ok_or_else(|| {
            LogisticsError::Invariant(format!("commit receipt lacks requisition {requisition_id}"))
        })?;
        info!(
            status = %saved.status(),
            version = saved.version(),
            lines = dispatched.len(),
            "requisition dispatched"
        );

        Ok(DispatchOutcome {
            requisition_id,
            status: saved.status(),
            version: saved.version(),
            lines: dispatched,
        })
    }

    fn default_warehouse(&self, requisition: &Requisition) -> Result<WarehouseId, LogisticsError> {
        self.ports
            .warehouses
            .default_for_project(requisition.project_id())?
            .ok_or_else(|| {
                LogisticsError::Configuration(format!(
                    "project {} has no default warehouse",
                    requisition.project_id()
                ))
            })
    }

    /// Shortfall handling.
    ///
    /// From APPROVED / PARTIALLY_DISPATCHED: flip to PENDING_PURCHASE and commit
    /// it with the intents applied so far, raise one urgent purchase request for
    /// the line's whole remaining quantity, then report the committed issues.
    /// From PENDING_PURCHASE nothing is written; a request is raised only when
    /// the requisition has none pending.
    ///
    /// Returns the first cost-report failure, if any.
    fn escalate(
        &self,
        requisition: Requisition,
        line: &RequisitionLine,
        working: WorkingSet,
        allocations: Vec<CostAllocation>,
    ) -> Result<Option<PortError>, LogisticsError> {
        let requisition_id = requisition.id_typed();
        let project_id = requisition.project_id();

        let committed = requisition.status().can_escalate();
        if committed {
            let pending = requisition.mark_pending_purchase()?;
            self.store.commit(
                UnitOfWork::new()
                    .with_requisition(pending)
                    .with_items(working.into_items()),
            )?;
        } else if !self
            .ports
            .backlog
            .pending_for_requisition(requisition_id)?
            .is_empty()
        {
            debug!(status = %requisition.status(), "already pending purchase, no new request");
            return Ok(None);
        }

        let raised = self.ports.backlog.create_purchase_request(BacklogRequest {
            project_id,
            requisition_id,
            resource: line.resource().clone(),
            quantity: line.remaining(),
            unit: line.unit().clone(),
            priority: PurchasePriority::Urgent,
        });
        let cost_report_error = if committed {
            self.report_costs(allocations)
        } else {
            None
        };

        let request_id = raised?;
        info!(
            %request_id,
            line_id = %line.id_typed(),
            quantity = %line.remaining(),
            "requisition escalated to purchasing"
        );
        Ok(cost_report_error)
    }

    /// Reports every allocation; failures are logged and the first one returned.
    fn report_costs(&self, allocations: Vec<CostAllocation>) -> Option<PortError> {
        let mut first = None;
        for allocation in allocations {
            let budget_line_id = allocation.budget_line_id;
            if let Err(err) = self.ports.costs.record_actual_cost(allocation) {
                warn!(?budget_line_id, error = %err, "actual cost not reported");
                first.get_or_insert(err);
            }
        }
        first
    }
}
