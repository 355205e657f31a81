//! Costing arithmetic and ledger replay.
//!
//! The movement ledger is the source of truth; the head's quantity and average
//! cost must always equal what a replay of its movements produces.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use kardex_core::{DomainError, DomainResult, round_half_up};

use crate::item::{InventoryItem, InventoryItemId};
use crate::movement::{Direction, InventoryMovement};
use crate::policy::LedgerPolicy;

/// Moving weighted-average unit cost after an inbound of `quantity` at `unit_cost`.
///
/// `(on_hand * current + quantity * unit_cost) / (on_hand + quantity)`, rounded
/// half-up to `scale`. With nothing on hand the incoming cost is taken as is.
pub fn weighted_average(
    on_hand: Decimal,
    current_average: Decimal,
    quantity: Decimal,
    unit_cost: Decimal,
    scale: u32,
) -> DomainResult<Decimal> {
    if on_hand.is_zero() {
        return Ok(round_half_up(unit_cost, scale));
    }
    let overflow = || DomainError::validation("stock valuation overflows");

    let held = on_hand.checked_mul(current_average).ok_or_else(overflow)?;
    let incoming = quantity.checked_mul(unit_cost).ok_or_else(overflow)?;
    let value = held.checked_add(incoming).ok_or_else(overflow)?;
    let total = on_hand.checked_add(quantity).ok_or_else(overflow)?;
    let average = value.checked_div(total).ok_or_else(overflow)?;

    Ok(round_half_up(average, scale))
}

/// Quantity and average cost of a head at some point in its history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockPosition {
    pub quantity: Decimal,
    pub average_cost: Decimal,
}

impl StockPosition {
    pub const EMPTY: StockPosition = StockPosition {
        quantity: Decimal::ZERO,
        average_cost: Decimal::ZERO,
    };

    pub fn of(item: &InventoryItem) -> Self {
        Self {
            quantity: item.quantity(),
            average_cost: item.average_cost(),
        }
    }

    /// Fold one movement into the position.
    pub fn apply(self, movement: &InventoryMovement, policy: &LedgerPolicy) -> DomainResult<Self> {
        match movement.direction() {
            Direction::Inbound => {
                let average_cost = if movement.kind().revalues_stock() {
                    weighted_average(
                        self.quantity,
                        self.average_cost,
                        movement.quantity(),
                        movement.unit_cost(),
                        policy.cost_scale,
                    )?
                } else {
                    self.average_cost
                };
                let quantity = self
                    .quantity
                    .checked_add(movement.quantity())
                    .ok_or_else(|| DomainError::validation("quantity on hand overflows"))?;
                Ok(Self {
                    quantity,
                    average_cost,
                })
            }
            Direction::Outbound => {
                if self.quantity < movement.quantity() {
                    return Err(DomainError::invariant(format!(
                        "movement {} takes {} with only {} on hand",
                        movement.id_typed(),
                        movement.quantity(),
                        self.quantity
                    )));
                }
                Ok(Self {
                    quantity: self.quantity - movement.quantity(),
                    average_cost: self.average_cost,
                })
            }
        }
    }
}

/// Replay movements in order from an empty head.
pub fn replay<'a, I>(movements: I, policy: &LedgerPolicy) -> DomainResult<StockPosition>
where
    I: IntoIterator<Item = &'a InventoryMovement>,
{
    movements
        .into_iter()
        .try_fold(StockPosition::EMPTY, |position, movement| {
            position.apply(movement, policy)
        })
}

/// Mismatch between a head and its replayed ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDrift {
    pub item_id: InventoryItemId,
    pub recorded: StockPosition,
    pub replayed: StockPosition,
}

/// Compare a persisted head against the replay of its persisted movements.
///
/// Returns `Ok(None)` when they agree. Movements belonging to another item are
/// an invariant violation, not drift.
pub fn verify(
    item: &InventoryItem,
    movements: &[InventoryMovement],
    policy: &LedgerPolicy,
) -> DomainResult<Option<LedgerDrift>> {
    if let Some(stray) = movements.iter().find(|m| m.item_id() != item.id_typed()) {
        return Err(DomainError::invariant(format!(
            "movement {} belongs to item {}, not {}",
            stray.id_typed(),
            stray.item_id(),
            item.id_typed()
        )));
    }

    let replayed = replay(movements, policy)?;
    let recorded = StockPosition::of(item);
    if replayed == recorded {
        Ok(None)
    } else {
        Ok(Some(LedgerDrift {
            item_id: item.id_typed(),
            recorded,
            replayed,
        }))
    }
}
