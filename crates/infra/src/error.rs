//! Application-level error surfaced by the logistics services.

use rust_decimal::Decimal;
use thiserror::Error;

use kardex_core::DomainError;
use kardex_requisition::{RequisitionLineId, RequisitionStatus};

use crate::config::ConfigError;
use crate::ports::PortError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum LogisticsError {
    /// Input rejected before any state change.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Dispatch attempted on a requisition that is not approved or in progress.
    #[error("requisition is not dispatchable in state {status}")]
    RequisitionNotApproved { status: RequisitionStatus },

    #[error("invalid state transition: cannot {action} from {from}")]
    InvalidStateTransition { from: String, action: &'static str },

    #[error("requisition line {0} not found")]
    LineNotFound(RequisitionLineId),

    /// The shortfall was escalated to purchasing. `cost_report_error` is set when
    /// the intents dispatched earlier in the call could not be reported.
    #[error("insufficient stock (available: {available}, requested: {requested})")]
    InsufficientStock {
        available: Decimal,
        requested: Decimal,
        cost_report_error: Option<PortError>,
    },

    /// Missing or inconsistent setup (e.g. no default warehouse for the project).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Another writer committed first; the whole call may be retried.
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    /// Stored data or a domain invariant is inconsistent.
    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("collaborator failure: {0}")]
    Collaborator(#[from] PortError),

    #[error("store failure: {0}")]
    Store(StoreError),
}

impl LogisticsError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LogisticsError::ConcurrentModification(_))
    }
}

impl From<DomainError> for LogisticsError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                LogisticsError::Validation(msg)
            }
            DomainError::InvariantViolation(msg) => LogisticsError::Invariant(msg),
            DomainError::NotFound(msg) => LogisticsError::NotFound(msg),
            DomainError::Conflict(msg) => LogisticsError::ConcurrentModification(msg),
            DomainError::Unauthorized(msg) => LogisticsError::Unauthorized(msg),
            DomainError::InsufficientStock {
                available,
                requested,
            } => LogisticsError::InsufficientStock {
                available,
                requested,
                cost_report_error: None,
            },
            DomainError::InvalidStateTransition { from, action } => {
                LogisticsError::InvalidStateTransition { from, action }
            }
        }
    }
}

impl From<StoreError> for LogisticsError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => LogisticsError::ConcurrentModification(msg),
            other => LogisticsError::Store(other),
        }
    }
}

impl From<ConfigError> for LogisticsError {
    fn from(value: ConfigError) -> Self {
        LogisticsError::Configuration(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn store_conflicts_become_retryable() {
        let err = LogisticsError::from(StoreError::Concurrency("stale".to_string()));
        assert!(err.is_retryable());
        assert!(!LogisticsError::from(StoreError::Poisoned).is_retryable());
    }

    #[test]
    fn domain_errors_keep_their_kind() {
        match LogisticsError::from(DomainError::insufficient_stock(dec!(1), dec!(2))) {
            LogisticsError::InsufficientStock {
                available,
                requested,
                cost_report_error,
            } => {
                assert_eq!(available, dec!(1));
                assert_eq!(requested, dec!(2));
                assert!(cost_report_error.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(
            LogisticsError::from(DomainError::unauthorized("nope")),
            LogisticsError::Unauthorized(_)
        ));
    }
}
