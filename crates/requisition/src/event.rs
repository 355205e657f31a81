use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kardex_core::{AggregateId, ProjectId};
use kardex_events::Event;

use crate::requisition::{Requisition, RequisitionId, RequisitionStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RequisitionEvent {
    Saved(RequisitionSaved),
}

/// Event: a requisition revision was committed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionSaved {
    pub requisition_id: RequisitionId,
    pub project_id: ProjectId,
    pub status: RequisitionStatus,
    pub version: u64,
    pub saved_at: DateTime<Utc>,
}

impl RequisitionEvent {
    pub fn saved(requisition: &Requisition, version: u64, saved_at: DateTime<Utc>) -> Self {
        RequisitionEvent::Saved(RequisitionSaved {
            requisition_id: requisition.id_typed(),
            project_id: requisition.project_id(),
            status: requisition.status(),
            version,
            saved_at,
        })
    }
}

impl Event for RequisitionEvent {
    const AGGREGATE_TYPE: &'static str = "logistics.requisition";

    fn event_type(&self) -> &'static str {
        match self {
            RequisitionEvent::Saved(_) => "logistics.requisition.saved",
        }
    }

    fn project_id(&self) -> ProjectId {
        match self {
            RequisitionEvent::Saved(e) => e.project_id,
        }
    }

    fn aggregate_id(&self) -> AggregateId {
        match self {
            RequisitionEvent::Saved(e) => e.requisition_id.0,
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RequisitionEvent::Saved(e) => e.saved_at,
        }
    }
}
