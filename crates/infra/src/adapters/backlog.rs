use std::sync::RwLock;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use kardex_core::{AggregateId, AggregateRoot, DomainError, ProjectId, ResourceRef, UnitOfMeasure};
use kardex_events::{EventBus, EventEnvelope};
use kardex_purchasing::{
    NewPurchaseRequest, PurchaseRequest, PurchaseRequestEvent, PurchaseRequestId,
    PurchaseRequestStatus,
};
use kardex_requisition::RequisitionId;

use crate::ports::{BacklogPort, BacklogRequest, PortError};

type Publisher = Box<dyn Fn(EventEnvelope<JsonValue>) -> Result<(), String> + Send + Sync>;

/// In-memory purchasing backlog.
///
/// Requests are kept in raise order. When built with [`InMemoryBacklog::with_bus`]
/// each raised request is also published as `purchasing.request.raised`; a
/// failed publish is logged and does not undo the raise.
#[derive(Default)]
pub struct InMemoryBacklog {
    requests: RwLock<Vec<PurchaseRequest>>,
    publisher: Option<Publisher>,
}

impl core::fmt::Debug for InMemoryBacklog {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InMemoryBacklog")
            .field("requests", &self.requests)
            .field("publishes", &self.publisher.is_some())
            .finish()
    }
}

fn poisoned() -> PortError {
    PortError::Unavailable("lock poisoned".to_string())
}

impl InMemoryBacklog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bus<B>(bus: B) -> Self
    where
        B: EventBus<EventEnvelope<JsonValue>> + 'static,
    {
        Self {
            requests: RwLock::new(Vec::new()),
            publisher: Some(Box::new(move |envelope| {
                bus.publish(envelope).map_err(|e| format!("{e:?}"))
            })),
        }
    }

    pub fn requests(&self) -> Vec<PurchaseRequest> {
        self.requests.read().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn requests_for(&self, requisition_id: RequisitionId) -> Vec<PurchaseRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.requisition_id() == requisition_id)
            .collect()
    }

    fn pending_where(
        &self,
        keep: impl Fn(&PurchaseRequest) -> bool,
    ) -> Result<Vec<PurchaseRequest>, PortError> {
        let requests = self.requests.read().map_err(|_| poisoned())?;
        Ok(requests
            .iter()
            .filter(|r| r.status() == PurchaseRequestStatus::Pending && keep(r))
            .cloned()
            .collect())
    }

    pub fn cancel(&self, id: PurchaseRequestId) -> Result<PurchaseRequest, PortError> {
        self.update(id, PurchaseRequest::cancel)
    }

    fn update(
        &self,
        id: PurchaseRequestId,
        transition: impl FnOnce(&PurchaseRequest) -> Result<PurchaseRequest, DomainError>,
    ) -> Result<PurchaseRequest, PortError> {
        let mut requests = self.requests.write().map_err(|_| poisoned())?;
        let slot = requests
            .iter_mut()
            .find(|r| r.id_typed() == id)
            .ok_or_else(|| PortError::Rejected(format!("purchase request {id} not found")))?;
        let next = transition(slot).map_err(|e| PortError::Rejected(e.to_string()))?;
        *slot = next.clone();
        Ok(next)
    }
}

impl BacklogPort for InMemoryBacklog {
    fn create_purchase_request(
        &self,
        request: BacklogRequest,
    ) -> Result<PurchaseRequestId, PortError> {
        let raised = PurchaseRequest::raise(NewPurchaseRequest {
            id: PurchaseRequestId::new(AggregateId::new()),
            project_id: request.project_id,
            requisition_id: request.requisition_id,
            resource: request.resource,
            quantity: request.quantity,
            unit: request.unit,
            priority: request.priority,
            raised_at: Utc::now(),
        })
        .map_err(|e| PortError::Rejected(e.to_string()))?;
        let id = raised.id_typed();

        self.requests
            .write()
            .map_err(|_| poisoned())?
            .push(raised.clone());

        info!(
            purchase_request_id = %id,
            requisition_id = %raised.requisition_id(),
            resource = %raised.resource(),
            quantity = %raised.quantity(),
            priority = ?raised.priority(),
            "purchase request raised"
        );

        if let Some(publish) = &self.publisher {
            let published =
                EventEnvelope::from_typed(raised.version(), &PurchaseRequestEvent::raised(&raised))
                    .map_err(|e| e.to_string())
                    .and_then(|envelope| publish(envelope));
            if let Err(failure) = published {
                warn!(purchase_request_id = %id, %failure, "purchase request not published");
            }
        }

        Ok(id)
    }

    fn pending_for_requisition(
        &self,
        requisition_id: RequisitionId,
    ) -> Result<Vec<PurchaseRequest>, PortError> {
        self.pending_where(|r| r.requisition_id() == requisition_id)
    }

    fn pending_for_resource(
        &self,
        project_id: ProjectId,
        resource: &ResourceRef,
        unit: &UnitOfMeasure,
    ) -> Result<Vec<PurchaseRequest>, PortError> {
        self.pending_where(|r| {
            r.project_id() == project_id && r.resource() == resource && r.unit() == unit
        })
    }

    fn mark_received(&self, id: PurchaseRequestId) -> Result<PurchaseRequest, PortError> {
        self.update(id, PurchaseRequest::mark_received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use kardex_events::{InMemoryEventBus, Subscription};
    use kardex_purchasing::PurchasePriority;
    use rust_decimal_macros::dec;

    fn request(requisition_id: RequisitionId) -> BacklogRequest {
        BacklogRequest {
            project_id: ProjectId::new(),
            requisition_id,
            resource: ResourceRef::new("MAT-001").unwrap(),
            quantity: dec!(40),
            unit: UnitOfMeasure::new("BAG").unwrap(),
            priority: PurchasePriority::Urgent,
        }
    }

    #[test]
    fn raised_requests_are_published_and_listed() {
        let bus: Arc<InMemoryEventBus<EventEnvelope<JsonValue>>> = Arc::new(InMemoryEventBus::new());
        let sub = bus.subscribe();
        let backlog = InMemoryBacklog::with_bus(bus.clone());
        let requisition_id = RequisitionId::new(AggregateId::new());

        let id = backlog.create_purchase_request(request(requisition_id)).unwrap();

        let listed = backlog.requests_for(requisition_id);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id_typed(), id);
        assert_eq!(listed[0].status(), PurchaseRequestStatus::Pending);

        let published = sub.drain();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].event_type(), "purchasing.request.raised");
    }

    #[test]
    fn received_requests_cannot_be_cancelled() {
        let backlog = InMemoryBacklog::new();
        let id = backlog
            .create_purchase_request(request(RequisitionId::new(AggregateId::new())))
            .unwrap();
        backlog.mark_received(id).unwrap();
        assert!(matches!(backlog.cancel(id), Err(PortError::Rejected(_))));
    }

    #[test]
    fn pending_lookups_skip_settled_requests() {
        let backlog = InMemoryBacklog::new();
        let requisition_id = RequisitionId::new(AggregateId::new());
        let first = request(requisition_id);
        let (project_id, resource, unit) =
            (first.project_id, first.resource.clone(), first.unit.clone());
        let received = backlog.create_purchase_request(first).unwrap();
        let open = backlog
            .create_purchase_request(BacklogRequest {
                project_id,
                ..request(requisition_id)
            })
            .unwrap();
        backlog.mark_received(received).unwrap();

        let pending = backlog.pending_for_requisition(requisition_id).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id_typed(), open);

        let by_resource = backlog
            .pending_for_resource(project_id, &resource, &unit)
            .unwrap();
        assert_eq!(by_resource.len(), 1);
        assert!(
            backlog
                .pending_for_resource(ProjectId::new(), &resource, &unit)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn receiving_twice_is_a_no_op() {
        let backlog = InMemoryBacklog::new();
        let id = backlog
            .create_purchase_request(request(RequisitionId::new(AggregateId::new())))
            .unwrap();
        let once = backlog.mark_received(id).unwrap();
        let twice = backlog.mark_received(id).unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice.status(), PurchaseRequestStatus::Received);
    }

    struct RefusingBus;

    impl EventBus<EventEnvelope<JsonValue>> for RefusingBus {
        type Error = String;

        fn publish(&self, _message: EventEnvelope<JsonValue>) -> Result<(), String> {
            Err("broker down".to_string())
        }

        fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
            Subscription::new(std::sync::mpsc::channel().1)
        }
    }

    #[test]
    fn unpublished_request_is_still_raised() {
        let backlog = InMemoryBacklog::with_bus(RefusingBus);
        let requisition_id = RequisitionId::new(AggregateId::new());
        let id = backlog.create_purchase_request(request(requisition_id)).unwrap();
        assert_eq!(backlog.requests_for(requisition_id)[0].id_typed(), id);
    }
}
