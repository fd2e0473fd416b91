use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use shortlist::config::NotificationConfig;
use shortlist::engagements::events::{EventDraft, EventLogError, EventStore, ShortlistEvent};
use shortlist::engagements::payments::{Payment, PaymentId, PaymentStore, StoreError};
use shortlist::engagements::shortlist::{
    CompanyId, DispatchError, Notification, NotificationDispatcher, RepositoryError, RequestId,
    RequestRepository, ShortlistCandidate, ShortlistRequest, ShortlistStatus,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
pub(crate) struct InMemoryRequestRepository {
    requests: Mutex<HashMap<RequestId, ShortlistRequest>>,
    candidates: Mutex<HashMap<RequestId, Vec<ShortlistCandidate>>>,
}

impl RequestRepository for InMemoryRequestRepository {
    fn insert(&self, request: ShortlistRequest) -> Result<ShortlistRequest, RepositoryError> {
        let mut guard = self.requests.lock().expect("repository mutex poisoned");
        if guard.contains_key(&request.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    fn fetch(&self, id: &RequestId) -> Result<Option<ShortlistRequest>, RepositoryError> {
        let guard = self.requests.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn update(
        &self,
        expected: ShortlistStatus,
        request: ShortlistRequest,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.requests.lock().expect("repository mutex poisoned");
        let stored = guard.get(&request.id).ok_or(RepositoryError::NotFound)?;
        if stored.status != expected {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(request.id.clone(), request);
        Ok(())
    }

    fn recent_for_company(
        &self,
        company: &CompanyId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ShortlistRequest>, RepositoryError> {
        let guard = self.requests.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .filter(|request| request.company_id == *company && request.created_at >= since)
            .cloned()
            .collect())
    }

    fn store_candidates(
        &self,
        request_id: &RequestId,
        rows: Vec<ShortlistCandidate>,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.candidates.lock().expect("candidate mutex poisoned");
        guard.insert(request_id.clone(), rows);
        Ok(())
    }

    fn append_candidate(&self, row: ShortlistCandidate) -> Result<(), RepositoryError> {
        let mut guard = self.candidates.lock().expect("candidate mutex poisoned");
        guard.entry(row.request_id.clone()).or_default().push(row);
        Ok(())
    }

    fn candidates(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ShortlistCandidate>, RepositoryError> {
        let guard = self.candidates.lock().expect("candidate mutex poisoned");
        Ok(guard.get(request_id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryPaymentStore {
    records: Mutex<HashMap<PaymentId, Payment>>,
    order: Mutex<Vec<PaymentId>>,
}

impl PaymentStore for InMemoryPaymentStore {
    fn insert(&self, payment: Payment) -> Result<Payment, StoreError> {
        let mut guard = self.records.lock().expect("payment mutex poisoned");
        if guard.contains_key(&payment.id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(payment.id.clone(), payment.clone());
        self.order
            .lock()
            .expect("payment order mutex poisoned")
            .push(payment.id.clone());
        Ok(payment)
    }

    fn update(&self, payment: Payment) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("payment mutex poisoned");
        if guard.contains_key(&payment.id) {
            guard.insert(payment.id.clone(), payment);
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    fn fetch(&self, id: &PaymentId) -> Result<Option<Payment>, StoreError> {
        let guard = self.records.lock().expect("payment mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn for_request(&self, request_id: &str) -> Result<Vec<Payment>, StoreError> {
        let records = self.records.lock().expect("payment mutex poisoned");
        let order = self.order.lock().expect("payment order mutex poisoned");
        Ok(order
            .iter()
            .filter_map(|id| records.get(id))
            .filter(|payment| payment.request_id.as_deref() == Some(request_id))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryEventStore {
    rows: Mutex<Vec<ShortlistEvent>>,
    sequence: AtomicU64,
}

impl EventStore for InMemoryEventStore {
    fn append(&self, draft: EventDraft) -> Result<ShortlistEvent, EventLogError> {
        let event = ShortlistEvent {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            request_id: draft.request_id,
            event_type: draft.event_type,
            previous_status: draft.previous_status,
            new_status: draft.new_status,
            actor_id: draft.actor_id,
            actor: draft.actor,
            metadata: draft.metadata,
            recorded_at: draft.recorded_at,
        };
        self.rows
            .lock()
            .expect("event mutex poisoned")
            .push(event.clone());
        Ok(event)
    }

    fn for_request(&self, request_id: &RequestId) -> Result<Vec<ShortlistEvent>, EventLogError> {
        let guard = self.rows.lock().expect("event mutex poisoned");
        Ok(guard
            .iter()
            .filter(|event| event.request_id == *request_id)
            .cloned()
            .collect())
    }
}

/// Delivery backend behind the notification queue. Rendering templates and
/// talking to the mail provider happen here, off the request path.
pub(crate) trait NotificationTransport: Send + Sync {
    fn deliver(&self, notification: &Notification) -> Result<(), DispatchError>;
}

/// Transport that only logs. Stands in for the mail integration in local
/// runs and demos.
#[derive(Default)]
pub(crate) struct TracingTransport;

impl NotificationTransport for TracingTransport {
    fn deliver(&self, notification: &Notification) -> Result<(), DispatchError> {
        info!(
            request = %notification.request_id.0,
            company = %notification.company_id.0,
            kind = notification.kind.label(),
            is_resend = notification.is_resend,
            "notification delivered"
        );
        Ok(())
    }
}

/// Dispatcher backed by a bounded queue and a background worker. Handing
/// the notification to the queue counts as dispatched; the worker retries
/// delivery with backoff and logs terminal failures.
pub(crate) struct QueueNotificationDispatcher {
    sender: mpsc::Sender<Notification>,
}

impl QueueNotificationDispatcher {
    pub(crate) fn spawn(
        config: &NotificationConfig,
        transport: Arc<dyn NotificationTransport>,
    ) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Notification>(config.queue_capacity);
        let max_attempts = config.max_attempts.max(1);

        tokio::spawn(async move {
            while let Some(notification) = receiver.recv().await {
                for attempt in 1..=max_attempts {
                    match transport.deliver(&notification) {
                        Ok(()) => break,
                        Err(err) if attempt < max_attempts => {
                            warn!(
                                request = %notification.request_id.0,
                                kind = notification.kind.label(),
                                attempt,
                                %err,
                                "notification delivery failed, retrying"
                            );
                            let backoff = 100u64 << (attempt - 1);
                            tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
                        }
                        Err(err) => {
                            warn!(
                                request = %notification.request_id.0,
                                kind = notification.kind.label(),
                                %err,
                                "notification dropped after retries"
                            );
                        }
                    }
                }
            }
        });

        Self { sender }
    }
}

impl NotificationDispatcher for QueueNotificationDispatcher {
    fn dispatch(&self, notification: Notification) -> Result<(), DispatchError> {
        self.sender
            .try_send(notification)
            .map_err(|err| DispatchError::Transport(err.to_string()))
    }
}

/// Synchronous dispatcher for CLI runs where no worker task exists.
#[derive(Default)]
pub(crate) struct TracingNotificationDispatcher {
    transport: TracingTransport,
}

impl NotificationDispatcher for TracingNotificationDispatcher {
    fn dispatch(&self, notification: Notification) -> Result<(), DispatchError> {
        self.transport.deliver(&notification)
    }
}
