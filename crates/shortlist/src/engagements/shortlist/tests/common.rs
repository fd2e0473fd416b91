use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

use crate::engagements::events::{
    EventDraft, EventLogError, EventStore, EventType, ShortlistEvent,
};
use crate::engagements::matching::{
    Availability, CandidateId, CandidateLocation, CandidateProfile, HiringLocation,
    RoleRequirements, SeniorityLevel, SkillClaim,
};
use crate::engagements::shortlist::domain::{
    CompanyId, OperatorId, RequestId, ShortlistCandidate, ShortlistRequest, ShortlistStatus,
};
use crate::engagements::payments::domain::{Money, Payment, PaymentId, PaymentRail};
use crate::engagements::payments::settlement::{PaymentStore, StoreError};
use crate::engagements::shortlist::notifications::{
    DispatchError, Notification, NotificationDispatcher,
};
use crate::engagements::shortlist::repository::{RepositoryError, RequestRepository};
use crate::engagements::shortlist::service::ShortlistService;

pub(super) fn now() -> DateTime<Utc> {
    "2026-05-01T09:00:00Z".parse().expect("valid timestamp")
}

pub(super) fn company() -> CompanyId {
    CompanyId("acme".to_string())
}

pub(super) fn operator() -> OperatorId {
    OperatorId("op-nina".to_string())
}

pub(super) fn requirements() -> RoleRequirements {
    RoleRequirements {
        title: "Senior Backend Engineer".to_string(),
        required_skills: vec!["Rust".to_string(), "Postgres".to_string()],
        seniority: SeniorityLevel::Senior,
        location: HiringLocation {
            city: "Berlin".to_string(),
            country: "Germany".to_string(),
            timezone_offset_hours: 1,
        },
        remote_allowed: true,
    }
}

pub(super) fn profile(id: &str) -> CandidateProfile {
    CandidateProfile {
        id: CandidateId(id.to_string()),
        role_title: "Senior Backend Engineer".to_string(),
        seniority: SeniorityLevel::Senior,
        skills: vec![
            SkillClaim {
                name: "Rust".to_string(),
                confidence: 0.9,
            },
            SkillClaim {
                name: "Postgres".to_string(),
                confidence: 0.8,
            },
        ],
        location: CandidateLocation {
            city: "Berlin".to_string(),
            country: "Germany".to_string(),
            timezone_offset_hours: 1,
            open_to_remote: true,
            willing_to_relocate: false,
        },
        availability: Availability::Open,
        recommendations_count: 4,
        profile_visible: true,
        open_to_opportunities: true,
        joined_at: now() - Duration::days(500),
        last_active_at: now() - Duration::hours(6),
        profile_updated_at: now() - Duration::days(2),
        latest_recommendation_at: Some(now() - Duration::days(15)),
    }
}

pub(super) fn pool() -> Vec<CandidateProfile> {
    vec![profile("cand-1"), profile("cand-2"), profile("cand-3")]
}

pub(super) type TestService =
    ShortlistService<MemoryRequests, MemoryPayments, MemoryEvents, MemoryDispatcher>;

pub(super) fn build_service() -> (
    TestService,
    Arc<MemoryRequests>,
    Arc<MemoryPayments>,
    Arc<MemoryEvents>,
    Arc<MemoryDispatcher>,
) {
    let requests = Arc::new(MemoryRequests::default());
    let payments = Arc::new(MemoryPayments::default());
    let events = Arc::new(MemoryEvents::default());
    let dispatcher = Arc::new(MemoryDispatcher::default());
    let service = ShortlistService::new(
        requests.clone(),
        payments.clone(),
        events.clone(),
        dispatcher.clone(),
    );
    (service, requests, payments, events, dispatcher)
}

/// Drive a fresh request to `PricingApproved` with a 100_000 minor-unit
/// proposal, ready for authorization.
pub(super) fn approved_request(service: &TestService) -> RequestId {
    let request = service
        .create(&company(), requirements(), None, now())
        .expect("creates");
    service
        .start_processing(&operator(), &request.id, &pool(), now())
        .expect("starts processing");
    service
        .propose_scope(
            &operator(),
            &request.id,
            Money::usd(100_000),
            3,
            None,
            now(),
        )
        .expect("proposes");
    service
        .approve_scope(&company(), &request.id, now())
        .expect("approves");
    request.id
}

/// Count of transition rows (rows that record a status change) for a
/// request, in append order.
pub(super) fn transition_count(events: &MemoryEvents, id: &RequestId) -> usize {
    events
        .for_request(id)
        .expect("event log reads")
        .iter()
        .filter(|event| event.new_status.is_some())
        .count()
}

pub(super) fn events_of_type(
    events: &MemoryEvents,
    id: &RequestId,
    event_type: EventType,
) -> Vec<ShortlistEvent> {
    events
        .for_request(id)
        .expect("event log reads")
        .into_iter()
        .filter(|event| event.event_type == event_type)
        .collect()
}

#[derive(Default)]
pub(super) struct MemoryRequests {
    records: Mutex<HashMap<RequestId, ShortlistRequest>>,
    candidates: Mutex<HashMap<RequestId, Vec<ShortlistCandidate>>>,
}

impl RequestRepository for MemoryRequests {
    fn insert(&self, request: ShortlistRequest) -> Result<ShortlistRequest, RepositoryError> {
        let mut guard = self.records.lock().expect("request mutex poisoned");
        if guard.contains_key(&request.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    fn fetch(&self, id: &RequestId) -> Result<Option<ShortlistRequest>, RepositoryError> {
        let guard = self.records.lock().expect("request mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn update(
        &self,
        expected: ShortlistStatus,
        request: ShortlistRequest,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("request mutex poisoned");
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
        let guard = self.records.lock().expect("request mutex poisoned");
        let mut recent: Vec<ShortlistRequest> = guard
            .values()
            .filter(|request| request.company_id == *company && request.created_at >= since)
            .cloned()
            .collect();
        recent.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(recent)
    }

    fn store_candidates(
        &self,
        request_id: &RequestId,
        rows: Vec<ShortlistCandidate>,
    ) -> Result<(), RepositoryError> {
        self.candidates
            .lock()
            .expect("candidate mutex poisoned")
            .insert(request_id.clone(), rows);
        Ok(())
    }

    fn append_candidate(&self, row: ShortlistCandidate) -> Result<(), RepositoryError> {
        self.candidates
            .lock()
            .expect("candidate mutex poisoned")
            .entry(row.request_id.clone())
            .or_default()
            .push(row);
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

/// Repository wrapper that can serve one pinned stale snapshot, for
/// exercising the compare-and-swap conflict path deterministically.
pub(super) struct SnapshotRequests {
    inner: Arc<MemoryRequests>,
    pinned: Mutex<Option<ShortlistRequest>>,
}

impl SnapshotRequests {
    pub(super) fn new(inner: Arc<MemoryRequests>) -> Self {
        Self {
            inner,
            pinned: Mutex::new(None),
        }
    }

    /// Freeze the current stored state of `id`; later fetches of that id
    /// return this snapshot regardless of writes through `inner`.
    pub(super) fn pin(&self, id: &RequestId) {
        let snapshot = self
            .inner
            .fetch(id)
            .expect("inner fetch")
            .expect("request present");
        *self.pinned.lock().expect("pin mutex poisoned") = Some(snapshot);
    }
}

impl RequestRepository for SnapshotRequests {
    fn insert(&self, request: ShortlistRequest) -> Result<ShortlistRequest, RepositoryError> {
        self.inner.insert(request)
    }

    fn fetch(&self, id: &RequestId) -> Result<Option<ShortlistRequest>, RepositoryError> {
        let guard = self.pinned.lock().expect("pin mutex poisoned");
        if let Some(snapshot) = guard.as_ref() {
            if snapshot.id == *id {
                return Ok(Some(snapshot.clone()));
            }
        }
        self.inner.fetch(id)
    }

    fn update(
        &self,
        expected: ShortlistStatus,
        request: ShortlistRequest,
    ) -> Result<(), RepositoryError> {
        self.inner.update(expected, request)
    }

    fn recent_for_company(
        &self,
        company: &CompanyId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ShortlistRequest>, RepositoryError> {
        self.inner.recent_for_company(company, since)
    }

    fn store_candidates(
        &self,
        request_id: &RequestId,
        rows: Vec<ShortlistCandidate>,
    ) -> Result<(), RepositoryError> {
        self.inner.store_candidates(request_id, rows)
    }

    fn append_candidate(&self, row: ShortlistCandidate) -> Result<(), RepositoryError> {
        self.inner.append_candidate(row)
    }

    fn candidates(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<ShortlistCandidate>, RepositoryError> {
        self.inner.candidates(request_id)
    }
}

pub(super) struct UnavailableRequests;

impl RequestRepository for UnavailableRequests {
    fn insert(&self, _request: ShortlistRequest) -> Result<ShortlistRequest, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &RequestId) -> Result<Option<ShortlistRequest>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(
        &self,
        _expected: ShortlistStatus,
        _request: ShortlistRequest,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn recent_for_company(
        &self,
        _company: &CompanyId,
        _since: DateTime<Utc>,
    ) -> Result<Vec<ShortlistRequest>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn store_candidates(
        &self,
        _request_id: &RequestId,
        _rows: Vec<ShortlistCandidate>,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn append_candidate(&self, _row: ShortlistCandidate) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn candidates(
        &self,
        _request_id: &RequestId,
    ) -> Result<Vec<ShortlistCandidate>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct MemoryPayments {
    records: Mutex<HashMap<PaymentId, Payment>>,
    order: Mutex<Vec<PaymentId>>,
}

impl PaymentStore for MemoryPayments {
    fn insert(&self, payment: Payment) -> Result<Payment, StoreError> {
        let mut guard = self.records.lock().expect("payment mutex poisoned");
        if guard.contains_key(&payment.id) {
            return Err(StoreError::Conflict);
        }
        guard.insert(payment.id.clone(), payment.clone());
        self.order
            .lock()
            .expect("order mutex poisoned")
            .push(payment.id.clone());
        Ok(payment)
    }

    fn update(&self, payment: Payment) -> Result<(), StoreError> {
        let mut guard = self.records.lock().expect("payment mutex poisoned");
        if !guard.contains_key(&payment.id) {
            return Err(StoreError::NotFound);
        }
        guard.insert(payment.id.clone(), payment);
        Ok(())
    }

    fn fetch(&self, id: &PaymentId) -> Result<Option<Payment>, StoreError> {
        let guard = self.records.lock().expect("payment mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn for_request(&self, request_id: &str) -> Result<Vec<Payment>, StoreError> {
        let guard = self.records.lock().expect("payment mutex poisoned");
        let order = self.order.lock().expect("order mutex poisoned");
        Ok(order
            .iter()
            .filter_map(|id| guard.get(id))
            .filter(|payment| payment.request_id.as_deref() == Some(request_id))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(super) struct MemoryEvents {
    rows: Mutex<Vec<ShortlistEvent>>,
    sequence: AtomicU64,
}

impl EventStore for MemoryEvents {
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

#[derive(Default)]
pub(super) struct MemoryDispatcher {
    sent: Mutex<Vec<Notification>>,
    failing: Mutex<bool>,
}

impl MemoryDispatcher {
    pub(super) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("dispatch mutex poisoned").clone()
    }

    pub(super) fn set_failing(&self, failing: bool) {
        *self.failing.lock().expect("dispatch mutex poisoned") = failing;
    }
}

impl NotificationDispatcher for MemoryDispatcher {
    fn dispatch(&self, notification: Notification) -> Result<(), DispatchError> {
        if *self.failing.lock().expect("dispatch mutex poisoned") {
            return Err(DispatchError::Transport("queue offline".to_string()));
        }
        self.sent
            .lock()
            .expect("dispatch mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) fn rail() -> PaymentRail {
    PaymentRail::CardGateway
}

pub(super) fn router(service: TestService) -> axum::Router {
    crate::engagements::shortlist::router::shortlist_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
