//! Integration specification for the paid shortlist engagement, driven
//! end to end through the public service facade: intake, scoring, scope
//! pricing, payment authorization, delivery, and the audit trail.

mod common {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    use chrono::{DateTime, Duration, Utc};

    use shortlist::engagements::events::{
        EventDraft, EventLogError, EventStore, ShortlistEvent,
    };
    use shortlist::engagements::matching::{
        Availability, CandidateId, CandidateLocation, CandidateProfile, HiringLocation,
        RoleRequirements, SeniorityLevel, SkillClaim,
    };
    use shortlist::engagements::payments::settlement::{PaymentStore, StoreError};
    use shortlist::engagements::payments::{Payment, PaymentId};
    use shortlist::engagements::shortlist::{
        CompanyId, Notification, NotificationDispatcher, OperatorId, RepositoryError, RequestId,
        RequestRepository, ShortlistCandidate, ShortlistRequest, ShortlistService,
        ShortlistStatus,
    };
    use shortlist::engagements::shortlist::notifications::DispatchError;

    pub(super) fn now() -> DateTime<Utc> {
        "2026-06-15T10:00:00Z".parse().expect("valid timestamp")
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
            last_active_at: now() - Duration::hours(4),
            profile_updated_at: now() - Duration::days(2),
            latest_recommendation_at: Some(now() - Duration::days(12)),
        }
    }

    pub(super) fn pool() -> Vec<CandidateProfile> {
        vec![profile("cand-1"), profile("cand-2"), profile("cand-3")]
    }

    pub(super) type Service =
        ShortlistService<MemoryRequests, MemoryPayments, MemoryEvents, MemoryDispatcher>;

    pub(super) fn build_service() -> (Service, Arc<MemoryPayments>, Arc<MemoryEvents>) {
        let requests = Arc::new(MemoryRequests::default());
        let payments = Arc::new(MemoryPayments::default());
        let events = Arc::new(MemoryEvents::default());
        let dispatcher = Arc::new(MemoryDispatcher::default());
        let service = ShortlistService::new(requests, payments.clone(), events.clone(), dispatcher);
        (service, payments, events)
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

        fn for_request(
            &self,
            request_id: &RequestId,
        ) -> Result<Vec<ShortlistEvent>, EventLogError> {
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
    }

    impl NotificationDispatcher for MemoryDispatcher {
        fn dispatch(&self, notification: Notification) -> Result<(), DispatchError> {
            self.sent
                .lock()
                .expect("dispatch mutex poisoned")
                .push(notification);
            Ok(())
        }
    }
}

use common::*;
use shortlist::engagements::events::{EventStore, EventType};
use shortlist::engagements::payments::settlement::PaymentStore;
use shortlist::engagements::payments::{Money, PaymentRail, PaymentStatus};
use shortlist::engagements::shortlist::{
    DeliveryOutcome, EngagementOutcome, PricingType, ShortlistStatus,
};

#[test]
fn fulfilled_engagement_settles_and_audits_end_to_end() {
    let (service, payments, events) = build_service();

    let request = service
        .create(&company(), requirements(), None, now())
        .expect("creates");
    service
        .start_processing(&operator(), &request.id, &pool(), now())
        .expect("starts");
    service
        .propose_scope(&operator(), &request.id, Money::usd(120_000), 3, None, now())
        .expect("proposes");
    service
        .approve_scope(&company(), &request.id, now())
        .expect("approves");
    service
        .authorize_payment(&company(), &request.id, PaymentRail::CardGateway, now())
        .expect("authorizes");
    let delivered = service
        .deliver(&operator(), &request.id, DeliveryOutcome::Fulfilled, None, now())
        .expect("delivers");

    assert_eq!(delivered.status, ShortlistStatus::Completed);
    assert_eq!(delivered.outcome, EngagementOutcome::Fulfilled);

    let records = payments.for_request(&request.id.0).expect("store reads");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, PaymentStatus::Captured);
    assert_eq!(records[0].amount_captured, Some(Money::usd(120_000)));

    let history = events.for_request(&request.id).expect("event log reads");
    let transitions: Vec<EventType> = history
        .iter()
        .filter(|event| event.new_status.is_some())
        .map(|event| event.event_type)
        .collect();
    assert_eq!(
        transitions,
        vec![
            EventType::Submitted,
            EventType::ProcessingStarted,
            EventType::ScopeProposed,
            EventType::PricingApproved,
            EventType::AuthorizationSucceeded,
            EventType::Delivered,
        ]
    );
}

#[test]
fn follow_up_engagement_is_discounted_and_deduplicated() {
    let (service, payments, _) = build_service();

    // First engagement completes with three delivered candidates.
    let first = service
        .create(&company(), requirements(), None, now())
        .expect("creates");
    service
        .start_processing(&operator(), &first.id, &pool(), now())
        .expect("starts");
    service
        .propose_scope(&operator(), &first.id, Money::usd(120_000), 3, None, now())
        .expect("proposes");
    service
        .approve_scope(&company(), &first.id, now())
        .expect("approves");
    service
        .authorize_payment(&company(), &first.id, PaymentRail::CardGateway, now())
        .expect("authorizes");
    service
        .deliver(&operator(), &first.id, DeliveryOutcome::Fulfilled, None, now())
        .expect("delivers");

    // Ten days later the same role comes back.
    let later = now() + chrono::Duration::days(10);
    let follow_up = service
        .create(&company(), requirements(), Some(first.id.clone()), later)
        .expect("creates follow-up");
    assert_eq!(follow_up.pricing_type, PricingType::FollowUp);
    assert_eq!(follow_up.follow_up_discount_percent, 40);

    let rows = service
        .start_processing(&operator(), &follow_up.id, &pool(), later)
        .expect("starts");
    assert!(rows.is_empty(), "previously delivered candidates must not recur");

    let fresh = profile("cand-9");
    let mut wider = pool();
    wider.push(fresh);
    // A widened pool still only surfaces the new face.
    let rows = {
        service
            .mark_no_match(&operator(), &follow_up.id, None, later)
            .expect("closes the empty run");
        let retry = service
            .create(&company(), requirements(), Some(first.id.clone()), later)
            .expect("creates retry");
        service
            .start_processing(&operator(), &retry.id, &wider, later)
            .expect("starts retry")
    };
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].candidate_id.0, "cand-9");

    // No payment was opened for the runs that never reached authorization.
    assert!(payments
        .for_request(&follow_up.id.0)
        .expect("store reads")
        .is_empty());
}

#[test]
fn partial_delivery_keeps_captures_within_the_authorization() {
    let (service, payments, _) = build_service();

    let request = service
        .create(&company(), requirements(), None, now())
        .expect("creates");
    service
        .start_processing(&operator(), &request.id, &pool(), now())
        .expect("starts");
    service
        .propose_scope(&operator(), &request.id, Money::usd(99_999), 3, None, now())
        .expect("proposes");
    service
        .approve_scope(&company(), &request.id, now())
        .expect("approves");
    service
        .authorize_payment(&company(), &request.id, PaymentRail::ChainEscrow, now())
        .expect("authorizes");
    service
        .confirm_authorization(&company(), &request.id, None, now())
        .expect("confirms");
    service
        .deliver(
            &operator(),
            &request.id,
            DeliveryOutcome::Partial {
                discount_percent: 33,
            },
            Some("two seats of three".to_string()),
            now(),
        )
        .expect("delivers");

    let records = payments.for_request(&request.id.0).expect("store reads");
    let captured = records[0].amount_captured.expect("captured amount");
    assert!(captured.amount_minor <= records[0].amount_authorized.amount_minor);
    assert_eq!(records[0].status, PaymentStatus::PartiallyCaptured);
}
