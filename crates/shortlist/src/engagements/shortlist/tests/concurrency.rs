use std::sync::Arc;

use super::common::*;
use crate::engagements::events::EventType;
use crate::engagements::payments::domain::PaymentStatus;
use crate::engagements::payments::settlement::PaymentStore;
use crate::engagements::shortlist::domain::ShortlistStatus;
use crate::engagements::shortlist::repository::RequestRepository;
use crate::engagements::shortlist::service::{Caller, ShortlistError, ShortlistService};

/// Two writers racing on the same transition: the one committing against a
/// stale read must lose with a conflict, and the log must record the
/// transition exactly once.
#[test]
fn losing_writer_gets_a_conflict_and_no_duplicate_transition() {
    let (service, requests, payments, events, dispatcher) = build_service();
    let request = service
        .create(&company(), requirements(), None, now())
        .expect("creates");
    service
        .start_processing(&operator(), &request.id, &pool(), now())
        .expect("starts");
    service
        .propose_scope(
            &operator(),
            &request.id,
            crate::engagements::payments::domain::Money::usd(90_000),
            3,
            None,
            now(),
        )
        .expect("proposes");

    // Second writer reads the request while pricing is still pending.
    let stale_repo = Arc::new(SnapshotRequests::new(requests.clone()));
    stale_repo.pin(&request.id);
    let stale_writer = ShortlistService::new(
        stale_repo,
        payments.clone(),
        events.clone(),
        dispatcher.clone(),
    );

    // First writer commits the approval.
    service
        .approve_scope(&company(), &request.id, now())
        .expect("first writer wins");

    let err = stale_writer
        .approve_scope(&company(), &request.id, now())
        .expect_err("second writer loses");
    assert!(matches!(err, ShortlistError::Conflict));

    let stored = requests
        .fetch(&request.id)
        .expect("fetches")
        .expect("present");
    assert_eq!(stored.status, ShortlistStatus::PricingApproved);
    assert_eq!(
        events_of_type(&events, &request.id, EventType::PricingApproved).len(),
        1,
        "only the winning writer may log the transition"
    );
}

/// A writer that reserves funds and then loses the status race must give
/// the funds back instead of leaving a dangling hold.
#[test]
fn authorization_losing_the_race_releases_the_reserved_funds() {
    let (service, requests, payments, events, dispatcher) = build_service();
    let id = approved_request(&service);

    let stale_repo = Arc::new(SnapshotRequests::new(requests.clone()));
    stale_repo.pin(&id);
    let stale_writer = ShortlistService::new(
        stale_repo,
        payments.clone(),
        events.clone(),
        dispatcher.clone(),
    );

    // The company withdraws while the stale writer still sees an approved
    // scope.
    service
        .cancel(&Caller::Company(company()), &id, None, now())
        .expect("cancels");

    let err = stale_writer
        .authorize_payment(&company(), &id, rail(), now())
        .expect_err("commit loses the race");
    assert!(matches!(err, ShortlistError::Conflict));

    let records = payments.for_request(&id.0).expect("store reads");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, PaymentStatus::Released);

    let releases = events_of_type(&events, &id, EventType::ReleaseSucceeded);
    assert_eq!(releases.len(), 1);
    assert_eq!(
        releases[0].metadata.get("reason"),
        Some(&"lost transition race".to_string())
    );

    let stored = requests.fetch(&id).expect("fetches").expect("present");
    assert_eq!(stored.status, ShortlistStatus::Cancelled);
}

/// Repository outages surface as repository errors, not panics or silent
/// state changes.
#[test]
fn unavailable_repository_surfaces_cleanly() {
    let service = ShortlistService::new(
        Arc::new(UnavailableRequests),
        Arc::new(MemoryPayments::default()),
        Arc::new(MemoryEvents::default()),
        Arc::new(MemoryDispatcher::default()),
    );

    match service.create(&company(), requirements(), None, now()) {
        Err(ShortlistError::Repository(_)) => {}
        other => panic!("expected repository error, got {other:?}"),
    }
}
