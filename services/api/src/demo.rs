use crate::infra::{
    InMemoryEventStore, InMemoryPaymentStore, InMemoryRequestRepository,
    TracingNotificationDispatcher,
};
use chrono::{DateTime, Duration, Utc};
use clap::Args;
use shortlist::engagements::matching::{
    Availability, CandidateId, CandidateLocation, CandidateProfile, HiringLocation,
    RoleRequirements, SeniorityLevel, SkillClaim,
};
use shortlist::engagements::payments::{Money, PaymentRail};
use shortlist::engagements::shortlist::{CompanyId, DeliveryOutcome, OperatorId, ShortlistService};
use shortlist::error::AppError;
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Deliver a reduced shortlist with this discount percentage instead
    /// of a full delivery.
    #[arg(long)]
    pub(crate) partial_discount: Option<u8>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let now = Utc::now();
    let company = CompanyId("acme".to_string());
    let operator = OperatorId("op-demo".to_string());

    let requests = Arc::new(InMemoryRequestRepository::default());
    let payments = Arc::new(InMemoryPaymentStore::default());
    let events = Arc::new(InMemoryEventStore::default());
    let dispatcher = Arc::new(TracingNotificationDispatcher::default());
    let service = ShortlistService::new(requests, payments, events, dispatcher);

    println!("Shortlist broker demo");

    let request = service.create(&company, demo_requirements(), None, now)?;
    println!(
        "\nSubmitted {} for {} ({})",
        request.id.0,
        request.requirements.title,
        request.status.label()
    );

    let rows = service.start_processing(&operator, &request.id, &demo_pool(now), now)?;
    println!("\nRanked {} candidates:", rows.len());
    for row in &rows {
        println!(
            "  #{} {} (score {}) {}",
            row.rank, row.snapshot.role_title, row.match_score, row.match_reason
        );
    }

    let priced = service.propose_scope(
        &operator,
        &request.id,
        Money::usd(150_000),
        rows.len() as u32,
        Some("initial curated batch".to_string()),
        now,
    )?;
    if let Some(proposal) = &priced.proposal {
        println!(
            "\nScope proposed: {} candidates for {}",
            proposal.candidate_count, proposal.price
        );
    }

    service.approve_scope(&company, &request.id, now)?;
    println!("Scope approved by {}", company.0);

    let authorization =
        service.authorize_payment(&company, &request.id, PaymentRail::CardGateway, now)?;
    println!(
        "Authorized {} on {}",
        authorization.payment.amount_authorized,
        authorization.payment.provider.name()
    );

    let outcome = match args.partial_discount {
        Some(discount_percent) => DeliveryOutcome::Partial { discount_percent },
        None => DeliveryOutcome::Fulfilled,
    };
    let delivered = service.deliver(&operator, &request.id, outcome, None, now)?;
    println!(
        "\nDelivered: status {} outcome {}",
        delivered.status.label(),
        delivered.outcome.label()
    );

    let trail = service.events(&operator, &request.id)?;
    println!("\nAudit trail ({} rows):", trail.len());
    for event in &trail {
        println!(
            "  {:>3}  {:?} by {}",
            event.sequence,
            event.event_type,
            event.actor.label()
        );
    }

    Ok(())
}

fn demo_requirements() -> RoleRequirements {
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

fn demo_profile(id: &str, now: DateTime<Utc>) -> CandidateProfile {
    CandidateProfile {
        id: CandidateId(id.to_string()),
        role_title: "Backend Engineer".to_string(),
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
        joined_at: now - Duration::days(400),
        last_active_at: now - Duration::days(3),
        profile_updated_at: now - Duration::days(10),
        latest_recommendation_at: Some(now - Duration::days(30)),
    }
}

fn demo_pool(now: DateTime<Utc>) -> Vec<CandidateProfile> {
    vec![
        demo_profile("cand-1", now),
        demo_profile("cand-2", now),
        demo_profile("cand-3", now),
    ]
}
