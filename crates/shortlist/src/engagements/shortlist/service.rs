use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use super::domain::{
    CandidateAccess, CandidateSnapshot, CompanyId, EngagementOutcome, OperatorId, RequestId,
    ScopeProposal, ShortlistCandidate, ShortlistRequest, ShortlistStatus, ShortlistView,
};
use super::followup::{classify, FollowUpConfig};
use super::notifications::{
    DispatchError, Notification, NotificationDispatcher, NotificationKind,
};
use super::repository::{RepositoryError, RequestRepository};
use crate::engagements::events::{
    ActorKind, EventDraft, EventLogError, EventStore, EventType, ShortlistEvent,
};
use crate::engagements::matching::domain::CandidateProfile;
use crate::engagements::matching::{MatchContext, RankedCandidate, ScoringConfig, ScoringEngine};
use crate::engagements::payments::domain::{Money, PaymentId, PaymentRail, PaymentView};
use crate::engagements::payments::settlement::{
    PaymentAuthorization, PaymentStore, SettlementAction, SettlementEngine, SettlementError,
    SettlementOutcome,
};
use crate::engagements::payments::AdapterRegistry;

/// Error raised by shortlist orchestration.
#[derive(Debug, thiserror::Error)]
pub enum ShortlistError {
    #[error("{0}")]
    Validation(String),
    #[error("cannot {action}: {reason}")]
    Guard { action: &'static str, reason: String },
    #[error("request was modified concurrently")]
    Conflict,
    #[error("caller may not access this request")]
    Forbidden,
    #[error("request not found")]
    NotFound,
    #[error("payment authorization expired")]
    ExpiredAuthorization,
    #[error(transparent)]
    Settlement(SettlementError),
    #[error(transparent)]
    Repository(RepositoryError),
    #[error(transparent)]
    EventLog(#[from] EventLogError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl From<RepositoryError> for ShortlistError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Conflict => ShortlistError::Conflict,
            RepositoryError::NotFound => ShortlistError::NotFound,
            other => ShortlistError::Repository(other),
        }
    }
}

impl From<SettlementError> for ShortlistError {
    fn from(value: SettlementError) -> Self {
        match value {
            SettlementError::Expired => ShortlistError::ExpiredAuthorization,
            other => ShortlistError::Settlement(other),
        }
    }
}

impl ShortlistError {
    fn guard(action: &'static str, status: ShortlistStatus) -> Self {
        ShortlistError::Guard {
            action,
            reason: format!("request is {}", status.label()),
        }
    }
}

/// Who is calling a read surface.
#[derive(Debug, Clone)]
pub enum Caller {
    Operator(OperatorId),
    Company(CompanyId),
}

/// Outcome the operator records at delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Fulfilled,
    /// Shortlist delivered short of the agreed scope; capture the agreed
    /// price less this discount.
    Partial { discount_percent: u8 },
    NoMatch,
}

static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> RequestId {
    let id = REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    RequestId(format!("req-{id:06}"))
}

fn meta<const N: usize>(pairs: [(&str, String); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Orchestrates the shortlist lifecycle: runs the scoring engine, drives the
/// settlement engine, and records every transition in the audit log.
///
/// Concurrency model: each transition reads the current status and commits
/// through the repository's compare-and-swap `update`; a losing writer gets
/// `Conflict`. Rail calls always happen before the commit, so a network
/// failure leaves the request in its prior state.
pub struct ShortlistService<R, S, E, N> {
    requests: Arc<R>,
    events: Arc<E>,
    dispatcher: Arc<N>,
    settlement: SettlementEngine<S>,
    scoring: ScoringEngine,
    followup: FollowUpConfig,
}

impl<R, S, E, N> ShortlistService<R, S, E, N>
where
    R: RequestRepository,
    S: PaymentStore,
    E: EventStore,
    N: NotificationDispatcher,
{
    pub fn new(requests: Arc<R>, payments: Arc<S>, events: Arc<E>, dispatcher: Arc<N>) -> Self {
        Self {
            requests,
            events,
            dispatcher,
            settlement: SettlementEngine::new(payments, AdapterRegistry::standard()),
            scoring: ScoringEngine::new(ScoringConfig::default()),
            followup: FollowUpConfig::default(),
        }
    }

    pub fn with_settlement(mut self, settlement: SettlementEngine<S>) -> Self {
        self.settlement = settlement;
        self
    }

    pub fn with_scoring(mut self, config: ScoringConfig) -> Self {
        self.scoring = ScoringEngine::new(config);
        self
    }

    pub fn with_followup(mut self, config: FollowUpConfig) -> Self {
        self.followup = config;
        self
    }

    /// Open a new engagement. Follow-up detection runs here: an explicit
    /// link always classifies as a follow-up; otherwise the company's
    /// recent requests are checked for a sufficiently similar one.
    pub fn create(
        &self,
        company: &CompanyId,
        requirements: crate::engagements::matching::RoleRequirements,
        previous_request_id: Option<RequestId>,
        now: DateTime<Utc>,
    ) -> Result<ShortlistRequest, ShortlistError> {
        if requirements.title.trim().is_empty() {
            return Err(ShortlistError::Validation(
                "role title must not be empty".to_string(),
            ));
        }

        let explicit = match &previous_request_id {
            Some(id) => {
                let previous = self.require(id)?;
                if previous.company_id != *company {
                    return Err(ShortlistError::Forbidden);
                }
                Some(previous)
            }
            None => None,
        };

        let since = now - Duration::days(self.followup.window_days);
        let recent = self.requests.recent_for_company(company, since)?;
        let classification = classify(&self.followup, &requirements, explicit.as_ref(), &recent, now);

        let mut request =
            ShortlistRequest::new(next_request_id(), company.clone(), requirements, now);
        request.pricing_type = classification.pricing_type;
        request.follow_up_discount_percent = classification.discount_percent;
        request.previous_request_id = classification.previous_request_id;

        let request = self.requests.insert(request)?;
        self.record(
            &request.id,
            EventType::Submitted,
            None,
            Some(ShortlistStatus::Submitted),
            Some(company.0.clone()),
            ActorKind::Company,
            meta([
                ("pricing_type", request.pricing_type.label().to_string()),
                (
                    "follow_up_discount_percent",
                    request.follow_up_discount_percent.to_string(),
                ),
            ]),
            now,
        )?;
        Ok(request)
    }

    /// Run the scoring engine over the supplied pool and move the request
    /// into processing. Candidates already delivered in the follow-up chain
    /// are excluded.
    pub fn start_processing(
        &self,
        operator: &OperatorId,
        id: &RequestId,
        pool: &[CandidateProfile],
        now: DateTime<Utc>,
    ) -> Result<Vec<ShortlistCandidate>, ShortlistError> {
        let mut request = self.require(id)?;
        if request.status != ShortlistStatus::Submitted {
            return Err(ShortlistError::guard("start processing", request.status));
        }

        let context = self.match_context(&request)?;
        let ranked = self.scoring.rank(pool, &request.requirements, &context, now);
        let rows = self.candidate_rows(&request, &ranked, pool);

        request.status = ShortlistStatus::Processing;
        self.requests
            .update(ShortlistStatus::Submitted, request.clone())?;
        self.requests.store_candidates(id, rows.clone())?;

        self.record(
            id,
            EventType::ProcessingStarted,
            Some(ShortlistStatus::Submitted),
            Some(ShortlistStatus::Processing),
            Some(operator.0.clone()),
            ActorKind::Operator,
            meta([("candidate_count", rows.len().to_string())]),
            now,
        )?;
        self.notify(&request, NotificationKind::ProcessingStarted, now);
        Ok(rows)
    }

    /// Propose price and candidate count to the company. For follow-ups the
    /// time-decayed discount is applied here, so the company approves and
    /// later authorizes exactly the number it saw.
    pub fn propose_scope(
        &self,
        operator: &OperatorId,
        id: &RequestId,
        price: Money,
        candidate_count: u32,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ShortlistRequest, ShortlistError> {
        if price.is_zero() {
            return Err(ShortlistError::Validation(
                "proposed price must be greater than zero".to_string(),
            ));
        }
        if candidate_count == 0 {
            return Err(ShortlistError::Validation(
                "proposed candidate count must be greater than zero".to_string(),
            ));
        }

        let mut request = self.require(id)?;
        if request.status != ShortlistStatus::Processing {
            return Err(ShortlistError::guard("propose scope", request.status));
        }

        let discount = request.follow_up_discount_percent;
        let net_price = price.less_percent(discount);
        request.proposal = Some(ScopeProposal {
            candidate_count,
            price: net_price,
            proposed_at: now,
            notes,
        });
        request.status = ShortlistStatus::PricingPending;
        self.requests
            .update(ShortlistStatus::Processing, request.clone())?;

        self.record(
            id,
            EventType::ScopeProposed,
            Some(ShortlistStatus::Processing),
            Some(ShortlistStatus::PricingPending),
            Some(operator.0.clone()),
            ActorKind::Operator,
            meta([
                ("base_price", price.to_string()),
                ("price", net_price.to_string()),
                ("follow_up_discount_percent", discount.to_string()),
                ("candidate_count", candidate_count.to_string()),
            ]),
            now,
        )?;
        self.notify(&request, NotificationKind::PricingReady, now);
        Ok(request)
    }

    /// Company accepts the proposed scope. No money moves here.
    pub fn approve_scope(
        &self,
        company: &CompanyId,
        id: &RequestId,
        now: DateTime<Utc>,
    ) -> Result<ShortlistRequest, ShortlistError> {
        let mut request = self.owned(company, id)?;
        if request.status != ShortlistStatus::PricingPending {
            return Err(ShortlistError::guard("approve scope", request.status));
        }

        request.status = ShortlistStatus::PricingApproved;
        self.requests
            .update(ShortlistStatus::PricingPending, request.clone())?;

        self.record(
            id,
            EventType::PricingApproved,
            Some(ShortlistStatus::PricingPending),
            Some(ShortlistStatus::PricingApproved),
            Some(company.0.clone()),
            ActorKind::Company,
            BTreeMap::new(),
            now,
        )?;
        self.notify(&request, NotificationKind::PricingApproved, now);
        self.notify(&request, NotificationKind::AuthorizationRequired, now);
        Ok(request)
    }

    /// Company declines the proposed scope. Proposal fields are cleared but
    /// their prior values stay visible in the event metadata.
    pub fn decline_scope(
        &self,
        company: &CompanyId,
        id: &RequestId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ShortlistRequest, ShortlistError> {
        let mut request = self.owned(company, id)?;
        if request.status != ShortlistStatus::PricingPending {
            return Err(ShortlistError::guard("decline scope", request.status));
        }

        let mut metadata = BTreeMap::new();
        if let Some(proposal) = &request.proposal {
            metadata.insert("declined_price".to_string(), proposal.price.to_string());
            metadata.insert(
                "declined_candidate_count".to_string(),
                proposal.candidate_count.to_string(),
            );
        }
        if let Some(reason) = &reason {
            metadata.insert("reason".to_string(), reason.clone());
        }

        request.proposal = None;
        request.status = ShortlistStatus::Processing;
        self.requests
            .update(ShortlistStatus::PricingPending, request.clone())?;

        self.record(
            id,
            EventType::PricingDeclined,
            Some(ShortlistStatus::PricingPending),
            Some(ShortlistStatus::Processing),
            Some(company.0.clone()),
            ActorKind::Company,
            metadata,
            now,
        )?;
        self.notify(&request, NotificationKind::PricingDeclined, now);
        Ok(request)
    }

    /// Reserve funds for the approved scope on the selected rail. The rail
    /// call happens before the status commit; a rail failure leaves the
    /// request approved and retryable with a fresh authorize.
    pub fn authorize_payment(
        &self,
        company: &CompanyId,
        id: &RequestId,
        rail: PaymentRail,
        now: DateTime<Utc>,
    ) -> Result<PaymentAuthorization, ShortlistError> {
        let mut request = self.owned(company, id)?;
        if request.status != ShortlistStatus::PricingApproved {
            return Err(ShortlistError::guard("authorize payment", request.status));
        }
        let proposal = request.proposal.clone().ok_or_else(|| ShortlistError::Guard {
            action: "authorize payment",
            reason: "request has no approved scope proposal".to_string(),
        })?;
        if self.settlement.has_active_payment(&id.0)? {
            return Err(ShortlistError::Guard {
                action: "authorize payment",
                reason: "request already has an active payment".to_string(),
            });
        }

        self.record(
            id,
            EventType::AuthorizationStarted,
            None,
            None,
            Some(company.0.clone()),
            ActorKind::Company,
            meta([
                ("rail", rail.name().to_string()),
                ("amount", proposal.price.to_string()),
            ]),
            now,
        )?;

        let authorization =
            match self
                .settlement
                .authorize(&company.0, &id.0, proposal.price, rail, now)
            {
                Ok(authorization) => authorization,
                Err(err) => {
                    self.record(
                        id,
                        EventType::AuthorizationFailed,
                        None,
                        None,
                        Some(company.0.clone()),
                        ActorKind::Company,
                        meta([
                            ("rail", rail.name().to_string()),
                            ("category", err.public_category().to_string()),
                            ("detail", err.to_string()),
                        ]),
                        now,
                    )?;
                    return Err(err.into());
                }
            };

        request.payment_id = Some(authorization.payment.id.clone());
        request.status = ShortlistStatus::Authorized;
        if let Err(err) = self
            .requests
            .update(ShortlistStatus::PricingApproved, request.clone())
        {
            // Lost the race after reserving funds; give them back.
            self.release_after_lost_race(id, now);
            return Err(err.into());
        }

        self.record(
            id,
            EventType::AuthorizationSucceeded,
            Some(ShortlistStatus::PricingApproved),
            Some(ShortlistStatus::Authorized),
            Some(company.0.clone()),
            ActorKind::Company,
            meta([
                ("payment_id", authorization.payment.id.0.clone()),
                ("rail", rail.name().to_string()),
            ]),
            now,
        )?;
        Ok(authorization)
    }

    /// Record the provider-side confirmation for redirect and escrow rails.
    /// Idempotent; returns whether this call performed the confirmation.
    pub fn confirm_authorization(
        &self,
        company: &CompanyId,
        id: &RequestId,
        provider_reference: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<bool, ShortlistError> {
        let request = self.owned(company, id)?;
        let payment_id = request.payment_id.clone().ok_or(ShortlistError::Guard {
            action: "confirm authorization",
            reason: "request has no payment on file".to_string(),
        })?;

        let performed =
            self.settlement
                .confirm_authorization(&payment_id, provider_reference, now)?;
        if performed {
            self.record(
                id,
                EventType::AuthorizationConfirmed,
                None,
                None,
                Some(company.0.clone()),
                ActorKind::Company,
                meta([("payment_id", payment_id.0)]),
                now,
            )?;
        }
        Ok(performed)
    }

    /// Deliver the shortlist and settle the payment according to the
    /// recorded outcome: full capture, partial capture, or release.
    pub fn deliver(
        &self,
        operator: &OperatorId,
        id: &RequestId,
        outcome: DeliveryOutcome,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ShortlistRequest, ShortlistError> {
        let mut request = self.require(id)?;
        if request.status != ShortlistStatus::Authorized {
            return Err(ShortlistError::guard("deliver", request.status));
        }
        let settlement_outcome = match outcome {
            DeliveryOutcome::Fulfilled => SettlementOutcome::Fulfilled,
            DeliveryOutcome::Partial { discount_percent } => {
                if discount_percent >= 100 {
                    return Err(ShortlistError::Validation(
                        "partial delivery discount must be below 100 percent".to_string(),
                    ));
                }
                SettlementOutcome::Partial { discount_percent }
            }
            DeliveryOutcome::NoMatch => SettlementOutcome::NoMatch,
        };

        let receipt = match self.settlement.finalize(&id.0, settlement_outcome, now) {
            Ok(receipt) => receipt,
            Err(SettlementError::Expired) => {
                return self.handle_expired_authorization(operator, request, now)
            }
            Err(err) => {
                self.record(
                    id,
                    EventType::SettlementFailed,
                    None,
                    None,
                    Some(operator.0.clone()),
                    ActorKind::Operator,
                    meta([
                        ("manual_reconciliation", "true".to_string()),
                        ("category", err.public_category().to_string()),
                        ("detail", err.to_string()),
                    ]),
                    now,
                )?;
                return Err(err.into());
            }
        };

        let (action_event, amount) = match receipt.action {
            SettlementAction::Captured(amount) => (EventType::CaptureSucceeded, Some(amount)),
            SettlementAction::PartiallyCaptured(amount) => {
                (EventType::PartialCaptureSucceeded, Some(amount))
            }
            SettlementAction::Released => (EventType::ReleaseSucceeded, None),
        };
        let mut action_meta = meta([("payment_id", receipt.payment.id.0.clone())]);
        if let Some(amount) = amount {
            action_meta.insert("amount".to_string(), amount.to_string());
        }
        self.record(
            id,
            action_event,
            None,
            None,
            Some(operator.0.clone()),
            ActorKind::Operator,
            action_meta,
            now,
        )?;

        let (final_status, final_outcome, transition_event) = match outcome {
            DeliveryOutcome::Fulfilled => (
                ShortlistStatus::Completed,
                EngagementOutcome::Fulfilled,
                EventType::Delivered,
            ),
            DeliveryOutcome::Partial { .. } => (
                ShortlistStatus::Completed,
                EngagementOutcome::Partial,
                EventType::Delivered,
            ),
            DeliveryOutcome::NoMatch => (
                ShortlistStatus::NoMatch,
                EngagementOutcome::NoMatch,
                EventType::NoMatch,
            ),
        };
        request.status = final_status;
        request.outcome = final_outcome;
        request.outcome_reason = reason;
        self.requests
            .update(ShortlistStatus::Authorized, request.clone())?;

        self.record(
            id,
            transition_event,
            Some(ShortlistStatus::Authorized),
            Some(final_status),
            Some(operator.0.clone()),
            ActorKind::Operator,
            meta([("outcome", final_outcome.label().to_string())]),
            now,
        )?;

        match outcome {
            DeliveryOutcome::NoMatch => self.notify(&request, NotificationKind::NoMatch, now),
            _ => {
                self.notify(&request, NotificationKind::Delivered, now);
                self.notify(&request, NotificationKind::Completed, now);
            }
        }
        Ok(request)
    }

    /// Close the engagement without a shortlist. Releases any held funds.
    /// Irreversible once committed.
    pub fn mark_no_match(
        &self,
        operator: &OperatorId,
        id: &RequestId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ShortlistRequest, ShortlistError> {
        let mut request = self.require(id)?;
        if request.status.is_terminal() || request.status.candidates_delivered() {
            return Err(ShortlistError::guard("mark no-match", request.status));
        }

        self.release_held_funds(&request, &operator.0, ActorKind::Operator, now)?;

        let previous = request.status;
        request.status = ShortlistStatus::NoMatch;
        request.outcome = EngagementOutcome::NoMatch;
        request.outcome_reason = reason;
        self.requests.update(previous, request.clone())?;

        self.record(
            id,
            EventType::NoMatch,
            Some(previous),
            Some(ShortlistStatus::NoMatch),
            Some(operator.0.clone()),
            ActorKind::Operator,
            BTreeMap::new(),
            now,
        )?;
        self.notify(&request, NotificationKind::NoMatch, now);
        Ok(request)
    }

    /// Ask the company for brief changes before continuing the search.
    pub fn suggest_adjustment(
        &self,
        operator: &OperatorId,
        id: &RequestId,
        note: String,
        now: DateTime<Utc>,
    ) -> Result<ShortlistRequest, ShortlistError> {
        let mut request = self.require(id)?;
        if request.status != ShortlistStatus::Processing {
            return Err(ShortlistError::guard("suggest adjustment", request.status));
        }

        request.status = ShortlistStatus::AwaitingAdjustment;
        self.requests
            .update(ShortlistStatus::Processing, request.clone())?;

        self.record(
            id,
            EventType::AdjustmentSuggested,
            Some(ShortlistStatus::Processing),
            Some(ShortlistStatus::AwaitingAdjustment),
            Some(operator.0.clone()),
            ActorKind::Operator,
            meta([("note", note)]),
            now,
        )?;
        self.notify(&request, NotificationKind::AdjustmentSuggested, now);
        Ok(request)
    }

    /// Resume the search after an adjustment round.
    pub fn resume_processing(
        &self,
        operator: &OperatorId,
        id: &RequestId,
        now: DateTime<Utc>,
    ) -> Result<ShortlistRequest, ShortlistError> {
        let mut request = self.require(id)?;
        if request.status != ShortlistStatus::AwaitingAdjustment {
            return Err(ShortlistError::guard("resume processing", request.status));
        }

        request.status = ShortlistStatus::Processing;
        self.requests
            .update(ShortlistStatus::AwaitingAdjustment, request.clone())?;

        self.record(
            id,
            EventType::ProcessingResumed,
            Some(ShortlistStatus::AwaitingAdjustment),
            Some(ShortlistStatus::Processing),
            Some(operator.0.clone()),
            ActorKind::Operator,
            BTreeMap::new(),
            now,
        )?;
        Ok(request)
    }

    /// Widen the search window without changing state.
    pub fn extend_search(
        &self,
        operator: &OperatorId,
        id: &RequestId,
        additional_days: u32,
        now: DateTime<Utc>,
    ) -> Result<(), ShortlistError> {
        if additional_days == 0 {
            return Err(ShortlistError::Validation(
                "search extension must add at least one day".to_string(),
            ));
        }
        let request = self.require(id)?;
        if request.status != ShortlistStatus::Processing {
            return Err(ShortlistError::guard("extend search", request.status));
        }

        self.record(
            id,
            EventType::SearchExtended,
            None,
            None,
            Some(operator.0.clone()),
            ActorKind::Operator,
            meta([("additional_days", additional_days.to_string())]),
            now,
        )?;
        self.notify(&request, NotificationKind::SearchExtended, now);
        Ok(())
    }

    /// Cancel a non-terminal engagement, releasing any held funds.
    pub fn cancel(
        &self,
        caller: &Caller,
        id: &RequestId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ShortlistRequest, ShortlistError> {
        let mut request = match caller {
            Caller::Company(company) => self.owned(company, id)?,
            Caller::Operator(_) => self.require(id)?,
        };
        if request.status.is_terminal() {
            return Err(ShortlistError::guard("cancel", request.status));
        }

        let (actor_id, actor_kind) = actor_of(caller);
        self.release_held_funds(&request, &actor_id, actor_kind, now)?;

        let previous = request.status;
        request.status = ShortlistStatus::Cancelled;
        request.outcome = EngagementOutcome::Cancelled;
        request.outcome_reason = reason;
        self.requests.update(previous, request.clone())?;

        self.record(
            id,
            EventType::Cancelled,
            Some(previous),
            Some(ShortlistStatus::Cancelled),
            Some(actor_id),
            actor_kind,
            BTreeMap::new(),
            now,
        )?;
        Ok(request)
    }

    /// Operator override of the chain exclusion set. Requires a reason and
    /// that the candidate was actually recommended earlier in the chain.
    pub fn re_include_candidate(
        &self,
        operator: &OperatorId,
        id: &RequestId,
        profile: &CandidateProfile,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<ShortlistCandidate, ShortlistError> {
        if reason.trim().is_empty() {
            return Err(ShortlistError::Validation(
                "re-inclusion requires a reason".to_string(),
            ));
        }
        let request = self.require(id)?;
        if request.status != ShortlistStatus::Processing {
            return Err(ShortlistError::guard("re-include candidate", request.status));
        }

        let previously_in = self
            .chain(&request)?
            .into_iter()
            .find_map(|prior| {
                let rows = self.requests.candidates(&prior.id).ok()?;
                rows.iter()
                    .any(|row| row.candidate_id == profile.id)
                    .then(|| prior.id.clone())
            })
            .ok_or_else(|| {
                ShortlistError::Validation(
                    "candidate was not previously recommended in this chain".to_string(),
                )
            })?;

        let mut context = self.match_context(&request)?;
        context
            .re_included
            .insert(profile.id.clone(), reason.clone());
        let (components, score) =
            self.scoring
                .score_profile(profile, &request.requirements, &context, now);
        let match_reason = components
            .iter()
            .max_by(|a, b| {
                a.points
                    .partial_cmp(&b.points)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|component| component.note.clone())
            .unwrap_or_default();

        let existing = self.requests.candidates(id)?;
        let row = ShortlistCandidate {
            request_id: id.clone(),
            candidate_id: profile.id.clone(),
            match_score: score.round().clamp(0.0, 100.0) as u8,
            match_reason,
            rank: existing.len() as u32 + 1,
            admin_approved: false,
            is_new: false,
            previously_recommended_in: Some(previously_in.clone()),
            re_inclusion_reason: Some(reason.clone()),
            snapshot: snapshot_of(profile),
        };
        self.requests.append_candidate(row.clone())?;

        self.record(
            id,
            EventType::CandidateReIncluded,
            None,
            None,
            Some(operator.0.clone()),
            ActorKind::Operator,
            meta([
                ("candidate_id", profile.id.0.clone()),
                ("previously_recommended_in", previously_in.0),
                ("reason", reason),
            ]),
            now,
        )?;
        Ok(row)
    }

    /// Role-appropriate read. Companies see only their own requests, and an
    /// anonymized preview until delivery; operators see everything.
    pub fn get(&self, caller: &Caller, id: &RequestId) -> Result<ShortlistView, ShortlistError> {
        let request = self.require(id)?;
        let candidates = self.requests.candidates(id)?;
        let access = match caller {
            Caller::Operator(_) => CandidateAccess::Full(candidates),
            Caller::Company(company) => {
                if request.company_id != *company {
                    return Err(ShortlistError::Forbidden);
                }
                if request.status.candidates_delivered() {
                    CandidateAccess::Full(candidates)
                } else {
                    CandidateAccess::Preview(
                        candidates.iter().map(ShortlistCandidate::preview).collect(),
                    )
                }
            }
        };
        Ok(ShortlistView::for_request(&request, access))
    }

    /// Full audit history, operator-only.
    pub fn events(
        &self,
        _operator: &OperatorId,
        id: &RequestId,
    ) -> Result<Vec<ShortlistEvent>, ShortlistError> {
        self.require(id)?;
        Ok(self.events.for_request(id)?)
    }

    /// Payment status, scoped to the owning company.
    pub fn payment_view(
        &self,
        caller: &Caller,
        payment_id: &PaymentId,
    ) -> Result<PaymentView, ShortlistError> {
        let payment = self.settlement.payment(payment_id)?;
        if let Caller::Company(company) = caller {
            if payment.company_id != company.0 {
                return Err(ShortlistError::Forbidden);
            }
        }
        Ok(payment.view())
    }

    /// Liveness of the request's authorization, for operator tooling.
    pub fn authorization_valid(
        &self,
        id: &RequestId,
        now: DateTime<Utc>,
    ) -> Result<bool, ShortlistError> {
        let request = self.require(id)?;
        match request.payment_id {
            Some(payment_id) => Ok(self.settlement.is_authorization_valid(&payment_id, now)?),
            None => Ok(false),
        }
    }

    /// Manual resend path: bypasses the once-per-kind ledger and records
    /// the resend in the audit log.
    pub fn resend_notification(
        &self,
        operator: &OperatorId,
        id: &RequestId,
        kind: NotificationKind,
        now: DateTime<Utc>,
    ) -> Result<(), ShortlistError> {
        let request = self.require(id)?;
        self.dispatcher.dispatch(Notification {
            request_id: id.clone(),
            company_id: request.company_id.clone(),
            kind,
            is_resend: true,
        })?;
        self.record(
            id,
            EventType::NotificationSent,
            None,
            None,
            Some(operator.0.clone()),
            ActorKind::Operator,
            meta([
                ("kind", kind.label().to_string()),
                ("is_resend", "true".to_string()),
            ]),
            now,
        )?;
        Ok(())
    }

    fn require(&self, id: &RequestId) -> Result<ShortlistRequest, ShortlistError> {
        self.requests.fetch(id)?.ok_or(ShortlistError::NotFound)
    }

    fn owned(
        &self,
        company: &CompanyId,
        id: &RequestId,
    ) -> Result<ShortlistRequest, ShortlistError> {
        let request = self.require(id)?;
        if request.company_id != *company {
            return Err(ShortlistError::Forbidden);
        }
        Ok(request)
    }

    /// The follow-up chain ending at this request, oldest links last.
    fn chain(&self, request: &ShortlistRequest) -> Result<Vec<ShortlistRequest>, ShortlistError> {
        let mut chain = Vec::new();
        let mut seen: BTreeSet<RequestId> = BTreeSet::new();
        let mut cursor = request.previous_request_id.clone();
        while let Some(id) = cursor {
            if !seen.insert(id.clone()) {
                break;
            }
            match self.requests.fetch(&id)? {
                Some(prior) => {
                    cursor = prior.previous_request_id.clone();
                    chain.push(prior);
                }
                None => break,
            }
        }
        Ok(chain)
    }

    fn match_context(&self, request: &ShortlistRequest) -> Result<MatchContext, ShortlistError> {
        let mut excluded = BTreeSet::new();
        let mut previous_created_at = None;
        for prior in self.chain(request)? {
            if previous_created_at.is_none() {
                previous_created_at = Some(prior.created_at);
            }
            if prior.status.candidates_delivered() {
                for row in self.requests.candidates(&prior.id)? {
                    excluded.insert(row.candidate_id);
                }
            }
        }
        Ok(MatchContext {
            excluded,
            re_included: BTreeMap::new(),
            follow_up: request.previous_request_id.is_some(),
            previous_created_at,
        })
    }

    fn candidate_rows(
        &self,
        request: &ShortlistRequest,
        ranked: &[RankedCandidate],
        pool: &[CandidateProfile],
    ) -> Vec<ShortlistCandidate> {
        let chain_head = request.previous_request_id.clone();
        ranked
            .iter()
            .filter_map(|candidate| {
                let profile = pool.iter().find(|p| p.id == candidate.candidate_id)?;
                let is_new = candidate.re_inclusion_reason.is_none();
                Some(ShortlistCandidate {
                    request_id: request.id.clone(),
                    candidate_id: candidate.candidate_id.clone(),
                    match_score: candidate.rounded_score(),
                    match_reason: candidate.match_reason.clone(),
                    rank: candidate.rank,
                    admin_approved: false,
                    is_new,
                    previously_recommended_in: if is_new { None } else { chain_head.clone() },
                    re_inclusion_reason: candidate.re_inclusion_reason.clone(),
                    snapshot: snapshot_of(profile),
                })
            })
            .collect()
    }

    fn release_held_funds(
        &self,
        request: &ShortlistRequest,
        actor_id: &str,
        actor: ActorKind,
        now: DateTime<Utc>,
    ) -> Result<(), ShortlistError> {
        if request.payment_id.is_none() || !self.settlement.has_active_payment(&request.id.0)? {
            return Ok(());
        }
        match self
            .settlement
            .finalize(&request.id.0, SettlementOutcome::NoMatch, now)
        {
            Ok(receipt) => {
                self.record(
                    &request.id,
                    EventType::ReleaseSucceeded,
                    None,
                    None,
                    Some(actor_id.to_string()),
                    actor,
                    meta([("payment_id", receipt.payment.id.0)]),
                    now,
                )?;
                Ok(())
            }
            Err(SettlementError::Expired) => Ok(()),
            Err(err) => {
                self.record(
                    &request.id,
                    EventType::SettlementFailed,
                    None,
                    None,
                    Some(actor_id.to_string()),
                    actor,
                    meta([
                        ("manual_reconciliation", "true".to_string()),
                        ("detail", err.to_string()),
                    ]),
                    now,
                )?;
                Err(err.into())
            }
        }
    }

    fn handle_expired_authorization(
        &self,
        operator: &OperatorId,
        mut request: ShortlistRequest,
        now: DateTime<Utc>,
    ) -> Result<ShortlistRequest, ShortlistError> {
        request.status = ShortlistStatus::PricingApproved;
        request.payment_id = None;
        self.requests
            .update(ShortlistStatus::Authorized, request.clone())?;
        self.record(
            &request.id,
            EventType::AuthorizationExpired,
            Some(ShortlistStatus::Authorized),
            Some(ShortlistStatus::PricingApproved),
            Some(operator.0.clone()),
            ActorKind::Operator,
            BTreeMap::new(),
            now,
        )?;
        self.notify(&request, NotificationKind::AuthorizationRequired, now);
        Err(ShortlistError::ExpiredAuthorization)
    }

    fn release_after_lost_race(&self, id: &RequestId, now: DateTime<Utc>) {
        match self
            .settlement
            .finalize(&id.0, SettlementOutcome::NoMatch, now)
        {
            Ok(_) => {
                let _ = self.record(
                    id,
                    EventType::ReleaseSucceeded,
                    None,
                    None,
                    None,
                    ActorKind::System,
                    meta([("reason", "lost transition race".to_string())]),
                    now,
                );
            }
            Err(err) => {
                warn!(request = %id.0, error = %err, "failed to release authorization after lost race");
                let _ = self.record(
                    id,
                    EventType::SettlementFailed,
                    None,
                    None,
                    None,
                    ActorKind::System,
                    meta([
                        ("manual_reconciliation", "true".to_string()),
                        ("detail", err.to_string()),
                    ]),
                    now,
                );
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        request_id: &RequestId,
        event_type: EventType,
        previous_status: Option<ShortlistStatus>,
        new_status: Option<ShortlistStatus>,
        actor_id: Option<String>,
        actor: ActorKind,
        metadata: BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Result<ShortlistEvent, ShortlistError> {
        Ok(self.events.append(EventDraft {
            request_id: request_id.clone(),
            event_type,
            previous_status,
            new_status,
            actor_id,
            actor,
            metadata,
            recorded_at: now,
        })?)
    }

    /// Once-per-kind notification with the sent ledger derived from the
    /// audit log. Dispatch failures are logged and never block a
    /// transition; the kind stays unsent and eligible for retry.
    fn notify(&self, request: &ShortlistRequest, kind: NotificationKind, now: DateTime<Utc>) {
        let already_sent = match self.events.for_request(&request.id) {
            Ok(events) => events.iter().any(|event| {
                event.event_type == EventType::NotificationSent
                    && event.metadata.get("kind").map(String::as_str) == Some(kind.label())
                    && event.metadata.get("is_resend").map(String::as_str) != Some("true")
            }),
            Err(err) => {
                warn!(request = %request.id.0, error = %err, "could not read notification ledger");
                return;
            }
        };
        if already_sent {
            return;
        }

        let notification = Notification {
            request_id: request.id.clone(),
            company_id: request.company_id.clone(),
            kind,
            is_resend: false,
        };
        if let Err(err) = self.dispatcher.dispatch(notification) {
            warn!(
                request = %request.id.0,
                kind = kind.label(),
                error = %err,
                "notification dispatch failed; will retry on next transition"
            );
            return;
        }
        let _ = self.record(
            &request.id,
            EventType::NotificationSent,
            None,
            None,
            None,
            ActorKind::System,
            meta([("kind", kind.label().to_string())]),
            now,
        );
    }
}

fn actor_of(caller: &Caller) -> (String, ActorKind) {
    match caller {
        Caller::Operator(operator) => (operator.0.clone(), ActorKind::Operator),
        Caller::Company(company) => (company.0.clone(), ActorKind::Company),
    }
}

fn snapshot_of(profile: &CandidateProfile) -> CandidateSnapshot {
    let mut skills: Vec<&crate::engagements::matching::SkillClaim> = profile.skills.iter().collect();
    skills.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    CandidateSnapshot {
        role_title: profile.role_title.clone(),
        seniority: profile.seniority,
        top_skills: skills.iter().take(3).map(|claim| claim.name.clone()).collect(),
        region: profile.location.country.clone(),
        availability: profile.availability,
    }
}
