use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engagements::matching::domain::{Availability, CandidateId, RoleRequirements, SeniorityLevel};
use crate::engagements::payments::domain::{Money, PaymentId};

/// Identifier wrapper for shortlist requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(pub String);

/// Identifier wrapper for hiring companies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompanyId(pub String);

/// Identifier wrapper for curation operators.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperatorId(pub String);

/// Lifecycle state of a shortlist request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortlistStatus {
    Submitted,
    Processing,
    AwaitingAdjustment,
    PricingPending,
    PricingApproved,
    Authorized,
    Delivered,
    Completed,
    NoMatch,
    Cancelled,
}

impl ShortlistStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ShortlistStatus::Submitted => "submitted",
            ShortlistStatus::Processing => "processing",
            ShortlistStatus::AwaitingAdjustment => "awaiting_adjustment",
            ShortlistStatus::PricingPending => "pricing_pending",
            ShortlistStatus::PricingApproved => "pricing_approved",
            ShortlistStatus::Authorized => "authorized",
            ShortlistStatus::Delivered => "delivered",
            ShortlistStatus::Completed => "completed",
            ShortlistStatus::NoMatch => "no_match",
            ShortlistStatus::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ShortlistStatus::Completed | ShortlistStatus::NoMatch | ShortlistStatus::Cancelled
        )
    }

    /// Candidate identities stay withheld until the engagement completes.
    pub const fn candidates_delivered(self) -> bool {
        matches!(self, ShortlistStatus::Delivered | ShortlistStatus::Completed)
    }
}

/// How the engagement is priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingType {
    New,
    FollowUp,
    FreeRegen,
}

impl PricingType {
    pub const fn label(self) -> &'static str {
        match self {
            PricingType::New => "new",
            PricingType::FollowUp => "follow_up",
            PricingType::FreeRegen => "free_regen",
        }
    }
}

/// Recorded result of the engagement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementOutcome {
    Pending,
    Fulfilled,
    Partial,
    NoMatch,
    Cancelled,
}

impl EngagementOutcome {
    pub const fn label(self) -> &'static str {
        match self {
            EngagementOutcome::Pending => "pending",
            EngagementOutcome::Fulfilled => "fulfilled",
            EngagementOutcome::Partial => "partial",
            EngagementOutcome::NoMatch => "no_match",
            EngagementOutcome::Cancelled => "cancelled",
        }
    }
}

/// Operator's price and expected-candidate-count offer, populated only
/// while pricing is pending or after approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeProposal {
    pub candidate_count: u32,
    pub price: Money,
    pub proposed_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// A company's request for a priced, curated candidate shortlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortlistRequest {
    pub id: RequestId,
    pub company_id: CompanyId,
    pub requirements: RoleRequirements,
    pub status: ShortlistStatus,
    pub previous_request_id: Option<RequestId>,
    pub pricing_type: PricingType,
    pub follow_up_discount_percent: u8,
    pub proposal: Option<ScopeProposal>,
    pub outcome: EngagementOutcome,
    pub outcome_reason: Option<String>,
    pub payment_id: Option<PaymentId>,
    pub created_at: DateTime<Utc>,
}

impl ShortlistRequest {
    pub fn new(
        id: RequestId,
        company_id: CompanyId,
        requirements: RoleRequirements,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            company_id,
            requirements,
            status: ShortlistStatus::Submitted,
            previous_request_id: None,
            pricing_type: PricingType::New,
            follow_up_discount_percent: 0,
            proposal: None,
            outcome: EngagementOutcome::Pending,
            outcome_reason: None,
            payment_id: None,
            created_at,
        }
    }
}

/// Identity-free candidate facts captured at scoring time, so pre-delivery
/// previews never consult the external directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSnapshot {
    pub role_title: String,
    pub seniority: SeniorityLevel,
    pub top_skills: Vec<String>,
    pub region: String,
    pub availability: Availability,
}

/// Join of a shortlist request and a candidate identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortlistCandidate {
    pub request_id: RequestId,
    pub candidate_id: CandidateId,
    /// 0-100.
    pub match_score: u8,
    pub match_reason: String,
    /// Dense ranking, 1-based, unique per request.
    pub rank: u32,
    pub admin_approved: bool,
    pub is_new: bool,
    pub previously_recommended_in: Option<RequestId>,
    pub re_inclusion_reason: Option<String>,
    pub snapshot: CandidateSnapshot,
}

/// Anonymized pre-delivery view of a shortlisted candidate.
#[derive(Debug, Clone, Serialize)]
pub struct CandidatePreview {
    pub rank: u32,
    pub role_title: String,
    pub seniority: &'static str,
    pub top_skills: Vec<String>,
    pub region: String,
    pub availability: &'static str,
    pub match_reason: String,
}

impl ShortlistCandidate {
    pub fn preview(&self) -> CandidatePreview {
        CandidatePreview {
            rank: self.rank,
            role_title: self.snapshot.role_title.clone(),
            seniority: self.snapshot.seniority.label(),
            top_skills: self.snapshot.top_skills.clone(),
            region: self.snapshot.region.clone(),
            availability: self.snapshot.availability.label(),
            match_reason: self.match_reason.clone(),
        }
    }
}

/// Candidate portion of a request view, scoped to what the caller may see.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "visibility", content = "candidates")]
pub enum CandidateAccess {
    Preview(Vec<CandidatePreview>),
    Full(Vec<ShortlistCandidate>),
}

/// Role-appropriate read model for a shortlist request.
#[derive(Debug, Clone, Serialize)]
pub struct ShortlistView {
    pub request_id: RequestId,
    pub status: &'static str,
    pub pricing_type: &'static str,
    pub follow_up_discount_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal: Option<ScopeProposal>,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<PaymentId>,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub candidates: CandidateAccess,
}

impl ShortlistView {
    pub fn for_request(request: &ShortlistRequest, candidates: CandidateAccess) -> Self {
        Self {
            request_id: request.id.clone(),
            status: request.status.label(),
            pricing_type: request.pricing_type.label(),
            follow_up_discount_percent: request.follow_up_discount_percent,
            proposal: request.proposal.clone(),
            outcome: request.outcome.label(),
            outcome_reason: request.outcome_reason.clone(),
            payment_id: request.payment_id.clone(),
            created_at: request.created_at,
            candidates,
        }
    }
}
