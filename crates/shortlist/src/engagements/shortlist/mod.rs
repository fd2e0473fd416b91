//! Shortlist request lifecycle: intake, scoring, scope pricing, payment
//! authorization, delivery, and the terminal outcomes. The service here is
//! the only writer of request state; every transition goes through the
//! repository's compare-and-swap and leaves a row in the audit log.

pub mod domain;
pub mod followup;
pub mod notifications;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    CandidateAccess, CandidatePreview, CandidateSnapshot, CompanyId, EngagementOutcome,
    OperatorId, PricingType, RequestId, ScopeProposal, ShortlistCandidate, ShortlistRequest,
    ShortlistStatus, ShortlistView,
};
pub use followup::{classify, FollowUpClassification, FollowUpConfig};
pub use notifications::{DispatchError, Notification, NotificationDispatcher, NotificationKind};
pub use repository::{RepositoryError, RequestRepository};
pub use router::shortlist_router;
pub use service::{Caller, DeliveryOutcome, ShortlistError, ShortlistService};
