//! Append-only audit log of shortlist transitions and payment actions.
//! This is the system of record for dispute resolution: rows are never
//! mutated, deleted, truncated, or compacted.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::shortlist::domain::{RequestId, ShortlistStatus};

/// Who performed a recorded action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorKind {
    System,
    Operator,
    Company,
}

impl ActorKind {
    pub const fn label(self) -> &'static str {
        match self {
            ActorKind::System => "system",
            ActorKind::Operator => "operator",
            ActorKind::Company => "company",
        }
    }
}

/// Everything worth a row in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Submitted,
    ProcessingStarted,
    CandidateReIncluded,
    ScopeProposed,
    PricingApproved,
    PricingDeclined,
    AuthorizationStarted,
    AuthorizationSucceeded,
    AuthorizationFailed,
    AuthorizationConfirmed,
    AuthorizationExpired,
    Delivered,
    CaptureSucceeded,
    PartialCaptureSucceeded,
    ReleaseSucceeded,
    SettlementFailed,
    NoMatch,
    Cancelled,
    AdjustmentSuggested,
    ProcessingResumed,
    SearchExtended,
    NotificationSent,
}

/// One immutable audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShortlistEvent {
    /// Assigned by the store, ascending per append order.
    pub sequence: u64,
    pub request_id: RequestId,
    pub event_type: EventType,
    pub previous_status: Option<ShortlistStatus>,
    pub new_status: Option<ShortlistStatus>,
    pub actor_id: Option<String>,
    pub actor: ActorKind,
    pub metadata: BTreeMap<String, String>,
    pub recorded_at: DateTime<Utc>,
}

/// Unrecorded event handed to the store for sequencing.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub request_id: RequestId,
    pub event_type: EventType,
    pub previous_status: Option<ShortlistStatus>,
    pub new_status: Option<ShortlistStatus>,
    pub actor_id: Option<String>,
    pub actor: ActorKind,
    pub metadata: BTreeMap<String, String>,
    pub recorded_at: DateTime<Utc>,
}

/// Append-only storage for audit rows.
pub trait EventStore: Send + Sync {
    fn append(&self, draft: EventDraft) -> Result<ShortlistEvent, EventLogError>;
    /// Full history for one request, ascending by append order.
    fn for_request(&self, request_id: &RequestId) -> Result<Vec<ShortlistEvent>, EventLogError>;
}

/// Error enumeration for event log failures.
#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    #[error("event log unavailable: {0}")]
    Unavailable(String),
}
