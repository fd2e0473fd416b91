use serde::{Deserialize, Serialize};

use super::domain::{CompanyId, RequestId};

/// Lifecycle moments the notification collaborator renders into email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ProcessingStarted,
    PricingReady,
    PricingApproved,
    PricingDeclined,
    AuthorizationRequired,
    Delivered,
    Completed,
    NoMatch,
    AdjustmentSuggested,
    SearchExtended,
}

impl NotificationKind {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationKind::ProcessingStarted => "processing_started",
            NotificationKind::PricingReady => "pricing_ready",
            NotificationKind::PricingApproved => "pricing_approved",
            NotificationKind::PricingDeclined => "pricing_declined",
            NotificationKind::AuthorizationRequired => "authorization_required",
            NotificationKind::Delivered => "delivered",
            NotificationKind::Completed => "completed",
            NotificationKind::NoMatch => "no_match",
            NotificationKind::AdjustmentSuggested => "adjustment_suggested",
            NotificationKind::SearchExtended => "search_extended",
        }
    }
}

/// Payload handed to the dispatch collaborator. Template rendering and
/// delivery live outside the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub request_id: RequestId,
    pub company_id: CompanyId,
    pub kind: NotificationKind,
    pub is_resend: bool,
}

/// Outbound dispatch hook. Implementations must not block the caller on
/// delivery; handing the notification to a queue counts as dispatched.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, notification: Notification) -> Result<(), DispatchError>;
}

/// Dispatch hand-off error.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
