use serde::Serialize;

use super::domain::{Money, PaymentId, PaymentRail};

/// Input for an authorize call. Adapters receive everything they need here;
/// they hold no per-payment state of their own.
#[derive(Debug, Clone)]
pub struct AuthorizeRequest {
    pub payment_id: PaymentId,
    pub company_id: String,
    pub amount: Money,
}

/// Result of a successful authorize. Exactly one of the optional fields is
/// populated, depending on how the rail collects customer approval: a
/// client-side confirmation secret, a redirect URL, or an on-chain transfer
/// address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RailAuthorization {
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escrow_address: Option<String>,
}

/// Whether a rail failure is worth a caller-initiated retry or demands a
/// fresh authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RailErrorKind {
    Transient,
    Terminal,
}

/// Failure reported by a rail adapter. `detail` carries the full provider
/// text for operator reconciliation; company-facing surfaces map this to a
/// generic category instead.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{rail} {kind:?} failure: {detail}", rail = .rail.name())]
pub struct RailError {
    pub rail: PaymentRail,
    pub kind: RailErrorKind,
    pub detail: String,
}

impl RailError {
    pub fn terminal(rail: PaymentRail, detail: impl Into<String>) -> Self {
        Self {
            rail,
            kind: RailErrorKind::Terminal,
            detail: detail.into(),
        }
    }

    pub fn transient(rail: PaymentRail, detail: impl Into<String>) -> Self {
        Self {
            rail,
            kind: RailErrorKind::Transient,
            detail: detail.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == RailErrorKind::Transient
    }
}

/// Uniform contract every payment rail implements. Adapters are stateless:
/// idempotency is the settlement engine's job (it checks the payment status
/// before calling in), not adapter-side deduplication.
pub trait PaymentRailAdapter: Send + Sync {
    fn rail(&self) -> PaymentRail;

    fn authorize(&self, request: &AuthorizeRequest) -> Result<RailAuthorization, RailError>;

    fn capture_full(&self, reference: &str, amount: Money) -> Result<Money, RailError>;

    fn capture_partial(
        &self,
        reference: &str,
        original: Money,
        capture: Money,
    ) -> Result<Money, RailError>;

    fn release(&self, reference: &str) -> Result<(), RailError>;

    fn is_valid(&self, reference: &str) -> bool;
}
