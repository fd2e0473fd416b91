use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use super::adapter::{AuthorizeRequest, RailAuthorization, RailError};
use super::domain::{Money, Payment, PaymentId, PaymentRail, PaymentStatus};
use super::rails::AdapterRegistry;

/// Authorizations on time-limited rails go stale after this many days and
/// must be re-initiated before delivery can proceed.
pub const AUTHORIZATION_WINDOW_DAYS: i64 = 7;

/// Persistence seam for payment records. Only the settlement engine writes
/// through it.
pub trait PaymentStore: Send + Sync {
    fn insert(&self, payment: Payment) -> Result<Payment, StoreError>;
    fn update(&self, payment: Payment) -> Result<(), StoreError>;
    fn fetch(&self, id: &PaymentId) -> Result<Option<Payment>, StoreError>;
    fn for_request(&self, request_id: &str) -> Result<Vec<Payment>, StoreError>;
}

/// Error enumeration for payment store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("payment record already exists")]
    Conflict,
    #[error("payment record not found")]
    NotFound,
    #[error("payment store unavailable: {0}")]
    Unavailable(String),
}

/// Failure surfaced by settlement operations. `detail` strings inside the
/// rail variant are operator-facing; use `public_category` for companies.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("no adapter registered for rail '{0}'")]
    UnknownRail(&'static str),
    #[error(transparent)]
    Rail(#[from] RailError),
    #[error("payment is {status}, expected an authorized payment")]
    NotAuthorized { status: &'static str },
    #[error("authorization expired")]
    Expired,
    #[error("no payment recorded for this request")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SettlementError {
    /// Generic category safe to show a company. Rail detail stays internal.
    pub fn public_category(&self) -> &'static str {
        match self {
            SettlementError::Expired => "authorization expired",
            _ => "payment provider error",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, SettlementError::Rail(err) if err.is_transient())
    }
}

/// Shortlist outcome translated into a settlement action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    Fulfilled,
    Partial { discount_percent: u8 },
    NoMatch,
}

/// Money movement performed by a finalize call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementAction {
    Captured(Money),
    PartiallyCaptured(Money),
    Released,
}

impl SettlementAction {
    pub const fn label(self) -> &'static str {
        match self {
            SettlementAction::Captured(_) => "captured",
            SettlementAction::PartiallyCaptured(_) => "partially_captured",
            SettlementAction::Released => "released",
        }
    }
}

/// Receipt returned by a successful finalize.
#[derive(Debug, Clone)]
pub struct FinalizeReceipt {
    pub payment: Payment,
    pub action: SettlementAction,
}

/// Successful authorization handle returned to the caller. The rail-specific
/// approval mechanic rides along for the company to complete out of band.
#[derive(Debug, Clone)]
pub struct PaymentAuthorization {
    pub payment: Payment,
    pub handle: RailAuthorization,
}

static PAYMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_payment_id() -> PaymentId {
    let id = PAYMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    PaymentId(format!("pay-{id:06}"))
}

/// Owns the payment lifecycle: selects an adapter by rail, translates
/// shortlist outcomes into capture/partial-capture/release calls, and never
/// moves money without an authorized payment on file.
pub struct SettlementEngine<S> {
    store: Arc<S>,
    adapters: AdapterRegistry,
    authorization_window: Duration,
}

impl<S> SettlementEngine<S>
where
    S: PaymentStore,
{
    pub fn new(store: Arc<S>, adapters: AdapterRegistry) -> Self {
        Self {
            store,
            adapters,
            authorization_window: Duration::days(AUTHORIZATION_WINDOW_DAYS),
        }
    }

    pub fn with_authorization_window(mut self, window: Duration) -> Self {
        self.authorization_window = window;
        self
    }

    /// Open a payment record and reserve funds on the selected rail. On rail
    /// failure the record is left in `Failed` and the error surfaces without
    /// retry: some rails hand out one-time redirect URLs, so the caller must
    /// re-initiate with a fresh request.
    pub fn authorize(
        &self,
        company_id: &str,
        request_id: &str,
        amount: Money,
        rail: PaymentRail,
        now: DateTime<Utc>,
    ) -> Result<PaymentAuthorization, SettlementError> {
        let adapter = self
            .adapters
            .get(rail)
            .ok_or(SettlementError::UnknownRail(rail.name()))?;

        let payment = Payment::new(
            next_payment_id(),
            company_id.to_string(),
            Some(request_id.to_string()),
            rail,
            amount,
        );
        let mut payment = self.store.insert(payment)?;

        let request = AuthorizeRequest {
            payment_id: payment.id.clone(),
            company_id: company_id.to_string(),
            amount,
        };
        match adapter.authorize(&request) {
            Ok(handle) => {
                payment.provider_reference = Some(handle.reference.clone());
                payment.status = PaymentStatus::Authorized;
                payment.authorized_at = Some(now);
                if rail == PaymentRail::CardGateway {
                    // Client-secret rails confirm in the same round trip.
                    payment.confirmed_at = Some(now);
                }
                self.store.update(payment.clone())?;
                Ok(PaymentAuthorization { payment, handle })
            }
            Err(err) => {
                payment.status = PaymentStatus::Failed;
                self.store.update(payment)?;
                Err(SettlementError::Rail(err))
            }
        }
    }

    /// Record the out-of-band confirmation for redirect and escrow rails.
    /// Idempotent: confirming an already-confirmed payment is a no-op.
    /// Returns whether this call performed the confirmation.
    pub fn confirm_authorization(
        &self,
        payment_id: &PaymentId,
        provider_reference: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<bool, SettlementError> {
        let mut payment = self
            .store
            .fetch(payment_id)?
            .ok_or(SettlementError::NotFound)?;
        if payment.status != PaymentStatus::Authorized {
            return Err(SettlementError::NotAuthorized {
                status: payment.status.label(),
            });
        }
        if payment.confirmed_at.is_some() {
            return Ok(false);
        }
        if let Some(reference) = provider_reference {
            payment.provider_reference = Some(reference);
        }
        payment.confirmed_at = Some(now);
        self.store.update(payment)?;
        Ok(true)
    }

    /// Exactly one of capture, partial capture, or release per payment,
    /// enforced by requiring `Authorized` status before any adapter call.
    /// A rail failure here leaves the record untouched: the funds are in an
    /// unknown state and the caller must flag the payment for manual
    /// reconciliation instead of retrying blind.
    pub fn finalize(
        &self,
        request_id: &str,
        outcome: SettlementOutcome,
        now: DateTime<Utc>,
    ) -> Result<FinalizeReceipt, SettlementError> {
        let mut payment = self.authorized_payment(request_id)?;
        self.check_liveness(&mut payment, now)?;

        let rail = payment.provider;
        let adapter = self
            .adapters
            .get(rail)
            .ok_or(SettlementError::UnknownRail(rail.name()))?;
        let reference = payment
            .provider_reference
            .clone()
            .ok_or_else(|| RailError::terminal(rail, "payment has no provider reference"))?;

        let action = match outcome {
            SettlementOutcome::Fulfilled => {
                let captured = adapter.capture_full(&reference, payment.amount_authorized)?;
                payment.status = PaymentStatus::Captured;
                payment.amount_captured = Some(captured);
                payment.captured_at = Some(now);
                SettlementAction::Captured(captured)
            }
            SettlementOutcome::Partial { discount_percent } => {
                let target = payment.amount_authorized.less_percent(discount_percent);
                let captured =
                    adapter.capture_partial(&reference, payment.amount_authorized, target)?;
                payment.status = PaymentStatus::PartiallyCaptured;
                payment.amount_captured = Some(captured);
                payment.captured_at = Some(now);
                SettlementAction::PartiallyCaptured(captured)
            }
            SettlementOutcome::NoMatch => {
                adapter.release(&reference)?;
                payment.status = PaymentStatus::Released;
                SettlementAction::Released
            }
        };

        self.store.update(payment.clone())?;
        Ok(FinalizeReceipt { payment, action })
    }

    /// Liveness check for a held authorization. Stale authorizations are
    /// marked `Expired` in place and report invalid.
    pub fn is_authorization_valid(
        &self,
        payment_id: &PaymentId,
        now: DateTime<Utc>,
    ) -> Result<bool, SettlementError> {
        let mut payment = self
            .store
            .fetch(payment_id)?
            .ok_or(SettlementError::NotFound)?;
        if payment.status != PaymentStatus::Authorized {
            return Ok(false);
        }
        match self.check_liveness(&mut payment, now) {
            Ok(()) => Ok(true),
            Err(SettlementError::Expired) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Whether the request already has a payment that reserves (or took)
    /// funds. Failed and expired attempts do not block a fresh authorize.
    pub fn has_active_payment(&self, request_id: &str) -> Result<bool, SettlementError> {
        let payments = self.store.for_request(request_id)?;
        Ok(payments.iter().any(|p| p.status.holds_funds()))
    }

    pub fn payment(&self, payment_id: &PaymentId) -> Result<Payment, SettlementError> {
        self.store
            .fetch(payment_id)?
            .ok_or(SettlementError::NotFound)
    }

    fn authorized_payment(&self, request_id: &str) -> Result<Payment, SettlementError> {
        let payments = self.store.for_request(request_id)?;
        if let Some(payment) = payments
            .iter()
            .find(|p| p.status == PaymentStatus::Authorized)
        {
            return Ok(payment.clone());
        }
        match payments.last() {
            Some(settled) => Err(SettlementError::NotAuthorized {
                status: settled.status.label(),
            }),
            None => Err(SettlementError::NotFound),
        }
    }

    fn check_liveness(
        &self,
        payment: &mut Payment,
        now: DateTime<Utc>,
    ) -> Result<(), SettlementError> {
        let authorized_at = payment.authorized_at.ok_or(SettlementError::Expired)?;
        let stale = now - authorized_at > self.authorization_window;
        let recognized = payment
            .provider_reference
            .as_deref()
            .map(|reference| {
                self.adapters
                    .get(payment.provider)
                    .map(|adapter| adapter.is_valid(reference))
                    .unwrap_or(false)
            })
            .unwrap_or(false);
        if stale || !recognized {
            payment.status = PaymentStatus::Expired;
            self.store.update(payment.clone())?;
            return Err(SettlementError::Expired);
        }
        Ok(())
    }
}
