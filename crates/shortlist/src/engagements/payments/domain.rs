use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for payment records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentId(pub String);

/// Settlement currency. Cross-currency settlement is out of scope, so a
/// payment carries exactly one of these end to end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
}

impl Currency {
    pub const fn code(self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
        }
    }
}

/// Monetary amount in minor units (cents, pence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount_minor: u64,
    pub currency: Currency,
}

impl Money {
    pub const fn new(amount_minor: u64, currency: Currency) -> Self {
        Self {
            amount_minor,
            currency,
        }
    }

    pub const fn usd(amount_minor: u64) -> Self {
        Self::new(amount_minor, Currency::Usd)
    }

    /// Amount after deducting a whole-number percentage, rounded down to the
    /// minor unit.
    pub fn less_percent(self, percent: u8) -> Self {
        let percent = percent.min(100) as u64;
        Self {
            amount_minor: self.amount_minor * (100 - percent) / 100,
            currency: self.currency,
        }
    }

    pub fn is_zero(self) -> bool {
        self.amount_minor == 0
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{:02} {}",
            self.amount_minor / 100,
            self.amount_minor % 100,
            self.currency.code()
        )
    }
}

/// The payment rails the settlement engine can route to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentRail {
    CardGateway,
    RedirectWallet,
    ChainEscrow,
}

impl PaymentRail {
    pub const fn name(self) -> &'static str {
        match self {
            PaymentRail::CardGateway => "card_gateway",
            PaymentRail::RedirectWallet => "redirect_wallet",
            PaymentRail::ChainEscrow => "chain_escrow",
        }
    }
}

/// Lifecycle state of a payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    None,
    Authorized,
    Captured,
    PartiallyCaptured,
    Released,
    Failed,
    Expired,
}

impl PaymentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            PaymentStatus::None => "none",
            PaymentStatus::Authorized => "authorized",
            PaymentStatus::Captured => "captured",
            PaymentStatus::PartiallyCaptured => "partially_captured",
            PaymentStatus::Released => "released",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Expired => "expired",
        }
    }

    /// A payment in one of these states still reserves funds or could,
    /// so a new authorization for the same request must not be opened.
    pub const fn holds_funds(self) -> bool {
        matches!(
            self,
            PaymentStatus::None
                | PaymentStatus::Authorized
                | PaymentStatus::Captured
                | PaymentStatus::PartiallyCaptured
        )
    }
}

/// Financial record owned exclusively by the settlement engine. Rows are
/// never deleted; every state change comes through the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub company_id: String,
    pub request_id: Option<String>,
    pub provider: PaymentRail,
    pub provider_reference: Option<String>,
    pub amount_authorized: Money,
    pub amount_captured: Option<Money>,
    pub status: PaymentStatus,
    pub authorized_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub captured_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn new(
        id: PaymentId,
        company_id: String,
        request_id: Option<String>,
        provider: PaymentRail,
        amount: Money,
    ) -> Self {
        Self {
            id,
            company_id,
            request_id,
            provider,
            provider_reference: None,
            amount_authorized: amount,
            amount_captured: None,
            status: PaymentStatus::None,
            authorized_at: None,
            confirmed_at: None,
            captured_at: None,
        }
    }
}

/// Sanitized payment representation for company-facing reads. Provider
/// detail never crosses this boundary.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentView {
    pub payment_id: PaymentId,
    pub provider: &'static str,
    pub status: &'static str,
    pub amount_authorized: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_captured: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,
}

impl Payment {
    pub fn view(&self) -> PaymentView {
        PaymentView {
            payment_id: self.id.clone(),
            provider: self.provider.name(),
            status: self.status.label(),
            amount_authorized: self.amount_authorized,
            amount_captured: self.amount_captured,
            authorized_at: self.authorized_at,
            captured_at: self.captured_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn less_percent_rounds_down_to_minor_units() {
        let price = Money::usd(999);
        assert_eq!(price.less_percent(25).amount_minor, 749);
        assert_eq!(price.less_percent(0).amount_minor, 999);
        assert_eq!(price.less_percent(100).amount_minor, 0);
    }

    #[test]
    fn holds_funds_excludes_settled_failures() {
        assert!(PaymentStatus::Authorized.holds_funds());
        assert!(PaymentStatus::Captured.holds_funds());
        assert!(!PaymentStatus::Failed.holds_funds());
        assert!(!PaymentStatus::Expired.holds_funds());
        assert!(!PaymentStatus::Released.holds_funds());
    }
}
