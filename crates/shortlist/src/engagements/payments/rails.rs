use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::adapter::{
    AuthorizeRequest, PaymentRailAdapter, RailAuthorization, RailError,
};
use super::domain::{Money, PaymentRail};

/// Registry mapping a rail name to its adapter. The settlement engine looks
/// adapters up here; tests swap in doubles through `register`.
pub struct AdapterRegistry {
    adapters: BTreeMap<PaymentRail, Box<dyn PaymentRailAdapter>>,
}

impl AdapterRegistry {
    pub fn empty() -> Self {
        Self {
            adapters: BTreeMap::new(),
        }
    }

    /// Registry with the three production rails.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(CardGatewayAdapter::default()));
        registry.register(Box::new(RedirectWalletAdapter));
        registry.register(Box::new(ChainEscrowAdapter));
        registry
    }

    pub fn register(&mut self, adapter: Box<dyn PaymentRailAdapter>) {
        self.adapters.insert(adapter.rail(), adapter);
    }

    pub fn get(&self, rail: PaymentRail) -> Option<&dyn PaymentRailAdapter> {
        self.adapters.get(&rail).map(Box::as_ref)
    }
}

fn reject_zero(rail: PaymentRail, amount: Money) -> Result<(), RailError> {
    if amount.is_zero() {
        return Err(RailError::terminal(rail, "zero amount rejected by rail"));
    }
    Ok(())
}

fn require_prefix(rail: PaymentRail, reference: &str, prefix: &str) -> Result<(), RailError> {
    if reference.starts_with(prefix) {
        Ok(())
    } else {
        Err(RailError::terminal(
            rail,
            format!("unknown reference '{reference}'"),
        ))
    }
}

const CARD_REFERENCE_PREFIX: &str = "cardauth_";
const WALLET_REFERENCE_PREFIX: &str = "wref_";
const ESCROW_REFERENCE_PREFIX: &str = "esc_";

const GATEWAY_TOKEN_TTL: Duration = Duration::from_secs(50 * 60);

struct GatewayToken {
    value: String,
    fetched_at: Instant,
}

/// Card-network gateway. Approval happens client-side against a one-time
/// confirmation secret returned with the authorization.
#[derive(Default)]
pub struct CardGatewayAdapter {
    // Adapter-private credential cache; never visible to the engine.
    token: Mutex<Option<GatewayToken>>,
}

impl CardGatewayAdapter {
    fn access_token(&self) -> String {
        let mut guard = self.token.lock().expect("gateway token mutex poisoned");
        let stale = guard
            .as_ref()
            .map(|token| token.fetched_at.elapsed() >= GATEWAY_TOKEN_TTL)
            .unwrap_or(true);
        if stale {
            static TOKEN_SEQUENCE: AtomicU64 = AtomicU64::new(1);
            let serial = TOKEN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
            *guard = Some(GatewayToken {
                value: format!("gwtok_{serial:08}"),
                fetched_at: Instant::now(),
            });
        }
        guard
            .as_ref()
            .map(|token| token.value.clone())
            .unwrap_or_default()
    }
}

impl PaymentRailAdapter for CardGatewayAdapter {
    fn rail(&self) -> PaymentRail {
        PaymentRail::CardGateway
    }

    fn authorize(&self, request: &AuthorizeRequest) -> Result<RailAuthorization, RailError> {
        reject_zero(self.rail(), request.amount)?;
        let _token = self.access_token();
        let reference = format!("{CARD_REFERENCE_PREFIX}{}", request.payment_id.0);
        Ok(RailAuthorization {
            client_secret: Some(format!("{reference}_secret")),
            approval_url: None,
            escrow_address: None,
            reference,
        })
    }

    fn capture_full(&self, reference: &str, amount: Money) -> Result<Money, RailError> {
        require_prefix(self.rail(), reference, CARD_REFERENCE_PREFIX)?;
        reject_zero(self.rail(), amount)?;
        Ok(amount)
    }

    fn capture_partial(
        &self,
        reference: &str,
        original: Money,
        capture: Money,
    ) -> Result<Money, RailError> {
        require_prefix(self.rail(), reference, CARD_REFERENCE_PREFIX)?;
        if capture.amount_minor > original.amount_minor {
            return Err(RailError::terminal(
                self.rail(),
                "partial capture exceeds authorized amount",
            ));
        }
        Ok(capture)
    }

    fn release(&self, reference: &str) -> Result<(), RailError> {
        require_prefix(self.rail(), reference, CARD_REFERENCE_PREFIX)
    }

    fn is_valid(&self, reference: &str) -> bool {
        reference.starts_with(CARD_REFERENCE_PREFIX)
    }
}

/// Redirect-based wallet. The customer approves out of band at the returned
/// URL, so the authorization completes asynchronously via confirm.
pub struct RedirectWalletAdapter;

impl PaymentRailAdapter for RedirectWalletAdapter {
    fn rail(&self) -> PaymentRail {
        PaymentRail::RedirectWallet
    }

    fn authorize(&self, request: &AuthorizeRequest) -> Result<RailAuthorization, RailError> {
        reject_zero(self.rail(), request.amount)?;
        let reference = format!("{WALLET_REFERENCE_PREFIX}{}", request.payment_id.0);
        Ok(RailAuthorization {
            client_secret: None,
            approval_url: Some(format!("https://wallet.example/approve/{reference}")),
            escrow_address: None,
            reference,
        })
    }

    fn capture_full(&self, reference: &str, amount: Money) -> Result<Money, RailError> {
        require_prefix(self.rail(), reference, WALLET_REFERENCE_PREFIX)?;
        reject_zero(self.rail(), amount)?;
        Ok(amount)
    }

    fn capture_partial(
        &self,
        reference: &str,
        original: Money,
        capture: Money,
    ) -> Result<Money, RailError> {
        require_prefix(self.rail(), reference, WALLET_REFERENCE_PREFIX)?;
        if capture.amount_minor > original.amount_minor {
            return Err(RailError::terminal(
                self.rail(),
                "partial capture exceeds authorized amount",
            ));
        }
        Ok(capture)
    }

    fn release(&self, reference: &str) -> Result<(), RailError> {
        require_prefix(self.rail(), reference, WALLET_REFERENCE_PREFIX)
    }

    fn is_valid(&self, reference: &str) -> bool {
        reference.starts_with(WALLET_REFERENCE_PREFIX)
    }
}

/// On-chain escrow. Funds are held at a derived escrow address until the
/// engine captures (sweeps) or releases (refunds) them.
pub struct ChainEscrowAdapter;

impl PaymentRailAdapter for ChainEscrowAdapter {
    fn rail(&self) -> PaymentRail {
        PaymentRail::ChainEscrow
    }

    fn authorize(&self, request: &AuthorizeRequest) -> Result<RailAuthorization, RailError> {
        reject_zero(self.rail(), request.amount)?;
        let reference = format!("{ESCROW_REFERENCE_PREFIX}{}", request.payment_id.0);
        Ok(RailAuthorization {
            client_secret: None,
            approval_url: None,
            escrow_address: Some(format!("0xescrow{:08x}", fingerprint(&request.payment_id.0))),
            reference,
        })
    }

    fn capture_full(&self, reference: &str, amount: Money) -> Result<Money, RailError> {
        require_prefix(self.rail(), reference, ESCROW_REFERENCE_PREFIX)?;
        reject_zero(self.rail(), amount)?;
        Ok(amount)
    }

    fn capture_partial(
        &self,
        reference: &str,
        original: Money,
        capture: Money,
    ) -> Result<Money, RailError> {
        require_prefix(self.rail(), reference, ESCROW_REFERENCE_PREFIX)?;
        if capture.amount_minor > original.amount_minor {
            return Err(RailError::terminal(
                self.rail(),
                "partial sweep exceeds escrowed amount",
            ));
        }
        Ok(capture)
    }

    fn release(&self, reference: &str) -> Result<(), RailError> {
        require_prefix(self.rail(), reference, ESCROW_REFERENCE_PREFIX)
    }

    fn is_valid(&self, reference: &str) -> bool {
        reference.starts_with(ESCROW_REFERENCE_PREFIX)
    }
}

fn fingerprint(input: &str) -> u32 {
    input
        .bytes()
        .fold(2166136261u32, |hash, byte| {
            (hash ^ byte as u32).wrapping_mul(16777619)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engagements::payments::domain::PaymentId;

    fn request(amount_minor: u64) -> AuthorizeRequest {
        AuthorizeRequest {
            payment_id: PaymentId("pay-000001".to_string()),
            company_id: "acme".to_string(),
            amount: Money::usd(amount_minor),
        }
    }

    #[test]
    fn each_rail_populates_exactly_one_approval_mechanic() {
        let registry = AdapterRegistry::standard();
        for (rail, expect_secret, expect_url, expect_escrow) in [
            (PaymentRail::CardGateway, true, false, false),
            (PaymentRail::RedirectWallet, false, true, false),
            (PaymentRail::ChainEscrow, false, false, true),
        ] {
            let adapter = registry.get(rail).expect("rail registered");
            let auth = adapter.authorize(&request(50_000)).expect("authorizes");
            assert_eq!(auth.client_secret.is_some(), expect_secret, "{rail:?}");
            assert_eq!(auth.approval_url.is_some(), expect_url, "{rail:?}");
            assert_eq!(auth.escrow_address.is_some(), expect_escrow, "{rail:?}");
            assert!(adapter.is_valid(&auth.reference));
        }
    }

    #[test]
    fn zero_amount_authorizations_are_terminal_failures() {
        let adapter = CardGatewayAdapter::default();
        let err = adapter.authorize(&request(0)).expect_err("rejected");
        assert!(!err.is_transient());
    }

    #[test]
    fn partial_capture_cannot_exceed_original() {
        let adapter = RedirectWalletAdapter;
        let auth = adapter.authorize(&request(10_000)).expect("authorizes");
        let err = adapter
            .capture_partial(&auth.reference, Money::usd(10_000), Money::usd(10_001))
            .expect_err("over-capture rejected");
        assert!(err.detail.contains("exceeds"));
    }

    #[test]
    fn foreign_references_are_rejected() {
        let adapter = ChainEscrowAdapter;
        assert!(!adapter.is_valid("cardauth_pay-000001"));
        assert!(adapter.release("cardauth_pay-000001").is_err());
    }
}
