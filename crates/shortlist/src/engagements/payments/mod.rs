//! Provider-agnostic payment settlement: authorize, capture, partial
//! capture, release. Adapters are stateless; every durable fact about a
//! payment lives in the [`Payment`] record owned by the settlement engine.

pub mod adapter;
pub mod domain;
pub mod rails;
pub mod settlement;

pub use adapter::{
    AuthorizeRequest, PaymentRailAdapter, RailAuthorization, RailError, RailErrorKind,
};
pub use domain::{Currency, Money, Payment, PaymentId, PaymentRail, PaymentStatus, PaymentView};
pub use rails::{AdapterRegistry, CardGatewayAdapter, ChainEscrowAdapter, RedirectWalletAdapter};
pub use settlement::{
    FinalizeReceipt, PaymentAuthorization, PaymentStore, SettlementAction, SettlementEngine,
    SettlementError, SettlementOutcome, StoreError, AUTHORIZATION_WINDOW_DAYS,
};
