//! Payment processor webhooks: signature checks, typed decoding and the
//! reconciler that applies each event once.

pub mod event;
pub mod reconciler;
pub mod signature;

pub use event::{
    CheckoutIntent, CheckoutSession, EventDecodeError, EventPayload, InvoiceSummary, LineItem,
    PaymentEvent, PurchaseMetadata, SubscriptionSnapshot,
};
pub use reconciler::{ReconcileError, ReconcileOutcome, ReconcileStore, Reconciler};
pub use signature::{SignatureError, WebhookVerifier, DEFAULT_TOLERANCE};
