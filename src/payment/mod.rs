//! Payment Webhook Module
//!
//! Issues payment sessions for leads and reconciles the provider's signed,
//! at-least-once callbacks against the lead ledger.
//!
//! - **Signature Verification**: HMAC-SHA256 over `id;request-id;ts`, 300 s freshness
//! - **Correlation**: `lead_<id>_<millis>` external reference round-tripped through the provider
//! - **Idempotency**: PENDING -> PAID applied once per lead, first payment id wins
//! - **Acknowledgement**: every verified callback gets `200`, only authentication fails with `401`
//!
//! # Architecture
//!
//! ```text
//! Request -> Signature Verify -> Envelope -> Reference Decode -> Ledger mark_paid -> Ack (200)
//!                  |                 |               |                  |
//!                  v                 v               v                  v
//!                 401            ack+log         ack+warn          paid hooks
//! ```

pub mod envelope;
pub mod handler;
pub mod mercadopago;
pub mod reconciler;
pub mod reference;
pub mod session;
pub mod signature;

use serde_json::Value;

pub use envelope::CallbackEnvelope;
pub use handler::payment_router;
pub use mercadopago::MercadoPagoProvider;
pub use reconciler::{
    Acknowledgement, CallbackRequest, IgnoreReason, LoggingPaidHook, PaidLeadHook, Reconciled,
    WebhookReconciler,
};
pub use session::{
    Amount, ChargeRequest, PaymentProvider, PaymentSession, PaymentSessionIssuer,
    PlaceholderPixProvider, ProviderCharge,
};
pub use signature::{SignatureInput, SignatureVerifier, Verified};

/// Non-empty string or number rendered as a string.
///
/// Provider ids arrive as either JSON type.
pub(crate) fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_string() {
        assert_eq!(scalar_string(Some(&json!("abc"))), Some("abc".to_string()));
        assert_eq!(scalar_string(Some(&json!(123))), Some("123".to_string()));
        assert_eq!(scalar_string(Some(&json!("  "))), None);
        assert_eq!(scalar_string(Some(&json!(null))), None);
        assert_eq!(scalar_string(Some(&json!({"id": 1}))), None);
        assert_eq!(scalar_string(None), None);
    }
}
