//! Callback envelope normalisation
//!
//! The provider's notification body is untyped JSON whose shape varies by
//! topic. [`CallbackEnvelope::from_value`] turns it into a fixed set of
//! optional fields, applying the provider's implicit defaults, and never
//! assumes a field exists.

use serde::Serialize;
use serde_json::Value;

use crate::error::WebhookError;
use crate::ledger::LeadId;
use crate::payment::scalar_string;

/// Provider status that triggers the PAID transition
pub const APPROVED_STATUS: &str = "approved";

/// Notification kind carrying payment updates
pub const PAYMENT_KIND: &str = "payment";

/// Normalised notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackEnvelope {
    /// Notification topic (`type`), defaults to `payment`
    pub kind: String,
    /// Provider action, defaults to `payment.updated`
    pub action: String,
    /// Provider payment id from `data.id`, else `id`
    pub provider_payment_id: Option<String>,
    /// Provider status from `data.status`, defaults to `pending`
    pub status: String,
    /// Correlation token from `data.external_reference`
    pub external_reference: Option<String>,
    /// Literal top-level `leadId`, used when the reference is absent
    pub lead_id_hint: Option<LeadId>,
}

impl CallbackEnvelope {
    /// Normalise a decoded JSON body.
    ///
    /// Only a non-object body is an error; every field is optional.
    pub fn from_value(body: &Value) -> Result<Self, WebhookError> {
        let Some(object) = body.as_object() else {
            return Err(WebhookError::MalformedPayload(format!(
                "expected a JSON object, got {}",
                json_kind(body)
            )));
        };
        let data = object.get("data").filter(|d| d.is_object());
        let data_field = |name: &str| data.and_then(|d| d.get(name));

        Ok(Self {
            kind: text(object.get("type")).unwrap_or_else(|| PAYMENT_KIND.to_string()),
            action: text(object.get("action")).unwrap_or_else(|| "payment.updated".to_string()),
            provider_payment_id: scalar_string(data_field("id"))
                .or_else(|| scalar_string(object.get("id"))),
            status: text(data_field("status")).unwrap_or_else(|| "pending".to_string()),
            external_reference: text(data_field("external_reference")),
            lead_id_hint: lead_id_literal(object.get("leadId")),
        })
    }

    /// True for a final-approved payment event
    pub fn is_approved_payment(&self) -> bool {
        self.kind == PAYMENT_KIND && self.status == APPROVED_STATUS
    }
}

fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn lead_id_literal(value: Option<&Value>) -> Option<LeadId> {
    match value? {
        Value::Number(n) => n.as_u64().map(LeadId),
        Value::String(s) => s.trim().parse::<u64>().ok().map(LeadId),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_full_payment_notification() {
        let body = json!({
            "type": "payment",
            "action": "payment.updated",
            "data": {
                "id": 123456789,
                "status": "approved",
                "external_reference": "lead_42_1700000000000"
            }
        });
        let envelope = CallbackEnvelope::from_value(&body).unwrap();
        assert_eq!(
            envelope,
            CallbackEnvelope {
                kind: "payment".to_string(),
                action: "payment.updated".to_string(),
                provider_payment_id: Some("123456789".to_string()),
                status: "approved".to_string(),
                external_reference: Some("lead_42_1700000000000".to_string()),
                lead_id_hint: None,
            }
        );
        assert!(envelope.is_approved_payment());
    }

    #[test]
    fn test_defaults_for_sparse_body() {
        let envelope = CallbackEnvelope::from_value(&json!({"id": "PAY-9"})).unwrap();
        assert_eq!(envelope.kind, "payment");
        assert_eq!(envelope.action, "payment.updated");
        assert_eq!(envelope.status, "pending");
        assert_eq!(envelope.provider_payment_id.as_deref(), Some("PAY-9"));
        assert_eq!(envelope.external_reference, None);
        assert!(!envelope.is_approved_payment());

        let empty = CallbackEnvelope::from_value(&json!({})).unwrap();
        assert_eq!(empty.provider_payment_id, None);
    }

    #[test]
    fn test_wrong_typed_fields_are_ignored() {
        let body = json!({
            "type": 7,
            "data": "not-an-object",
            "leadId": {"nested": true}
        });
        let envelope = CallbackEnvelope::from_value(&body).unwrap();
        assert_eq!(envelope.kind, "payment");
        assert_eq!(envelope.status, "pending");
        assert_eq!(envelope.lead_id_hint, None);
    }

    #[test]
    fn test_lead_id_hint_number_or_string() {
        let n = CallbackEnvelope::from_value(&json!({"leadId": 42})).unwrap();
        assert_eq!(n.lead_id_hint, Some(LeadId(42)));
        let s = CallbackEnvelope::from_value(&json!({"leadId": " 43 "})).unwrap();
        assert_eq!(s.lead_id_hint, Some(LeadId(43)));
        let neg = CallbackEnvelope::from_value(&json!({"leadId": -1})).unwrap();
        assert_eq!(neg.lead_id_hint, None);
    }

    #[test]
    fn test_non_object_is_malformed() {
        for body in [json!(null), json!([1, 2]), json!("payment"), json!(3)] {
            let err = CallbackEnvelope::from_value(&body).unwrap_err();
            assert!(matches!(err, WebhookError::MalformedPayload(_)));
        }
    }

    #[test]
    fn test_non_payment_kind() {
        let body = json!({"type": "merchant_order", "data": {"id": "1", "status": "approved"}});
        let envelope = CallbackEnvelope::from_value(&body).unwrap();
        assert!(!envelope.is_approved_payment());
    }
}
