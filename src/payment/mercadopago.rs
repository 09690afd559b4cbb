//! Mercado Pago PIX provider
//!
//! Creates PIX payments through `POST /v1/payments`. The correlation token is
//! sent as `external_reference` and doubles as the idempotency key, so a
//! repeated request for the same session never creates a second charge.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::MercadoPagoConfig;
use crate::error::ProviderError;
use crate::payment::scalar_string;
use crate::payment::session::{qr_image_url, ChargeRequest, PaymentProvider, ProviderCharge};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_ERROR_BODY: usize = 512;

/// PIX charges through the Mercado Pago REST API
#[derive(Clone)]
pub struct MercadoPagoProvider {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
    notification_url: Option<String>,
}

impl std::fmt::Debug for MercadoPagoProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MercadoPagoProvider")
            .field("base_url", &self.base_url)
            .field("notification_url", &self.notification_url)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct CreatePayment<'a> {
    transaction_amount: f64,
    description: &'a str,
    payment_method_id: &'static str,
    external_reference: &'a str,
    payer: Payer<'a>,
    date_of_expiration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification_url: Option<&'a str>,
}

#[derive(Serialize)]
struct Payer<'a> {
    email: &'a str,
}

#[derive(Deserialize)]
struct PaymentResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    point_of_interaction: Option<PointOfInteraction>,
}

#[derive(Deserialize)]
struct PointOfInteraction {
    #[serde(default)]
    transaction_data: Option<TransactionData>,
}

#[derive(Deserialize)]
struct TransactionData {
    #[serde(default)]
    qr_code: Option<String>,
    #[serde(default)]
    ticket_url: Option<String>,
}

impl MercadoPagoProvider {
    /// Build a provider with its own HTTP client
    pub fn new(config: &MercadoPagoConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            notification_url: config.notification_url.clone(),
        })
    }

    fn payments_url(&self) -> String {
        format!("{}/v1/payments", self.base_url)
    }
}

#[async_trait::async_trait]
impl PaymentProvider for MercadoPagoProvider {
    fn name(&self) -> &'static str {
        "mercadopago"
    }

    async fn create_charge(&self, charge: &ChargeRequest) -> Result<ProviderCharge, ProviderError> {
        let body = CreatePayment {
            transaction_amount: charge.amount.as_f64(),
            description: &charge.description,
            payment_method_id: "pix",
            external_reference: &charge.external_reference,
            payer: Payer {
                email: &charge.payer_email,
            },
            date_of_expiration: charge
                .expires_at
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, false),
            notification_url: self.notification_url.as_deref(),
        };

        let response = self
            .client
            .post(self.payments_url())
            .bearer_auth(&self.access_token)
            .header("X-Idempotency-Key", &charge.external_reference)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "Mercado Pago rejected payment creation");
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                body: text.chars().take(MAX_ERROR_BODY).collect(),
            });
        }

        parse_payment(&text)
    }
}

fn parse_payment(text: &str) -> Result<ProviderCharge, ProviderError> {
    let payment: PaymentResponse =
        serde_json::from_str(text).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

    let data = payment
        .point_of_interaction
        .and_then(|p| p.transaction_data);
    let (qr_code, ticket_url) = match data {
        Some(d) => (d.qr_code, d.ticket_url),
        None => (None, None),
    };
    let pix_code = qr_code.filter(|c| !c.is_empty()).ok_or_else(|| {
        ProviderError::InvalidResponse(
            "missing point_of_interaction.transaction_data.qr_code".to_string(),
        )
    })?;

    let provider_payment_id = scalar_string(payment.id.as_ref());
    debug!(payment_id = ?provider_payment_id, "Mercado Pago payment created");

    Ok(ProviderCharge {
        provider_payment_id,
        qr_code_url: Some(qr_image_url(&pix_code)),
        pix_code,
        ticket_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LeadId;
    use crate::payment::session::Amount;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn charge() -> ChargeRequest {
        ChargeRequest {
            lead_id: LeadId(42),
            amount: Amount::from_cents(4700),
            description: "Report".to_string(),
            external_reference: "lead_42_1700000000000".to_string(),
            payer_email: "ana@example.com".to_string(),
            expires_at: Utc.timestamp_opt(1_700_001_800, 0).unwrap(),
        }
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn provider(base_url: String) -> MercadoPagoProvider {
        MercadoPagoProvider::new(&MercadoPagoConfig {
            access_token: "TEST-token".to_string(),
            base_url,
            notification_url: Some("https://example.com/api/payment/webhook".to_string()),
        })
        .unwrap()
    }

    #[test]
    fn test_parse_payment() {
        let charge = parse_payment(
            r#"{"id": 1234, "status": "pending",
                "point_of_interaction": {"transaction_data": {
                    "qr_code": "00020126...", "ticket_url": "https://mp/ticket"}}}"#,
        )
        .unwrap();
        assert_eq!(charge.provider_payment_id.as_deref(), Some("1234"));
        assert_eq!(charge.pix_code, "00020126...");
        assert_eq!(charge.ticket_url.as_deref(), Some("https://mp/ticket"));
        assert!(charge.qr_code_url.is_some());
    }

    #[test]
    fn test_parse_payment_without_qr_code() {
        let err = parse_payment(r#"{"id": 1}"#).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
        let err = parse_payment("not json").unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_create_charge_against_mock_api() {
        let app = Router::new().route(
            "/v1/payments",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers["authorization"], "Bearer TEST-token");
                assert_eq!(headers["x-idempotency-key"], "lead_42_1700000000000");
                assert_eq!(body["payment_method_id"], "pix");
                assert_eq!(body["external_reference"], "lead_42_1700000000000");
                assert_eq!(body["transaction_amount"], 47.0);
                assert_eq!(body["payer"]["email"], "ana@example.com");
                Json(json!({
                    "id": 555,
                    "point_of_interaction": {"transaction_data": {"qr_code": "PIXCODE"}}
                }))
            }),
        );
        let base = serve(app).await;

        let charge = provider(base).create_charge(&charge()).await.unwrap();
        assert_eq!(charge.provider_payment_id.as_deref(), Some("555"));
        assert_eq!(charge.pix_code, "PIXCODE");
    }

    #[tokio::test]
    async fn test_create_charge_rejected() {
        let app = Router::new().route(
            "/v1/payments",
            post(|| async { (StatusCode::UNAUTHORIZED, "invalid token") }),
        );
        let base = serve(app).await;

        let err = provider(base).create_charge(&charge()).await.unwrap_err();
        match err {
            ProviderError::Rejected { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "invalid token");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_create_charge_unreachable() {
        let err = provider("http://127.0.0.1:1".to_string())
            .create_charge(&charge())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Transport(_)));
    }
}
