//! End-to-end payment webhook tests driving the full axum router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use leadpay::config::AppConfig;
use leadpay::lead::NoopContactSync;
use leadpay::ledger::{InMemoryLeadLedger, LeadId, LeadLedger, LeadStatus, NewLead};
use leadpay::payment::signature::{build_manifest, compute_signature};
use leadpay::payment::PlaceholderPixProvider;
use leadpay::server::{app_router, AppState};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

const TOKEN: &str = "lead_42_1700000000000";

struct Harness {
    ledger: Arc<InMemoryLeadLedger>,
    app: Router,
    secret: String,
}

impl Harness {
    async fn new() -> Self {
        let ledger = Arc::new(InMemoryLeadLedger::starting_at(LeadId(42)));
        ledger
            .create(NewLead {
                name: "Ana Maria".to_string(),
                email: "ana@example.com".to_string(),
                whatsapp: None,
            })
            .await
            .unwrap();

        let config = AppConfig::test_config();
        let secret = config.webhook_secret.clone().unwrap();
        let state = AppState::with_components(
            config,
            ledger.clone(),
            Arc::new(PlaceholderPixProvider::new("LEADPAY", "SAO PAULO")),
            Arc::new(NoopContactSync),
        );

        Self {
            ledger,
            app: app_router(Arc::new(state)),
            secret,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn signed_webhook(&self, body: &Value, request_id: &str) -> Request<Body> {
        let data_id = body["data"]["id"].as_str().unwrap_or("");
        let ts = Utc::now().timestamp().to_string();
        let manifest = build_manifest(data_id, request_id, &ts);
        let signature = format!("ts={},v1={}", ts, compute_signature(&self.secret, &manifest));
        webhook(body, Some(&signature), Some(request_id))
    }

    async fn status_of(&self, id: u64) -> LeadStatus {
        self.ledger
            .find_by_id(LeadId(id))
            .await
            .unwrap()
            .unwrap()
            .status
    }
}

fn webhook(body: &Value, signature: Option<&str>, request_id: Option<&str>) -> Request<Body> {
    let mut builder = Request::post("/api/payment/webhook").header("content-type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("x-signature", signature);
    }
    if let Some(request_id) = request_id {
        builder = builder.header("x-request-id", request_id);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn payment(id: &str, status: &str, reference: &str) -> Value {
    json!({
        "type": "payment",
        "action": "payment.updated",
        "data": {"id": id, "status": status, "external_reference": reference}
    })
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn approved_payment_marks_lead_paid() {
    let h = Harness::new().await;

    let (status, body) = h
        .send(h.signed_webhook(&payment("PAY-1", "approved", TOKEN), "req-1"))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"received": true}));
    assert_eq!(h.status_of(42).await, LeadStatus::Paid);

    let (status, body) = h.send(get("/api/payment/status/42")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PAID");
    assert_eq!(body["paymentId"], "PAY-1");
}

#[tokio::test]
async fn tampered_signature_is_rejected() {
    let h = Harness::new().await;
    let body = payment("PAY-1", "approved", TOKEN);
    let ts = Utc::now().timestamp();
    let forged = format!("ts={},v1={}", ts, compute_signature("wrong-secret", "anything"));

    let (status, response) = h.send(webhook(&body, Some(&forged), Some("req-1"))).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response, json!({"success": false, "reason": "signature mismatch"}));
    assert_eq!(h.status_of(42).await, LeadStatus::Pending);
}

#[tokio::test]
async fn missing_headers_are_rejected() {
    let h = Harness::new().await;
    let body = payment("PAY-1", "approved", TOKEN);

    let (status, response) = h.send(webhook(&body, None, Some("req-1"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["reason"], "missing signature headers");

    let (status, response) = h.send(webhook(&body, Some("v1=abc"), Some("req-1"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["reason"], "invalid signature format");

    assert_eq!(h.status_of(42).await, LeadStatus::Pending);
}

#[tokio::test]
async fn stale_signature_is_rejected() {
    let h = Harness::new().await;
    let body = payment("PAY-1", "approved", TOKEN);
    let ts = (Utc::now().timestamp() - 3600).to_string();
    let manifest = build_manifest("PAY-1", "req-1", &ts);
    let signature = format!("ts={},v1={}", ts, compute_signature(&h.secret, &manifest));

    let (status, response) = h.send(webhook(&body, Some(&signature), Some("req-1"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(response["reason"], "timestamp too old");
}

#[tokio::test]
async fn pending_status_is_acknowledged_without_change() {
    let h = Harness::new().await;

    let (status, body) = h
        .send(h.signed_webhook(&payment("PAY-1", "pending", TOKEN), "req-2"))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"received": true}));
    assert_eq!(h.status_of(42).await, LeadStatus::Pending);
}

#[tokio::test]
async fn redelivery_keeps_first_payment_id() {
    let h = Harness::new().await;

    for (payment_id, request_id) in [("PAY-1", "req-1"), ("PAY-1", "req-2"), ("PAY-2", "req-3")] {
        let (status, _) = h
            .send(h.signed_webhook(&payment(payment_id, "approved", TOKEN), request_id))
            .await;
        assert_eq!(status, StatusCode::OK);
    }

    let lead = h.ledger.find_by_id(LeadId(42)).await.unwrap().unwrap();
    assert_eq!(lead.status, LeadStatus::Paid);
    assert_eq!(lead.payment_id.as_deref(), Some("PAY-1"));

    let (_, status) = h.send(get("/status")).await;
    assert_eq!(status["webhooks"]["received"], 3);
    assert_eq!(status["webhooks"]["applied"], 1);
    assert_eq!(status["webhooks"]["duplicates"], 2);
}

#[tokio::test]
async fn unresolvable_and_unknown_references_are_acknowledged() {
    let h = Harness::new().await;

    for reference in ["order_42_1", "lead_7_1700000000000"] {
        let (status, body) = h
            .send(h.signed_webhook(&payment("PAY-1", "approved", reference), "req-1"))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"received": true}));
    }

    let (status, body) = h
        .send(h.signed_webhook(&json!(["not", "an", "object"]), "req-1"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"received": true}));

    assert_eq!(h.status_of(42).await, LeadStatus::Pending);
}

fn signed_request(h: &Harness, uri: &str, body: &Value, data_id: &str) -> Request<Body> {
    let ts = Utc::now().timestamp().to_string();
    let manifest = build_manifest(data_id, "req-1", &ts);
    let signature = format!("ts={},v1={}", ts, compute_signature(&h.secret, &manifest));
    Request::post(uri)
        .header("content-type", "application/json")
        .header("x-signature", signature)
        .header("x-request-id", "req-1")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn dotted_query_id_does_not_replace_body_data_id() {
    let h = Harness::new().await;
    let body = payment("PAY-1", "approved", TOKEN);

    let request = signed_request(&h, "/api/payment/webhook?data.id=999&type=payment", &body, "PAY-1");
    let (status, response) = h.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(response, json!({"received": true}));
    assert_eq!(h.status_of(42).await, LeadStatus::Paid);
}

#[tokio::test]
async fn query_id_takes_precedence_over_body() {
    let h = Harness::new().await;
    let body = payment("PAY-1", "approved", TOKEN);

    let request = signed_request(&h, "/api/payment/webhook?id=555&topic=payment", &body, "555");
    let (status, _) = h.send(request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.status_of(42).await, LeadStatus::Paid);
}

#[tokio::test]
async fn generate_then_pay_with_issued_reference() {
    let h = Harness::new().await;

    let (status, body) = h.send(post_json("/api/payment/generate", json!({"leadId": 42}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let payment_info = &body["payment"];
    assert_eq!(payment_info["lead_id"], 42);
    assert_eq!(payment_info["amount"], 47.0);
    assert_eq!(payment_info["provider"], "placeholder");
    assert!(payment_info["pix_code"].as_str().unwrap().starts_with("000201"));
    let reference = payment_info["external_reference"].as_str().unwrap().to_string();
    assert!(reference.starts_with("lead_42_"));

    let (status, _) = h
        .send(h.signed_webhook(&payment("PAY-77", "approved", &reference), "req-9"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.status_of(42).await, LeadStatus::Paid);
}

#[tokio::test]
async fn generate_validates_lead() {
    let h = Harness::new().await;

    let (status, body) = h.send(post_json("/api/payment/generate", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "leadId is required");

    let (status, body) = h.send(post_json("/api/payment/generate", json!({"leadId": 7}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn payment_status_errors() {
    let h = Harness::new().await;

    let (status, body) = h.send(get("/api/payment/status/42")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PENDING");
    assert_eq!(body["paymentId"], Value::Null);

    let (status, _) = h.send(get("/api/payment/status/7")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = h.send(get("/api/payment/status/abc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
