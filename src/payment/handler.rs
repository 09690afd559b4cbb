//! Payment HTTP handlers
//!
//! - `POST /webhook` - provider callback, answered by [`Acknowledgement`]
//! - `POST /generate` - issue a payment session for `{leadId}`
//! - `GET /status/:lead_id` - current payment status of a lead

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Uri};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::error::ApiError;
use crate::ledger::LeadId;
use crate::payment::reconciler::{Acknowledgement, CallbackRequest};
use crate::payment::signature::{REQUEST_ID_HEADER, SIGNATURE_HEADER};
use crate::server::AppState;

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Build a callback request from raw HTTP parts. Never fails.
pub fn callback_request(headers: &HeaderMap, uri: &Uri, body: &[u8]) -> CallbackRequest {
    let query_id = uri.query().and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "id")
            .map(|(_, value)| value.into_owned())
    });
    CallbackRequest {
        signature: header(headers, SIGNATURE_HEADER),
        request_id: header(headers, REQUEST_ID_HEADER),
        query_id,
        body: body.to_vec(),
    }
}

/// `POST /api/payment/webhook`
#[instrument(skip_all)]
pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Acknowledgement {
    let request = callback_request(&headers, &uri, &body);
    let result = state.reconciler.reconcile(&request).await;
    state.stats.record_webhook(&result);
    Acknowledgement::from_result(&result)
}

fn lead_id_field(body: &Value) -> Option<LeadId> {
    match body.get("leadId")? {
        Value::Number(n) => n.as_u64().map(LeadId),
        Value::String(s) => s.trim().parse::<u64>().ok().map(LeadId),
        _ => None,
    }
}

/// `POST /api/payment/generate`
#[instrument(skip_all)]
pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let lead_id =
        lead_id_field(&body).ok_or_else(|| ApiError::BadRequest("leadId is required".to_string()))?;

    let session = state.issuer.create_session(lead_id, state.amount()).await?;
    state.stats.record_session();

    Ok(Json(json!({
        "success": true,
        "message": "Payment generated",
        "payment": session,
    })))
}

/// `GET /api/payment/status/:lead_id`
#[instrument(skip_all)]
pub async fn payment_status_handler(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let lead_id = lead_id
        .trim()
        .parse::<u64>()
        .map(LeadId)
        .map_err(|_| ApiError::BadRequest("leadId must be a positive integer".to_string()))?;

    let lead = state
        .ledger
        .find_by_id(lead_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("lead {} not found", lead_id)))?;
    debug!(lead_id = %lead.id, status = %lead.status, "Payment status requested");

    Ok(Json(json!({
        "success": true,
        "leadId": lead.id,
        "status": lead.status,
        "paymentId": lead.payment_id,
        "updatedAt": lead.updated_at,
    })))
}

/// Routes nested under `/api/payment`
pub fn payment_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/webhook", post(webhook_handler))
        .route("/generate", post(generate_handler))
        .route("/status/:lead_id", get(payment_status_handler))
}
