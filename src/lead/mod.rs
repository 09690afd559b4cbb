//! Lead capture API
//!
//! Captured contacts become PENDING leads in the ledger and are pushed to the
//! CRM on a best-effort basis: a CRM failure is reported in the response as
//! `crmError` but never fails the capture.

pub mod crm;
pub mod validation;

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::error::ApiError;
use crate::ledger::{LeadFilter, LeadStatus};
use crate::server::AppState;

pub use crm::{BrevoContactSync, ContactSync, CrmPaidHook, NoopContactSync, SyncOutcome};
pub use validation::{validate_capture, CaptureRequest};

/// Largest page `list` will return
pub const MAX_PAGE_SIZE: usize = 500;

/// `POST /api/lead/capture`
#[instrument(skip_all)]
pub async fn capture_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CaptureRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let new_lead = validate_capture(&request).map_err(ApiError::Validation)?;

    let lead = state.ledger.create(new_lead).await?;
    state.stats.record_lead();
    info!(lead_id = %lead.id, email = %lead.email, "Lead captured");

    let crm_error = match state.contacts.upsert_contact(&lead).await {
        Ok(_) => None,
        Err(e) => {
            warn!(lead_id = %lead.id, crm = state.contacts.name(), error = %e, "CRM sync failed");
            Some(e.to_string())
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "leadId": lead.id,
            "message": "Lead captured",
            "crmError": crm_error,
            "data": {
                "id": lead.id,
                "name": lead.name,
                "status": lead.status,
            },
        })),
    ))
}

/// `GET /api/lead/stats`
#[instrument(skip_all)]
pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.ledger.count_by_status().await?;
    Ok(Json(json!({ "success": true, "stats": stats })))
}

/// Query string of `GET /api/lead/list`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    /// `PENDING` or `PAID`, case-insensitive
    pub status: Option<String>,
    /// Page size, capped at [`MAX_PAGE_SIZE`]
    pub limit: Option<usize>,
    /// Page offset
    pub offset: Option<usize>,
}

impl ListQuery {
    fn into_filter(self) -> Result<LeadFilter, ApiError> {
        let status = match self.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => Some(LeadStatus::parse(&s.to_ascii_uppercase()).ok_or_else(|| {
                ApiError::BadRequest(format!("unknown status '{}'", s))
            })?),
            None => None,
        };
        let defaults = LeadFilter::default();
        Ok(LeadFilter {
            status,
            limit: self.limit.unwrap_or(defaults.limit).min(MAX_PAGE_SIZE),
            offset: self.offset.unwrap_or(defaults.offset),
        })
    }
}

/// `GET /api/lead/list`
#[instrument(skip_all)]
pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListQuery>, axum::extract::rejection::QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let leads = state.ledger.list(query.into_filter()?).await?;
    Ok(Json(json!({
        "success": true,
        "count": leads.len(),
        "leads": leads,
    })))
}

/// Routes nested under `/api/lead`
pub fn lead_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/capture", post(capture_handler))
        .route("/stats", get(stats_handler))
        .route("/list", get(list_handler))
}
