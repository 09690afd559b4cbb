//! CRM contact synchronisation
//!
//! Captured leads are pushed to Brevo as contacts, and flagged as paid once
//! the payment pipeline applies the PAID transition. Both calls are single
//! best-effort attempts: the lead is stored whether or not the CRM answers.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::BrevoConfig;
use crate::error::CrmError;
use crate::ledger::Lead;
use crate::payment::PaidLeadHook;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ERROR_BODY: usize = 512;

/// What the CRM did with a contact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// New contact created
    Created {
        /// CRM contact id, when returned
        id: Option<u64>,
    },
    /// Contact was already present
    AlreadyExists,
    /// Existing contact updated
    Updated,
    /// No CRM configured
    Skipped,
}

/// Outbound CRM seam
#[async_trait::async_trait]
pub trait ContactSync: Send + Sync + 'static {
    /// CRM name for logs
    fn name(&self) -> &'static str;

    /// Create the contact for a newly captured lead
    async fn upsert_contact(&self, lead: &Lead) -> Result<SyncOutcome, CrmError>;

    /// Flag the contact as a paying customer
    async fn mark_paid(&self, lead: &Lead) -> Result<SyncOutcome, CrmError>;
}

/// Used when no CRM credentials are configured
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopContactSync;

#[async_trait::async_trait]
impl ContactSync for NoopContactSync {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn upsert_contact(&self, lead: &Lead) -> Result<SyncOutcome, CrmError> {
        debug!(lead_id = %lead.id, "CRM disabled, contact not synced");
        Ok(SyncOutcome::Skipped)
    }

    async fn mark_paid(&self, _lead: &Lead) -> Result<SyncOutcome, CrmError> {
        Ok(SyncOutcome::Skipped)
    }
}

/// Brevo (Sendinblue) contacts API
#[derive(Clone)]
pub struct BrevoContactSync {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    list_id: u64,
}

impl std::fmt::Debug for BrevoContactSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrevoContactSync")
            .field("base_url", &self.base_url)
            .field("list_id", &self.list_id)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct CreatedContact {
    #[serde(default)]
    id: Option<u64>,
}

impl BrevoContactSync {
    /// Build a client for the configured account
    pub fn new(config: &BrevoConfig) -> Result<Self, CrmError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            list_id: config.list_id,
        })
    }

    fn contact_url(&self, email: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(email.as_bytes()).collect();
        format!("{}/v3/contacts/{}", self.base_url, encoded)
    }
}

async fn rejection(response: reqwest::Response) -> CrmError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    CrmError::Rejected {
        status,
        body: body.chars().take(MAX_ERROR_BODY).collect(),
    }
}

#[async_trait::async_trait]
impl ContactSync for BrevoContactSync {
    fn name(&self) -> &'static str {
        "brevo"
    }

    async fn upsert_contact(&self, lead: &Lead) -> Result<SyncOutcome, CrmError> {
        let body = json!({
            "email": lead.email,
            "attributes": { "FIRSTNAME": lead.name },
            "listIds": [self.list_id],
        });

        let response = self
            .client
            .post(format!("{}/v3/contacts", self.base_url))
            .header("api-key", &self.api_key)
            .header("accept", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let created: CreatedContact = response.json().await.unwrap_or(CreatedContact { id: None });
            info!(lead_id = %lead.id, contact_id = ?created.id, "Contact saved to Brevo");
            return Ok(SyncOutcome::Created { id: created.id });
        }

        let err = rejection(response).await;
        match &err {
            CrmError::Rejected { status: 400, body } if body.contains("duplicate_parameter") => {
                info!(lead_id = %lead.id, "Contact already exists in Brevo");
                Ok(SyncOutcome::AlreadyExists)
            }
            _ => {
                warn!(lead_id = %lead.id, error = %err, "Brevo contact creation failed");
                Err(err)
            }
        }
    }

    async fn mark_paid(&self, lead: &Lead) -> Result<SyncOutcome, CrmError> {
        let body = json!({
            "attributes": {
                "PAYMENT_STATUS": lead.status.as_str(),
                "PAYMENT_ID": lead.payment_id,
            },
        });

        let response = self
            .client
            .put(self.contact_url(&lead.email))
            .header("api-key", &self.api_key)
            .header("accept", "application/json")
            .json(&body)
            .send()
            .await?;

        if response.status().is_success() {
            debug!(lead_id = %lead.id, "Brevo contact flagged as paid");
            Ok(SyncOutcome::Updated)
        } else {
            Err(rejection(response).await)
        }
    }
}

/// Paid hook forwarding the transition to the CRM
pub struct CrmPaidHook {
    sync: Arc<dyn ContactSync>,
}

impl CrmPaidHook {
    /// Wrap a contact sync
    pub fn new(sync: Arc<dyn ContactSync>) -> Self {
        Self { sync }
    }
}

#[async_trait::async_trait]
impl PaidLeadHook for CrmPaidHook {
    fn name(&self) -> &'static str {
        "crm"
    }

    async fn on_paid(&self, lead: &Lead) -> anyhow::Result<()> {
        self.sync.mark_paid(lead).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LeadId, LeadStatus};
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{post, put};
    use axum::{Json, Router};
    use chrono::Utc;
    use serde_json::Value;

    fn lead(email: &str) -> Lead {
        let now = Utc::now();
        Lead {
            id: LeadId(1),
            name: "Ana".to_string(),
            email: email.to_string(),
            whatsapp: None,
            status: LeadStatus::Paid,
            payment_id: Some("PAY-1".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    async fn brevo(app: Router) -> BrevoContactSync {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        BrevoContactSync::new(&BrevoConfig {
            api_key: "xkeysib-test".to_string(),
            list_id: 2,
            base_url: format!("http://{}", addr),
        })
        .unwrap()
    }

    fn mock_api() -> Router {
        Router::new()
            .route(
                "/v3/contacts",
                post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                    assert_eq!(headers["api-key"], "xkeysib-test");
                    assert_eq!(body["listIds"][0], 2);
                    assert_eq!(body["attributes"]["FIRSTNAME"], "Ana");
                    match body["email"].as_str() {
                        Some("dup@example.com") => (
                            StatusCode::BAD_REQUEST,
                            Json(serde_json::json!({
                                "code": "duplicate_parameter",
                                "message": "Contact already exist"
                            })),
                        ),
                        Some("bad@example.com") => (
                            StatusCode::BAD_REQUEST,
                            Json(serde_json::json!({"code": "invalid_parameter"})),
                        ),
                        _ => (StatusCode::CREATED, Json(serde_json::json!({"id": 77}))),
                    }
                }),
            )
            .route(
                "/v3/contacts/:email",
                put(|Path(email): Path<String>, Json(body): Json<Value>| async move {
                    assert_eq!(email, "ana@example.com");
                    assert_eq!(body["attributes"]["PAYMENT_STATUS"], "PAID");
                    StatusCode::NO_CONTENT
                }),
            )
    }

    #[tokio::test]
    async fn test_upsert_contact_outcomes() {
        let sync = brevo(mock_api()).await;

        assert_eq!(
            sync.upsert_contact(&lead("ana@example.com")).await.unwrap(),
            SyncOutcome::Created { id: Some(77) }
        );
        assert_eq!(
            sync.upsert_contact(&lead("dup@example.com")).await.unwrap(),
            SyncOutcome::AlreadyExists
        );
        let err = sync.upsert_contact(&lead("bad@example.com")).await.unwrap_err();
        assert!(matches!(err, CrmError::Rejected { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_paid_hook_updates_contact() {
        let sync = Arc::new(brevo(mock_api()).await);
        let hook = CrmPaidHook::new(sync);
        hook.on_paid(&lead("ana@example.com")).await.unwrap();
    }

    #[tokio::test]
    async fn test_paid_hook_surfaces_failure() {
        let app = Router::new().route(
            "/v3/contacts/:email",
            put(|| async { StatusCode::NOT_FOUND }),
        );
        let hook = CrmPaidHook::new(Arc::new(brevo(app).await));
        assert!(hook.on_paid(&lead("ana@example.com")).await.is_err());
    }

    #[tokio::test]
    async fn test_noop_sync() {
        let sync = NoopContactSync;
        assert_eq!(
            sync.upsert_contact(&lead("ana@example.com")).await.unwrap(),
            SyncOutcome::Skipped
        );
    }
}
