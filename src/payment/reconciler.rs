//! Webhook Reconciler
//!
//! Drives one callback through
//! `RECEIVED -> VERIFIED -> PARSED -> RESOLVED -> APPLIED | IGNORED | REJECTED`
//! and turns the outcome into an [`Acknowledgement`].
//!
//! Only authentication and configuration failures are answered with a non-2xx
//! status. Every other outcome, including storage failures, is acknowledged so
//! the provider stops redelivering; the detail stays in the logs.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use futures::future::join_all;
use serde_json::{json, Value};
use tracing::{error, info, instrument, warn};

use crate::error::{LedgerError, WebhookError};
use crate::ledger::{Lead, LeadId, LeadLedger};
use crate::payment::envelope::{CallbackEnvelope, PAYMENT_KIND};
use crate::payment::reference;
use crate::payment::signature::{SignatureInput, SignatureVerifier};

/// One inbound callback, detached from the HTTP layer
#[derive(Debug, Clone, Default)]
pub struct CallbackRequest {
    /// `x-signature` header
    pub signature: Option<String>,
    /// `x-request-id` header
    pub request_id: Option<String>,
    /// Query parameter `id`
    pub query_id: Option<String>,
    /// Raw body
    pub body: Vec<u8>,
}

impl CallbackRequest {
    /// Request with a JSON body and no headers
    pub fn with_json(body: &Value) -> Self {
        Self {
            body: body.to_string().into_bytes(),
            ..Default::default()
        }
    }
}

/// Why a verified callback caused no state change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Topic other than `payment`
    NotPayment {
        /// Notification topic
        kind: String,
    },
    /// Payment status other than `approved`
    NotApproved {
        /// Provider status
        status: String,
    },
}

impl IgnoreReason {
    fn for_envelope(envelope: CallbackEnvelope) -> Self {
        if envelope.kind != PAYMENT_KIND {
            Self::NotPayment {
                kind: envelope.kind,
            }
        } else {
            Self::NotApproved {
                status: envelope.status,
            }
        }
    }
}

/// Successful terminal states of one callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// Lead moved PENDING -> PAID by this callback
    Applied {
        /// Lead that was paid
        lead_id: LeadId,
        /// Payment id recorded on the lead, if the provider sent one
        payment_id: Option<String>,
        /// Paid hooks that failed; never rolls the transition back
        follow_up_failures: usize,
    },
    /// Lead was already PAID; nothing changed
    AlreadyPaid {
        /// Lead concerned
        lead_id: LeadId,
        /// Payment id carried by this callback
        payment_id: Option<String>,
        /// Payment id recorded by the first writer
        recorded_payment_id: Option<String>,
    },
    /// Verified but not actionable
    Ignored(IgnoreReason),
}

/// Side effect run once after a lead becomes PAID.
///
/// Failures are logged and counted, never propagated.
#[async_trait::async_trait]
pub trait PaidLeadHook: Send + Sync + 'static {
    /// Hook name for logs
    fn name(&self) -> &'static str;

    /// Called with the lead as stored after the transition
    async fn on_paid(&self, lead: &Lead) -> anyhow::Result<()>;
}

/// Writes an audit line for each paid lead
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingPaidHook;

#[async_trait::async_trait]
impl PaidLeadHook for LoggingPaidHook {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn on_paid(&self, lead: &Lead) -> anyhow::Result<()> {
        info!(
            lead_id = %lead.id,
            email = %lead.email,
            payment_id = ?lead.payment_id,
            "Lead paid"
        );
        Ok(())
    }
}

/// Reconciles verified callbacks against the lead ledger
pub struct WebhookReconciler {
    verifier: SignatureVerifier,
    ledger: Arc<dyn LeadLedger>,
    hooks: Vec<Arc<dyn PaidLeadHook>>,
}

impl WebhookReconciler {
    /// Create a reconciler without hooks
    pub fn new(verifier: SignatureVerifier, ledger: Arc<dyn LeadLedger>) -> Self {
        Self {
            verifier,
            ledger,
            hooks: Vec::new(),
        }
    }

    /// Add a hook run after each applied transition
    pub fn with_hook(mut self, hook: Arc<dyn PaidLeadHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Verifier in use
    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    /// Reconcile against the current clock
    pub async fn reconcile(&self, request: &CallbackRequest) -> Result<Reconciled, WebhookError> {
        self.reconcile_at(request, Utc::now().timestamp()).await
    }

    /// Reconcile with signature freshness checked against `now_secs`
    #[instrument(skip_all, fields(request_id = request.request_id.as_deref().unwrap_or("-")))]
    pub async fn reconcile_at(
        &self,
        request: &CallbackRequest,
        now_secs: i64,
    ) -> Result<Reconciled, WebhookError> {
        let result = self.run(request, now_secs).await;
        log_outcome(&result);
        result
    }

    async fn run(&self, request: &CallbackRequest, now_secs: i64) -> Result<Reconciled, WebhookError> {
        let parsed: Result<Value, serde_json::Error> = serde_json::from_slice(&request.body);

        // VERIFIED
        let input = SignatureInput {
            signature: request.signature.as_deref(),
            request_id: request.request_id.as_deref(),
            query_id: request.query_id.as_deref(),
            body: parsed.as_ref().ok(),
        };
        let verified = self.verifier.verify_at(&input, now_secs)?;
        if let Some(warning) = verified.warning {
            warn!(warning, "Processing unverified callback");
        }

        // PARSED
        let body = parsed.map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
        let envelope = CallbackEnvelope::from_value(&body)?;
        info!(
            kind = %envelope.kind,
            action = %envelope.action,
            status = %envelope.status,
            payment_id = ?envelope.provider_payment_id,
            external_reference = ?envelope.external_reference,
            "Callback parsed"
        );

        if !envelope.is_approved_payment() {
            return Ok(Reconciled::Ignored(IgnoreReason::for_envelope(envelope)));
        }

        // RESOLVED
        let payment_id = envelope.provider_payment_id.clone();
        let lead_id = envelope
            .external_reference
            .as_deref()
            .and_then(reference::decode)
            .or(envelope.lead_id_hint)
            .ok_or_else(|| WebhookError::UnresolvedReference {
                payment_id: payment_id.clone(),
            })?;
        if payment_id.is_none() {
            warn!(
                lead_id = %lead_id,
                "Approved payment without a payment id, marking PAID for manual audit"
            );
        }

        // APPLIED
        let outcome = self
            .ledger
            .mark_paid(lead_id, payment_id.as_deref())
            .await
            .map_err(|e| match e {
                LedgerError::NotFound(id) => WebhookError::NotFound(id),
                other => WebhookError::Ledger(other),
            })?;

        if !outcome.applied {
            return Ok(Reconciled::AlreadyPaid {
                lead_id,
                payment_id,
                recorded_payment_id: outcome.lead.payment_id,
            });
        }

        let follow_up_failures = self.run_hooks(&outcome.lead).await;
        Ok(Reconciled::Applied {
            lead_id,
            payment_id,
            follow_up_failures,
        })
    }

    async fn run_hooks(&self, lead: &Lead) -> usize {
        let results = join_all(self.hooks.iter().map(|hook| async move {
            (hook.name(), hook.on_paid(lead).await)
        }))
        .await;

        results
            .into_iter()
            .filter_map(|(name, result)| result.err().map(|e| (name, e)))
            .inspect(|(name, e)| {
                warn!(hook = %name, lead_id = %lead.id, error = %e, "Paid hook failed");
            })
            .count()
    }
}

fn log_outcome(result: &Result<Reconciled, WebhookError>) {
    match result {
        Ok(Reconciled::Applied {
            lead_id,
            payment_id,
            follow_up_failures,
        }) => info!(
            lead_id = %lead_id,
            payment_id = ?payment_id,
            follow_up_failures,
            "Lead marked PAID"
        ),
        Ok(Reconciled::AlreadyPaid {
            lead_id,
            payment_id,
            recorded_payment_id,
        }) => {
            if recorded_payment_id == payment_id {
                info!(lead_id = %lead_id, payment_id = ?payment_id, "Duplicate callback, lead already PAID");
            } else {
                warn!(
                    lead_id = %lead_id,
                    payment_id = ?payment_id,
                    recorded_payment_id = ?recorded_payment_id,
                    "Lead already PAID under a different payment id"
                );
            }
        }
        Ok(Reconciled::Ignored(reason)) => info!(reason = ?reason, "Callback ignored"),
        Err(e @ WebhookError::UnresolvedReference { .. }) => {
            warn!(error = %e, "Needs manual reconciliation")
        }
        Err(WebhookError::Ledger(e)) => error!(error = %e, "Ledger failure while applying callback"),
        Err(e) if e.is_rejection() => warn!(reason = %e.reason(), "Callback rejected"),
        Err(e) => warn!(error = %e, "Callback acknowledged without state change"),
    }
}

/// HTTP answer to one callback
#[derive(Debug, Clone, PartialEq)]
pub struct Acknowledgement {
    /// Status code
    pub status: StatusCode,
    /// JSON body
    pub body: Value,
}

impl Acknowledgement {
    /// Map a reconciliation result to the provider-facing answer.
    ///
    /// Rejections get `401 {success:false, reason}`; everything else gets
    /// `200 {received:true}`.
    pub fn from_result(result: &Result<Reconciled, WebhookError>) -> Self {
        match result {
            Err(e) if e.is_rejection() => Self {
                status: StatusCode::UNAUTHORIZED,
                body: json!({ "success": false, "reason": e.reason() }),
            },
            _ => Self {
                status: StatusCode::OK,
                body: json!({ "received": true }),
            },
        }
    }
}

impl IntoResponse for Acknowledgement {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
