//! Application state and router assembly

use std::sync::Arc;

use axum::http::{StatusCode, Uri};
use axum::response::IntoResponse;
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::AppConfig;
use crate::cors::cors_layer;
use crate::error::{LedgerError, Result};
use crate::handlers::{status_router, ServerStats};
use crate::lead::{lead_router, BrevoContactSync, ContactSync, CrmPaidHook, NoopContactSync};
use crate::ledger::{InMemoryLeadLedger, LeadLedger, SqliteLeadLedger};
use crate::payment::{
    payment_router, Amount, LoggingPaidHook, MercadoPagoProvider, PaymentProvider,
    PaymentSessionIssuer, PlaceholderPixProvider, SignatureVerifier, WebhookReconciler,
};

/// Everything the handlers share. Built once at startup, immutable afterwards.
pub struct AppState {
    /// Startup configuration
    pub config: AppConfig,
    /// Lead storage
    pub ledger: Arc<dyn LeadLedger>,
    /// Payment session issuer
    pub issuer: PaymentSessionIssuer,
    /// Webhook reconciler
    pub reconciler: WebhookReconciler,
    /// CRM sync
    pub contacts: Arc<dyn ContactSync>,
    /// Runtime counters
    pub stats: ServerStats,
}

impl AppState {
    /// Wire providers from configuration
    pub fn new(config: AppConfig, ledger: Arc<dyn LeadLedger>) -> Result<Self> {
        let provider: Arc<dyn PaymentProvider> = match &config.payment.mercadopago {
            Some(mp) => Arc::new(MercadoPagoProvider::new(mp)?),
            None => Arc::new(PlaceholderPixProvider::new(
                &config.payment.merchant_name,
                &config.payment.merchant_city,
            )),
        };
        let contacts: Arc<dyn ContactSync> = match &config.crm {
            Some(brevo) => Arc::new(BrevoContactSync::new(brevo)?),
            None => Arc::new(NoopContactSync),
        };
        Ok(Self::with_components(config, ledger, provider, contacts))
    }

    /// Wire explicit components
    pub fn with_components(
        config: AppConfig,
        ledger: Arc<dyn LeadLedger>,
        provider: Arc<dyn PaymentProvider>,
        contacts: Arc<dyn ContactSync>,
    ) -> Self {
        let issuer = PaymentSessionIssuer::new(
            ledger.clone(),
            provider,
            config.payment.description.clone(),
            config.payment.validity,
        );

        let verifier = SignatureVerifier::new(config.webhook_secret.clone(), config.mode);
        let mut reconciler =
            WebhookReconciler::new(verifier, ledger.clone()).with_hook(Arc::new(LoggingPaidHook));
        if config.crm.is_some() {
            reconciler = reconciler.with_hook(Arc::new(CrmPaidHook::new(contacts.clone())));
        }

        info!(
            mode = %config.mode,
            provider = issuer.provider_name(),
            crm = contacts.name(),
            "Application state ready"
        );

        Self {
            config,
            ledger,
            issuer,
            reconciler,
            contacts,
            stats: ServerStats::new(),
        }
    }

    /// Amount charged per session
    pub fn amount(&self) -> Amount {
        Amount::from_cents(self.config.payment.amount_cents)
    }
}

/// SQLite when a database path is configured, memory otherwise
pub fn open_ledger(config: &AppConfig) -> std::result::Result<Arc<dyn LeadLedger>, LedgerError> {
    match &config.database {
        Some(path) => {
            info!(path = %path.display(), "Using SQLite lead ledger");
            Ok(Arc::new(SqliteLeadLedger::open(path)?))
        }
        None => {
            info!("Using in-memory lead ledger; leads are lost on restart");
            Ok(Arc::new(InMemoryLeadLedger::new()))
        }
    }
}

async fn not_found(uri: Uri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "message": "Endpoint not found",
            "path": uri.path(),
        })),
    )
}

/// Full HTTP surface
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(status_router())
        .nest("/api/payment", payment_router())
        .nest("/api/lead", lead_router())
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}
