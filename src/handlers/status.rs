//! Status and health check handlers for the LeadPay server.
//!
//! - `/health` - liveness probe for load balancers
//! - `/status` - version, uptime, pipeline counters and lead totals
//!
//! # Example Response
//!
//! ```json
//! {
//!   "version": "0.1.0",
//!   "name": "leadpay",
//!   "uptime_seconds": 3600,
//!   "mode": "hardened",
//!   "webhooks": {
//!     "received": 120, "applied": 40, "duplicates": 70,
//!     "ignored": 8, "acknowledged_failures": 1, "rejected": 1
//!   },
//!   "sessions_issued": 52,
//!   "leads_captured": 61,
//!   "leads": { "PENDING": 21, "PAID": 40, "total": 61 },
//!   "status": "running",
//!   "timestamp": "2026-01-01T12:00:00Z"
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::error::WebhookError;
use crate::ledger::LeadStats;
use crate::payment::Reconciled;
use crate::server::AppState;

/// Server version from Cargo.toml
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server name from Cargo.toml
pub const SERVER_NAME: &str = env!("CARGO_PKG_NAME");

// ============================================================================
// Response Types
// ============================================================================

/// Liveness probe response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "OK" if responding
    pub status: String,
    /// RFC 3339 timestamp
    pub timestamp: String,
    /// Seconds since start
    pub uptime_seconds: u64,
    /// Runtime mode
    pub mode: String,
}

/// Webhook outcome counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookCounters {
    /// Callbacks received
    pub received: u64,
    /// PENDING -> PAID transitions applied
    pub applied: u64,
    /// Callbacks for leads already PAID
    pub duplicates: u64,
    /// Verified callbacks that were not actionable
    pub ignored: u64,
    /// Verified callbacks acknowledged despite an error
    pub acknowledged_failures: u64,
    /// Callbacks answered 401
    pub rejected: u64,
}

/// Detailed status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Server version (from Cargo.toml)
    pub version: String,
    /// Server name
    pub name: String,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Runtime mode
    pub mode: String,
    /// Payment provider in use
    pub payment_provider: String,
    /// CRM in use
    pub crm: String,
    /// Webhook pipeline counters
    pub webhooks: WebhookCounters,
    /// Payment sessions issued
    pub sessions_issued: u64,
    /// Leads captured through the API
    pub leads_captured: u64,
    /// Lead totals from the ledger; absent if the ledger failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leads: Option<LeadStats>,
    /// Always "running" if responding
    pub status: String,
    /// RFC 3339 timestamp
    pub timestamp: String,
}

// ============================================================================
// Server Stats
// ============================================================================

/// Lock-free counters shared by all handlers.
#[derive(Debug)]
pub struct ServerStats {
    start_time: Instant,
    webhooks_received: AtomicU64,
    webhooks_applied: AtomicU64,
    webhooks_duplicate: AtomicU64,
    webhooks_ignored: AtomicU64,
    webhooks_failed: AtomicU64,
    webhooks_rejected: AtomicU64,
    sessions_issued: AtomicU64,
    leads_captured: AtomicU64,
}

impl ServerStats {
    /// Counters at zero, uptime starting now
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            webhooks_received: AtomicU64::new(0),
            webhooks_applied: AtomicU64::new(0),
            webhooks_duplicate: AtomicU64::new(0),
            webhooks_ignored: AtomicU64::new(0),
            webhooks_failed: AtomicU64::new(0),
            webhooks_rejected: AtomicU64::new(0),
            sessions_issued: AtomicU64::new(0),
            leads_captured: AtomicU64::new(0),
        }
    }

    /// Seconds since start
    #[inline]
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Count one reconciled callback by outcome
    pub fn record_webhook(&self, result: &Result<Reconciled, WebhookError>) {
        self.webhooks_received.fetch_add(1, Ordering::Relaxed);
        let counter = match result {
            Ok(Reconciled::Applied { .. }) => &self.webhooks_applied,
            Ok(Reconciled::AlreadyPaid { .. }) => &self.webhooks_duplicate,
            Ok(Reconciled::Ignored(_)) => &self.webhooks_ignored,
            Err(e) if e.is_rejection() => &self.webhooks_rejected,
            Err(_) => &self.webhooks_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an issued payment session
    #[inline]
    pub fn record_session(&self) -> u64 {
        self.sessions_issued.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Count a captured lead
    #[inline]
    pub fn record_lead(&self) -> u64 {
        self.leads_captured.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Current webhook counters
    pub fn webhooks(&self) -> WebhookCounters {
        WebhookCounters {
            received: self.webhooks_received.load(Ordering::Relaxed),
            applied: self.webhooks_applied.load(Ordering::Relaxed),
            duplicates: self.webhooks_duplicate.load(Ordering::Relaxed),
            ignored: self.webhooks_ignored.load(Ordering::Relaxed),
            acknowledged_failures: self.webhooks_failed.load(Ordering::Relaxed),
            rejected: self.webhooks_rejected.load(Ordering::Relaxed),
        }
    }

    /// Sessions issued so far
    #[inline]
    pub fn sessions_issued(&self) -> u64 {
        self.sessions_issued.load(Ordering::Relaxed)
    }

    /// Leads captured so far
    #[inline]
    pub fn leads_captured(&self) -> u64 {
        self.leads_captured.load(Ordering::Relaxed)
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// HTTP Handlers
// ============================================================================

/// `GET /health`
#[instrument(skip_all)]
pub async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Health check requested");
    let response = HealthResponse {
        status: "OK".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_seconds: state.stats.uptime_seconds(),
        mode: state.config.mode.to_string(),
    };
    (StatusCode::OK, Json(response))
}

/// `GET /status`
///
/// Ledger failures do not fail the endpoint; `leads` is omitted instead.
#[instrument(skip_all)]
pub async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Status check requested");

    let leads = match state.ledger.count_by_status().await {
        Ok(stats) => Some(stats),
        Err(e) => {
            warn!(error = %e, "Lead totals unavailable for status");
            None
        }
    };

    let response = StatusResponse {
        version: SERVER_VERSION.to_string(),
        name: SERVER_NAME.to_string(),
        uptime_seconds: state.stats.uptime_seconds(),
        mode: state.config.mode.to_string(),
        payment_provider: state.issuer.provider_name().to_string(),
        crm: state.contacts.name().to_string(),
        webhooks: state.stats.webhooks(),
        sessions_issued: state.stats.sessions_issued(),
        leads_captured: state.stats.leads_captured(),
        leads,
        status: "running".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(response))
}

/// Routes for `/health` and `/status`
pub fn status_router() -> axum::Router<Arc<AppState>> {
    use axum::routing::get;

    axum::Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
}

// ============================================================================
// Tests
// ============================================================================
