//! LeadPay - Lead Onboarding and Payment Reconciliation Server
//!
//! Captures leads, issues PIX payment sessions for them, and reconciles the
//! payment provider's signed callbacks into an idempotent PENDING -> PAID
//! transition.
//!
//! # Features
//!
//! - **Webhook Verification**: HMAC-SHA256 over a data-id/request-id/timestamp manifest
//! - **Correlation**: `lead_<id>_<millis>` tokens threaded through the provider
//! - **Idempotent Ledger**: first writer wins, in memory or SQLite
//! - **Lead Capture**: validated contacts with best-effort CRM sync
//!
//! # Architecture
//!
//! ```text
//! Client ──▶ /api/lead/capture ──▶ Lead Ledger ◀── mark_paid ──┐
//!                                      │                       │
//! Client ──▶ /api/payment/generate ──▶ Session Issuer ──▶ Provider
//!                                                              │
//! Provider ──▶ /api/payment/webhook ──▶ Signature Verifier ──▶ Reconciler
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use leadpay::config::AppConfig;
//! use leadpay::server::{app_router, open_ledger, AppState};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::from_env()?;
//!     let ledger = open_ledger(&config)?;
//!     let app = app_router(Arc::new(AppState::new(config, ledger)?));
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3003").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod cors;
pub mod error;
pub mod handlers;
pub mod lead;
pub mod ledger;
pub mod payment;
pub mod server;

// Re-exports for convenience
pub use config::{AppConfig, RuntimeMode};
pub use error::{Error, Result};
pub use ledger::{Lead, LeadId, LeadLedger, LeadStatus};
pub use payment::{PaymentSessionIssuer, SignatureVerifier, WebhookReconciler};
pub use server::{app_router, AppState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
