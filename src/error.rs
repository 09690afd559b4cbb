//! Error types for LeadPay
//!
//! One `thiserror` enum per concern, plus the crate-level [`Error`] returned
//! while wiring providers at startup. HTTP mapping lives in
//! [`ApiError`]; webhook acknowledgement mapping lives in
//! [`crate::payment::reconciler::Acknowledgement`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::ledger::LeadId;

/// Startup errors raised while wiring the application state
#[derive(Error, Debug)]
pub enum Error {
    /// Payment provider client could not be built
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// CRM client could not be built
    #[error("CRM error: {0}")]
    Crm(#[from] CrmError),
}

/// Result type alias for LeadPay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why an inbound callback failed authentication.
///
/// `Display` yields the reason string sent back to the provider in the 401 body.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureError {
    /// `x-signature` or `x-request-id` absent
    #[error("missing signature headers")]
    MissingHeaders,

    /// `x-signature` lacks `ts`/`v1`, or `ts` is not an integer
    #[error("invalid signature format")]
    InvalidFormat,

    /// No usable secret while running hardened
    #[error("secret not configured")]
    SecretNotConfigured,

    /// Supplied hash does not match the recomputed one
    #[error("signature mismatch")]
    Mismatch,

    /// `ts` outside the freshness window
    #[error("timestamp too old")]
    TimestampTooOld,
}

impl SignatureError {
    /// Wire-level reason string
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

/// Terminal failure kinds of one webhook delivery.
#[derive(Error, Debug)]
pub enum WebhookError {
    /// Bad, missing or stale signature
    #[error("authentication failed: {0}")]
    Authentication(SignatureError),

    /// Secret unset in a hardened runtime
    #[error("webhook secret not configured")]
    Configuration,

    /// Envelope could not be normalised
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// Approved payment without a decodable lead id
    #[error(
        "approved payment {} carries no resolvable lead reference",
        .payment_id.as_deref().unwrap_or("without id")
    )]
    UnresolvedReference {
        /// Provider payment identifier
        payment_id: Option<String>,
    },

    /// Decoded lead id is unknown to the ledger
    #[error("lead {0} not found")]
    NotFound(LeadId),

    /// Storage failure while applying the transition
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl WebhookError {
    /// True for the kinds that are answered with a non-2xx status.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Authentication(_) | Self::Configuration)
    }

    /// Reason string exposed to the provider on rejection
    pub fn reason(&self) -> String {
        match self {
            Self::Authentication(e) => e.reason(),
            Self::Configuration => SignatureError::SecretNotConfigured.reason(),
            other => other.to_string(),
        }
    }
}

impl From<SignatureError> for WebhookError {
    fn from(err: SignatureError) -> Self {
        match err {
            SignatureError::SecretNotConfigured => Self::Configuration,
            other => Self::Authentication(other),
        }
    }
}

/// Lead ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    /// No lead with this id
    #[error("lead {0} not found")]
    NotFound(LeadId),

    /// Underlying storage failure
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        LedgerError::Storage(err.to_string())
    }
}

impl From<tokio::task::JoinError> for LedgerError {
    fn from(err: tokio::task::JoinError) -> Self {
        LedgerError::Storage(format!("blocking task failed: {}", err))
    }
}

/// Payment provider communication errors
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Network/transport failure
    #[error("provider unreachable: {0}")]
    Transport(String),

    /// Provider answered with a non-success status
    #[error("provider rejected request with {status}: {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },

    /// Provider answered 2xx with an unusable body
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

/// Payment session issuance errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// The lead does not exist
    #[error("lead {0} not found")]
    LeadNotFound(LeadId),

    /// Provider call failed
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Ledger lookup failed
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// CRM synchronisation errors
#[derive(Error, Debug)]
pub enum CrmError {
    /// Network/transport failure
    #[error("CRM unreachable: {0}")]
    Transport(String),

    /// CRM answered with a non-success status
    #[error("CRM rejected request with {status}: {body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body, truncated
        body: String,
    },
}

impl From<reqwest::Error> for CrmError {
    fn from(err: reqwest::Error) -> Self {
        CrmError::Transport(err.to_string())
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A variable is set but cannot be parsed
    #[error("invalid value for {name}: {message}")]
    InvalidValue {
        /// Variable name
        name: &'static str,
        /// Parse failure
        message: String,
    },
}

/// Error surfaced by the JSON API routes.
#[derive(Debug)]
pub enum ApiError {
    /// 400 with a message
    BadRequest(String),
    /// 400 with a list of field errors
    Validation(Vec<String>),
    /// 404 with a message
    NotFound(String),
    /// 502 when an upstream call failed
    BadGateway(String),
    /// 500
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "message": message }),
            ),
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "errors": errors }),
            ),
            ApiError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                json!({ "success": false, "message": message }),
            ),
            ApiError::BadGateway(message) => (
                StatusCode::BAD_GATEWAY,
                json!({ "success": false, "message": message }),
            ),
            ApiError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "success": false, "message": message }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(id) => ApiError::NotFound(format!("lead {} not found", id)),
            LedgerError::Storage(msg) => {
                tracing::error!(error = %msg, "Ledger storage failure");
                ApiError::Internal("internal storage error".to_string())
            }
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::LeadNotFound(id) => ApiError::NotFound(format!("lead {} not found", id)),
            SessionError::Provider(e) => {
                tracing::error!(error = %e, "Payment provider call failed");
                ApiError::BadGateway("payment provider unavailable".to_string())
            }
            SessionError::Ledger(e) => e.into(),
        }
    }
}
