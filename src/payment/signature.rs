//! Payment callback signature verification using HMAC-SHA256.
//!
//! The provider signs a manifest built from the notification's data id, the
//! `x-request-id` header and the timestamp carried in `x-signature`:
//!
//! ```text
//! x-signature: ts=1700000000,v1=<hex hmac-sha256>
//! manifest:    id:{data_id};request-id:{request_id};ts:{ts};
//! ```
//!
//! Verification runs in a fixed order: headers present, header well formed,
//! secret usable, hash matches, timestamp fresh. Only the first failure is
//! reported.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, warn};

use crate::config::{usable_secret, RuntimeMode};
use crate::error::SignatureError;
use crate::payment::scalar_string;

type HmacSha256 = Hmac<Sha256>;

/// Signature header name
pub const SIGNATURE_HEADER: &str = "x-signature";

/// Request id header name
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Maximum accepted distance between `ts` and the local clock, in seconds
pub const MAX_SKEW_SECS: u64 = 300;

/// Warning surfaced when a relaxed runtime accepts an unsigned callback
pub const UNVERIFIED_WARNING: &str = "development mode - signature not verified";

/// Everything the verifier looks at, borrowed from one inbound request.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureInput<'a> {
    /// Raw `x-signature` header value
    pub signature: Option<&'a str>,
    /// Raw `x-request-id` header value
    pub request_id: Option<&'a str>,
    /// Query parameter `id`
    pub query_id: Option<&'a str>,
    /// Parsed JSON body, if it parsed
    pub body: Option<&'a Value>,
}

/// Successful verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verified {
    /// Set when the callback was accepted without checking a signature
    pub warning: Option<&'static str>,
}

/// `ts` and `v1` extracted from the signature header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SignatureParts<'a> {
    /// Unix seconds as sent
    pub ts: Option<&'a str>,
    /// Hex HMAC as sent
    pub v1: Option<&'a str>,
}

/// Splits `ts=..,v1=..` on `,` and each segment on its first `=`.
///
/// Unknown keys are ignored and a repeated key keeps its last value.
/// Never panics.
pub fn parse_signature_header(header: &str) -> SignatureParts<'_> {
    let mut parts = SignatureParts::default();
    for segment in header.split(',') {
        let Some((key, value)) = segment.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "ts" => parts.ts = Some(value).filter(|v| !v.is_empty()),
            "v1" => parts.v1 = Some(value).filter(|v| !v.is_empty()),
            _ => {}
        }
    }
    parts
}

/// The exact string the provider signs
pub fn build_manifest(data_id: &str, request_id: &str, ts: &str) -> String {
    format!("id:{};request-id:{};ts:{};", data_id, request_id, ts)
}

/// First non-empty of query `id`, body `data.id`, body `id`.
///
/// Absence yields an empty string: the manifest is still computed.
pub fn resolve_data_id(input: &SignatureInput<'_>) -> String {
    input
        .query_id
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| {
            let body = input.body?;
            scalar_string(body.get("data").and_then(|d| d.get("id")))
                .or_else(|| scalar_string(body.get("id")))
        })
        .unwrap_or_default()
}

/// Hex HMAC-SHA256 of `manifest` keyed by `secret`.
pub fn compute_signature(secret: &str, manifest: &str) -> String {
    hex::encode(mac_for(secret, manifest).finalize().into_bytes())
}

fn mac_for(secret: &str, manifest: &str) -> HmacSha256 {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts keys of any size"),
    };
    mac.update(manifest.as_bytes());
    mac
}

/// Verifies payment callbacks against a shared secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Option<String>,
    mode: RuntimeMode,
    max_skew_secs: u64,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("mode", &self.mode)
            .field("max_skew_secs", &self.max_skew_secs)
            .finish()
    }
}

impl SignatureVerifier {
    /// Create a verifier. A missing, blank or placeholder secret is rejected
    /// at verification time in hardened mode and tolerated in relaxed mode.
    pub fn new(secret: Option<String>, mode: RuntimeMode) -> Self {
        let secret = usable_secret(secret.as_deref()).map(str::to_string);
        if secret.is_none() {
            match mode {
                RuntimeMode::Hardened => {
                    warn!("Webhook secret not configured: every payment callback will be rejected")
                }
                RuntimeMode::Relaxed => {
                    warn!("Webhook secret not configured: callbacks accepted UNVERIFIED (relaxed mode)")
                }
            }
        }
        Self {
            secret,
            mode,
            max_skew_secs: MAX_SKEW_SECS,
        }
    }

    /// Runtime mode this verifier was built for
    pub fn mode(&self) -> RuntimeMode {
        self.mode
    }

    /// Verify against the current clock
    pub fn verify(&self, input: &SignatureInput<'_>) -> Result<Verified, SignatureError> {
        self.verify_at(input, Utc::now().timestamp())
    }

    /// Verify against `now_secs` (Unix seconds)
    pub fn verify_at(
        &self,
        input: &SignatureInput<'_>,
        now_secs: i64,
    ) -> Result<Verified, SignatureError> {
        let (Some(header), Some(request_id)) = (input.signature, input.request_id) else {
            warn!("Missing webhook signature headers");
            return Err(SignatureError::MissingHeaders);
        };

        let parts = parse_signature_header(header);
        let (Some(ts_raw), Some(received)) = (parts.ts, parts.v1) else {
            warn!(header = %header, "Invalid webhook signature format");
            return Err(SignatureError::InvalidFormat);
        };
        let Ok(ts) = ts_raw.parse::<i64>() else {
            warn!(ts = %ts_raw, "Webhook signature timestamp is not an integer");
            return Err(SignatureError::InvalidFormat);
        };

        let Some(secret) = self.secret.as_deref() else {
            return match self.mode {
                RuntimeMode::Hardened => {
                    warn!("Rejecting webhook: secret not configured in hardened mode");
                    Err(SignatureError::SecretNotConfigured)
                }
                RuntimeMode::Relaxed => {
                    warn!("Allowing webhook without signature check (relaxed mode)");
                    Ok(Verified {
                        warning: Some(UNVERIFIED_WARNING),
                    })
                }
            };
        };

        let data_id = resolve_data_id(input);
        let manifest = build_manifest(&data_id, request_id, ts_raw);
        let mac = mac_for(secret, &manifest);

        let matches = hex::decode(received)
            .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
            .unwrap_or(false);
        if !matches {
            warn!(
                manifest = %manifest,
                expected = %hex::encode(mac.finalize().into_bytes()),
                received = %received,
                "Webhook signature mismatch"
            );
            return Err(SignatureError::Mismatch);
        }

        let skew = now_secs.saturating_sub(ts);
        if skew.unsigned_abs() > self.max_skew_secs {
            warn!(ts, now = now_secs, skew, "Webhook timestamp outside freshness window");
            return Err(SignatureError::TimestampTooOld);
        }

        debug!(data_id = %data_id, request_id = %request_id, "Webhook signature verified");
        Ok(Verified { warning: None })
    }
}
