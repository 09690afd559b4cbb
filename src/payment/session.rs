//! Payment Session Issuer
//!
//! Mints a correlation token for a lead, asks a [`PaymentProvider`] for a
//! payable PIX charge carrying that token as `external_reference`, and returns
//! the artifact with an advisory expiry.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use tracing::{info, instrument};

use crate::error::{ProviderError, SessionError};
use crate::ledger::{LeadId, LeadLedger};
use crate::payment::reference;

/// Money amount in cents (BRL)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount {
    cents: u64,
}

impl Amount {
    /// Amount from integer cents
    pub const fn from_cents(cents: u64) -> Self {
        Self { cents }
    }

    /// Integer cents
    pub const fn cents(&self) -> u64 {
        self.cents
    }

    /// Decimal value, for JSON APIs that expect a number
    pub fn as_f64(&self) -> f64 {
        self.cents as f64 / 100.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.cents / 100, self.cents % 100)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

/// What the issuer asks a provider to charge
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    /// Lead being charged
    pub lead_id: LeadId,
    /// Amount to charge
    pub amount: Amount,
    /// Description shown to the payer
    pub description: String,
    /// Correlation token, echoed back by the provider's callback
    pub external_reference: String,
    /// Payer email
    pub payer_email: String,
    /// Advisory expiry
    pub expires_at: DateTime<Utc>,
}

/// What a provider returns for a charge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCharge {
    /// Provider-side payment id, when the provider assigns one up front
    pub provider_payment_id: Option<String>,
    /// PIX "copia e cola" code
    pub pix_code: String,
    /// Hosted QR image
    pub qr_code_url: Option<String>,
    /// Hosted payment page
    pub ticket_url: Option<String>,
}

/// Outbound payment gateway seam. One attempt per call, no retries.
#[async_trait::async_trait]
pub trait PaymentProvider: Send + Sync + 'static {
    /// Short provider name for logs and responses
    fn name(&self) -> &'static str;

    /// Create a payable charge
    async fn create_charge(&self, charge: &ChargeRequest) -> Result<ProviderCharge, ProviderError>;
}

/// Payable artifact handed back to the client
#[derive(Debug, Clone, Serialize)]
pub struct PaymentSession {
    /// Lead the session belongs to
    pub lead_id: LeadId,
    /// Charged amount
    pub amount: Amount,
    /// Correlation token, verbatim
    pub external_reference: String,
    /// Display code to copy into a banking app
    pub pix_code: String,
    /// QR image URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code_url: Option<String>,
    /// Hosted payment page
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_url: Option<String>,
    /// Provider name
    pub provider: &'static str,
    /// Provider payment id, when known at issuance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_payment_id: Option<String>,
    /// Advisory expiry, not enforced here
    pub expires_at: DateTime<Utc>,
}

/// Issues payment sessions for existing leads
pub struct PaymentSessionIssuer {
    ledger: Arc<dyn LeadLedger>,
    provider: Arc<dyn PaymentProvider>,
    description: String,
    validity: chrono::Duration,
}

impl PaymentSessionIssuer {
    /// Create an issuer. `validity` is the advisory session lifetime.
    pub fn new(
        ledger: Arc<dyn LeadLedger>,
        provider: Arc<dyn PaymentProvider>,
        description: impl Into<String>,
        validity: Duration,
    ) -> Self {
        Self {
            ledger,
            provider,
            description: description.into(),
            validity: chrono::Duration::from_std(validity)
                .unwrap_or_else(|_| chrono::Duration::minutes(30)),
        }
    }

    /// Name of the configured provider
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Issue a session now
    pub async fn create_session(
        &self,
        lead_id: LeadId,
        amount: Amount,
    ) -> Result<PaymentSession, SessionError> {
        self.create_session_at(lead_id, amount, Utc::now()).await
    }

    /// Issue a session as of `now`
    #[instrument(skip(self), fields(provider = self.provider.name()))]
    pub async fn create_session_at(
        &self,
        lead_id: LeadId,
        amount: Amount,
        now: DateTime<Utc>,
    ) -> Result<PaymentSession, SessionError> {
        let lead = self
            .ledger
            .find_by_id(lead_id)
            .await?
            .ok_or(SessionError::LeadNotFound(lead_id))?;

        let external_reference = reference::encode(lead_id, now.timestamp_millis());
        let request = ChargeRequest {
            lead_id,
            amount,
            description: self.description.clone(),
            external_reference,
            payer_email: lead.email,
            expires_at: now + self.validity,
        };

        let charge = self.provider.create_charge(&request).await?;

        info!(
            lead_id = %lead_id,
            external_reference = %request.external_reference,
            amount = %amount,
            "Payment session issued"
        );

        Ok(PaymentSession {
            lead_id,
            amount,
            external_reference: request.external_reference,
            pix_code: charge.pix_code,
            qr_code_url: charge.qr_code_url,
            ticket_url: charge.ticket_url,
            provider: self.provider.name(),
            provider_payment_id: charge.provider_payment_id,
            expires_at: request.expires_at,
        })
    }
}

// =============================================================================
// Placeholder provider
// =============================================================================

/// Offline provider producing a well-formed but unpayable PIX code.
///
/// Used when no gateway credentials are configured, so the rest of the flow
/// can be exercised end to end.
#[derive(Debug, Clone)]
pub struct PlaceholderPixProvider {
    merchant_name: String,
    merchant_city: String,
}

impl PlaceholderPixProvider {
    /// Merchant name is cut to 25 bytes and city to 15, as the BR Code allows
    pub fn new(merchant_name: &str, merchant_city: &str) -> Self {
        Self {
            merchant_name: truncate_bytes(merchant_name, 25).to_string(),
            merchant_city: truncate_bytes(merchant_city, 15).to_string(),
        }
    }

    /// Static BR Code payload with a random PIX key
    pub fn pix_code(&self, amount: Amount) -> String {
        let key = uuid::Uuid::new_v4().to_string();
        let account = format!("{}{}", emv_field("00", "br.gov.bcb.pix"), emv_field("01", &key));

        let mut payload = String::new();
        payload.push_str(&emv_field("00", "01"));
        payload.push_str(&emv_field("26", &account));
        payload.push_str(&emv_field("52", "0000"));
        payload.push_str(&emv_field("53", "986"));
        payload.push_str(&emv_field("54", &amount.to_string()));
        payload.push_str(&emv_field("58", "BR"));
        payload.push_str(&emv_field("59", &self.merchant_name));
        payload.push_str(&emv_field("60", &self.merchant_city));
        payload.push_str(&emv_field("62", &emv_field("05", "***")));
        payload.push_str("6304");
        let crc = crc16_ccitt(payload.as_bytes());
        payload.push_str(&format!("{:04X}", crc));
        payload
    }
}

#[async_trait::async_trait]
impl PaymentProvider for PlaceholderPixProvider {
    fn name(&self) -> &'static str {
        "placeholder"
    }

    async fn create_charge(&self, charge: &ChargeRequest) -> Result<ProviderCharge, ProviderError> {
        let pix_code = self.pix_code(charge.amount);
        Ok(ProviderCharge {
            provider_payment_id: None,
            qr_code_url: Some(qr_image_url(&pix_code)),
            pix_code,
            ticket_url: None,
        })
    }
}

/// Longest prefix of at most `max` bytes ending on a char boundary
fn truncate_bytes(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

/// EMV TLV field; the length counts bytes
fn emv_field(id: &str, value: &str) -> String {
    format!("{}{:02}{}", id, value.len(), value)
}

/// CRC-16/CCITT-FALSE, as BR Code requires
fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Hosted QR image for a PIX code
pub(crate) fn qr_image_url(pix_code: &str) -> String {
    let data: String = url::form_urlencoded::byte_serialize(pix_code.as_bytes()).collect();
    format!(
        "https://api.qrserver.com/v1/create-qr-code/?size=300x300&data={}",
        data
    )
}
