//! Runtime configuration
//!
//! Everything is read once at startup and shared immutably afterwards.
//! Secrets only come from the environment, never from CLI flags.
//!
//! # Environment Variables
//!
//! - `LEADPAY_MODE`: `hardened` (default) or `relaxed`
//! - `LEADPAY_WEBHOOK_SECRET`: shared HMAC key for payment callbacks
//! - `LEADPAY_PAYMENT_AMOUNT_CENTS`: fixed session amount (default: 4700)
//! - `LEADPAY_PAYMENT_DESCRIPTION`: description sent to the provider
//! - `LEADPAY_MERCHANT_NAME` / `LEADPAY_MERCHANT_CITY`: PIX merchant fields
//! - `LEADPAY_MP_ACCESS_TOKEN`: Mercado Pago token; absent means placeholder PIX
//! - `LEADPAY_MP_BASE_URL`: Mercado Pago API base (default: `https://api.mercadopago.com`)
//! - `LEADPAY_MP_NOTIFICATION_URL`: callback URL registered with each payment
//! - `LEADPAY_BREVO_API_KEY`: Brevo key; absent disables CRM sync
//! - `LEADPAY_BREVO_LIST_ID`: Brevo contact list (default: 2)
//! - `LEADPAY_BREVO_BASE_URL`: Brevo API base (default: `https://api.brevo.com`)

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::ConfigError;

/// Secrets shipped in sample env files. Treated as "not configured".
pub const PLACEHOLDER_SECRETS: &[&str] = &[
    "changeme",
    "your-webhook-secret",
    "seu_secret_aleatorio_aqui_12345",
    "lindai_webhook_secret_2025_xyz789",
];

/// How strictly the server treats missing security configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum RuntimeMode {
    /// Production: an unset webhook secret rejects every callback
    #[default]
    #[value(alias = "production")]
    Hardened,
    /// Local development: an unset webhook secret is warned about and allowed
    #[value(alias = "development")]
    Relaxed,
}

impl RuntimeMode {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hardened => "hardened",
            Self::Relaxed => "relaxed",
        }
    }
}

impl fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuntimeMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hardened" | "production" => Ok(Self::Hardened),
            "relaxed" | "development" => Ok(Self::Relaxed),
            other => Err(ConfigError::InvalidValue {
                name: "mode",
                message: format!("unknown runtime mode '{}'", other),
            }),
        }
    }
}

/// Mercado Pago API credentials
#[derive(Clone)]
pub struct MercadoPagoConfig {
    /// Bearer access token
    pub access_token: String,
    /// API base URL
    pub base_url: String,
    /// Optional webhook URL sent with each payment
    pub notification_url: Option<String>,
}

impl fmt::Debug for MercadoPagoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MercadoPagoConfig")
            .field("access_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("notification_url", &self.notification_url)
            .finish()
    }
}

/// Payment session settings
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Fixed amount per session, in cents
    pub amount_cents: u64,
    /// Description shown to the payer
    pub description: String,
    /// PIX merchant name
    pub merchant_name: String,
    /// PIX merchant city
    pub merchant_city: String,
    /// Advisory validity window of a session
    pub validity: Duration,
    /// Real provider credentials; `None` selects the placeholder provider
    pub mercadopago: Option<MercadoPagoConfig>,
}

/// Brevo CRM credentials
#[derive(Clone)]
pub struct BrevoConfig {
    /// API key
    pub api_key: String,
    /// Contact list to add captured leads to
    pub list_id: u64,
    /// API base URL
    pub base_url: String,
}

impl fmt::Debug for BrevoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrevoConfig")
            .field("api_key", &"<redacted>")
            .field("list_id", &self.list_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Top-level application configuration
#[derive(Clone)]
pub struct AppConfig {
    /// Host to bind
    pub host: String,
    /// Port to bind
    pub port: u16,
    /// Runtime hardening level
    pub mode: RuntimeMode,
    /// Shared webhook HMAC secret
    pub webhook_secret: Option<String>,
    /// SQLite path; `None` keeps leads in memory
    pub database: Option<PathBuf>,
    /// Payment session settings
    pub payment: PaymentConfig,
    /// CRM settings; `None` disables sync
    pub crm: Option<BrevoConfig>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("mode", &self.mode)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("payment", &self.payment)
            .field("crm", &self.crm)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Listener settings default to `127.0.0.1:3003` and are normally
    /// overridden from the CLI.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when a numeric variable or the mode
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mode = parse_var("LEADPAY_MODE", RuntimeMode::default())?;
        let webhook_secret = non_empty_var("LEADPAY_WEBHOOK_SECRET");

        let amount_cents = parse_var("LEADPAY_PAYMENT_AMOUNT_CENTS", 4700u64)?;
        if amount_cents == 0 {
            return Err(ConfigError::InvalidValue {
                name: "LEADPAY_PAYMENT_AMOUNT_CENTS",
                message: "amount cannot be 0".to_string(),
            });
        }

        let mercadopago = non_empty_var("LEADPAY_MP_ACCESS_TOKEN").map(|access_token| {
            MercadoPagoConfig {
                access_token,
                base_url: non_empty_var("LEADPAY_MP_BASE_URL")
                    .unwrap_or_else(|| "https://api.mercadopago.com".to_string()),
                notification_url: non_empty_var("LEADPAY_MP_NOTIFICATION_URL"),
            }
        });
        if mercadopago.is_none() {
            warn!("LEADPAY_MP_ACCESS_TOKEN not set, payment sessions use placeholder PIX codes");
        }

        let crm = match non_empty_var("LEADPAY_BREVO_API_KEY") {
            Some(api_key) => Some(BrevoConfig {
                api_key,
                list_id: parse_var("LEADPAY_BREVO_LIST_ID", 2u64)?,
                base_url: non_empty_var("LEADPAY_BREVO_BASE_URL")
                    .unwrap_or_else(|| "https://api.brevo.com".to_string()),
            }),
            None => {
                info!("LEADPAY_BREVO_API_KEY not set, CRM sync disabled");
                None
            }
        };

        Ok(Self {
            host: "127.0.0.1".to_string(),
            port: 3003,
            mode,
            webhook_secret,
            database: None,
            payment: PaymentConfig {
                amount_cents,
                description: non_empty_var("LEADPAY_PAYMENT_DESCRIPTION")
                    .unwrap_or_else(|| "Diagnostic report + bonus".to_string()),
                merchant_name: non_empty_var("LEADPAY_MERCHANT_NAME")
                    .unwrap_or_else(|| "LEADPAY".to_string()),
                merchant_city: non_empty_var("LEADPAY_MERCHANT_CITY")
                    .unwrap_or_else(|| "SAO PAULO".to_string()),
                validity: Duration::from_secs(30 * 60),
                mercadopago,
            },
            crm,
        })
    }

    /// Configuration for tests: fixed secret, hardened mode, no upstreams.
    pub fn test_config() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            mode: RuntimeMode::Hardened,
            webhook_secret: Some("test-webhook-secret-for-unit-tests".to_string()),
            database: None,
            payment: PaymentConfig {
                amount_cents: 4700,
                description: "Diagnostic report + bonus".to_string(),
                merchant_name: "LEADPAY".to_string(),
                merchant_city: "SAO PAULO".to_string(),
                validity: Duration::from_secs(30 * 60),
                mercadopago: None,
            },
            crm: None,
        }
    }

    /// True when a real, non-placeholder webhook secret is configured.
    pub fn has_usable_secret(&self) -> bool {
        usable_secret(self.webhook_secret.as_deref()).is_some()
    }
}

/// Returns the secret unless it is missing, blank or a known placeholder.
pub fn usable_secret(secret: Option<&str>) -> Option<&str> {
    let secret = secret?.trim();
    if secret.is_empty() || PLACEHOLDER_SECRETS.contains(&secret) {
        None
    } else {
        Some(secret)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T>(name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match non_empty_var(name) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
            name,
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_mode_parsing() {
        assert_eq!("hardened".parse::<RuntimeMode>().unwrap(), RuntimeMode::Hardened);
        assert_eq!("Production".parse::<RuntimeMode>().unwrap(), RuntimeMode::Hardened);
        assert_eq!("relaxed".parse::<RuntimeMode>().unwrap(), RuntimeMode::Relaxed);
        assert!("staging".parse::<RuntimeMode>().is_err());
        assert_eq!(RuntimeMode::default(), RuntimeMode::Hardened);
    }

    #[test]
    fn test_mode_variable_goes_through_from_str() {
        assert_eq!(
            parse_var::<RuntimeMode>("LEADPAY_TEST_MODE_UNSET", RuntimeMode::default()).unwrap(),
            RuntimeMode::Hardened
        );
        let err = "staging".parse::<RuntimeMode>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid value for mode: unknown runtime mode 'staging'"
        );
        assert_eq!(" Development ".parse::<RuntimeMode>().unwrap(), RuntimeMode::Relaxed);
    }

    #[test]
    fn test_usable_secret() {
        assert_eq!(usable_secret(None), None);
        assert_eq!(usable_secret(Some("")), None);
        assert_eq!(usable_secret(Some("   ")), None);
        assert_eq!(usable_secret(Some("changeme")), None);
        assert_eq!(usable_secret(Some("real-secret")), Some("real-secret"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = AppConfig::test_config();
        config.crm = Some(BrevoConfig {
            api_key: "xkeysib-very-secret".to_string(),
            list_id: 2,
            base_url: "https://api.brevo.com".to_string(),
        });
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("test-webhook-secret"));
        assert!(!rendered.contains("xkeysib"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_config_defaults() {
        let config = AppConfig::test_config();
        assert!(config.has_usable_secret());
        assert_eq!(config.payment.amount_cents, 4700);
        assert_eq!(config.payment.validity, Duration::from_secs(1800));
    }
}
