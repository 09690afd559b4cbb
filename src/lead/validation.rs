//! Lead capture input validation and sanitisation

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::ledger::NewLead;

/// Raw capture request body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaptureRequest {
    /// Contact name
    #[serde(default)]
    pub name: Option<String>,
    /// Contact email
    #[serde(default)]
    pub email: Option<String>,
    /// Optional WhatsApp number, any formatting
    #[serde(default)]
    pub whatsapp: Option<String>,
}

const NAME_ERROR: &str = "invalid name (2-100 characters, letters and spaces only)";
const EMAIL_ERROR: &str = "invalid email";
const WHATSAPP_ERROR: &str = "invalid WhatsApp number (10 or 11 digits)";

fn compiled(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => unreachable!("static pattern {pattern:?} is valid: {e}"),
    })
}

fn name_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    compiled(&CELL, r"^[a-zA-ZÀ-ÿ\s'-]+$")
}

fn sql_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    compiled(
        &CELL,
        r"(?i)(\b(SELECT|INSERT|UPDATE|DELETE|DROP|CREATE|ALTER|EXEC|UNION|SCRIPT)\b|--|;|/\*|\*/|xp_|sp_)",
    )
}

fn email_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    compiled(
        &CELL,
        r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*\.[A-Za-z]{2,}$",
    )
}

/// 2 to 100 letters, spaces, apostrophes or hyphens, and no SQL keywords
pub fn is_valid_name(name: &str) -> bool {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    (2..=100).contains(&len)
        && name_pattern().is_match(trimmed)
        && !sql_pattern().is_match(trimmed)
}

/// ASCII address with a top-level domain
pub fn is_valid_email(email: &str) -> bool {
    let email = email.trim();
    if email.len() > 254 || !email_pattern().is_match(email) {
        return false;
    }
    let Some((local, _)) = email.rsplit_once('@') else {
        return false;
    };
    local.len() <= 64 && !local.starts_with('.') && !local.ends_with('.') && !local.contains("..")
}

/// Digits only
pub fn sanitize_phone(phone: &str) -> String {
    phone.chars().filter(char::is_ascii_digit).collect()
}

/// Brazilian number: 10 or 11 digits, not all the same digit
pub fn is_valid_whatsapp(phone: &str) -> bool {
    let digits = sanitize_phone(phone);
    if !(10..=11).contains(&digits.len()) {
        return false;
    }
    let first = digits.as_bytes()[0];
    !digits.bytes().all(|b| b == first)
}

/// Trimmed and HTML-escaped
pub fn sanitize_string(input: &str) -> String {
    htmlescape::encode_minimal(input.trim())
}

/// Trimmed and lowercased
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate a capture request, returning every failure at once.
pub fn validate_capture(request: &CaptureRequest) -> Result<NewLead, Vec<String>> {
    let mut errors = Vec::new();

    let name = request.name.as_deref().unwrap_or_default();
    if !is_valid_name(name) {
        errors.push(NAME_ERROR.to_string());
    }

    let email = request.email.as_deref().unwrap_or_default();
    if !is_valid_email(email) {
        errors.push(EMAIL_ERROR.to_string());
    }

    let whatsapp = request
        .whatsapp
        .as_deref()
        .map(str::trim)
        .filter(|w| !w.is_empty());
    if let Some(w) = whatsapp {
        if !is_valid_whatsapp(w) {
            errors.push(WHATSAPP_ERROR.to_string());
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(NewLead {
        name: sanitize_string(name),
        email: normalize_email(email),
        whatsapp: whatsapp.map(sanitize_phone),
    })
}
