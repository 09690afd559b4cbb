//! CORS configuration for the LeadPay HTTP API
//!
//! The capture form and payment page are served from other origins, so the
//! request origin is mirrored back with credentials allowed.
//!
//! # Policy
//!
//! - **Allowed Origins**: the requesting origin, mirrored
//! - **Allowed Methods**: GET, POST, PUT, DELETE, OPTIONS
//! - **Allowed Headers**: Content-Type, Authorization
//! - **Exposed Headers**: Content-Range, X-Content-Range
//! - **Max Age**: 600 seconds for preflight caching

use std::time::Duration;

use http::header::{HeaderName, AUTHORIZATION, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{AllowOrigin, CorsLayer};

/// Request headers accepted from browsers
pub const ALLOWED_HEADERS: [HeaderName; 2] = [CONTENT_TYPE, AUTHORIZATION];

/// Methods accepted from browsers
pub const ALLOWED_METHODS: [Method; 5] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::OPTIONS,
];

/// Preflight cache lifetime
pub const DEFAULT_MAX_AGE_SECS: u64 = 600;

/// Response headers readable by browser scripts
pub fn exposed_headers() -> [HeaderName; 2] {
    [
        HeaderName::from_static("content-range"),
        HeaderName::from_static("x-content-range"),
    ]
}

/// CORS layer applied to every route
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_credentials(true)
        .allow_methods(ALLOWED_METHODS)
        .allow_headers(ALLOWED_HEADERS)
        .expose_headers(exposed_headers())
        .max_age(Duration::from_secs(DEFAULT_MAX_AGE_SECS))
}
