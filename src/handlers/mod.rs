//! HTTP handlers shared across the API surface

pub mod status;

pub use status::{health_handler, status_handler, status_router, ServerStats, WebhookCounters};
