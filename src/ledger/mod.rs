//! Lead Ledger
//!
//! Owns lead records and the single status transition the payment pipeline
//! depends on. A lead starts `PENDING`; [`LeadLedger::mark_paid`] moves it to
//! `PAID` exactly once and records the provider payment id. Every later call
//! for the same lead is a no-op reporting `applied = false`; the first payment
//! id recorded is never overwritten.
//!
//! The transition must be atomic at the storage layer. Callers never read the
//! status and then write it themselves.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryLeadLedger;
pub use sqlite::SqliteLeadLedger;

/// Lead identifier assigned by the ledger at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(pub u64);

impl fmt::Display for LeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for LeadId {
    fn from(id: u64) -> Self {
        LeadId(id)
    }
}

/// Payment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LeadStatus {
    /// Captured, not yet paid
    Pending,
    /// Approved payment reconciled (terminal)
    Paid,
}

impl LeadStatus {
    /// Storage / wire representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
        }
    }

    /// Parse the storage representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "PAID" => Some(Self::Paid),
            _ => None,
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A captured prospect tracked through the payment lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    /// Immutable identifier
    pub id: LeadId,
    /// Display name (already sanitised)
    pub name: String,
    /// Contact email
    pub email: String,
    /// Optional WhatsApp number, digits only
    pub whatsapp: Option<String>,
    /// Current status
    pub status: LeadStatus,
    /// Provider payment id, set by the PAID transition
    pub payment_id: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last status mutation
    pub updated_at: DateTime<Utc>,
}

/// Input for [`LeadLedger::create`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLead {
    /// Display name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Optional WhatsApp number
    pub whatsapp: Option<String>,
}

/// Result of [`LeadLedger::mark_paid`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkPaid {
    /// True only for the call that performed the PENDING -> PAID transition
    pub applied: bool,
    /// Lead state after the call
    pub lead: Lead,
}

/// Listing filter for [`LeadLedger::list`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeadFilter {
    /// Restrict to one status
    pub status: Option<LeadStatus>,
    /// Page size
    pub limit: usize,
    /// Page offset
    pub offset: usize,
}

impl Default for LeadFilter {
    fn default() -> Self {
        Self {
            status: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// Lead counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadStats {
    /// Leads awaiting payment
    #[serde(rename = "PENDING")]
    pub pending: u64,
    /// Paid leads
    #[serde(rename = "PAID")]
    pub paid: u64,
    /// All leads
    pub total: u64,
}

impl LeadStats {
    pub(crate) fn from_counts(counts: &HashMap<LeadStatus, u64>) -> Self {
        let pending = counts.get(&LeadStatus::Pending).copied().unwrap_or(0);
        let paid = counts.get(&LeadStatus::Paid).copied().unwrap_or(0);
        Self {
            pending,
            paid,
            total: pending + paid,
        }
    }
}

/// Storage seam for leads.
///
/// Implementations must make [`mark_paid`](LeadLedger::mark_paid) a single
/// conditional update so that concurrent callers observe exactly one
/// `applied = true`.
#[async_trait::async_trait]
pub trait LeadLedger: Send + Sync + 'static {
    /// Insert a new PENDING lead
    async fn create(&self, lead: NewLead) -> Result<Lead, LedgerError>;

    /// Look a lead up; unknown ids yield `None`
    async fn find_by_id(&self, id: LeadId) -> Result<Option<Lead>, LedgerError>;

    /// PENDING -> PAID, first writer wins.
    ///
    /// `payment_id` is `None` when the provider omitted it; the lead is still
    /// paid. Returns `LedgerError::NotFound` for unknown ids.
    async fn mark_paid(
        &self,
        id: LeadId,
        payment_id: Option<&str>,
    ) -> Result<MarkPaid, LedgerError>;

    /// Newest first
    async fn list(&self, filter: LeadFilter) -> Result<Vec<Lead>, LedgerError>;

    /// Counts per status
    async fn count_by_status(&self) -> Result<LeadStats, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        assert_eq!(LeadStatus::parse("PENDING"), Some(LeadStatus::Pending));
        assert_eq!(LeadStatus::parse("PAID"), Some(LeadStatus::Paid));
        assert_eq!(LeadStatus::parse("paid"), None);
        assert_eq!(
            serde_json::to_string(&LeadStatus::Paid).unwrap(),
            "\"PAID\""
        );
    }

    #[test]
    fn test_stats_serialization() {
        let mut counts = HashMap::new();
        counts.insert(LeadStatus::Pending, 3);
        counts.insert(LeadStatus::Paid, 2);
        let stats = LeadStats::from_counts(&counts);
        assert_eq!(stats.total, 5);

        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["PENDING"], 3);
        assert_eq!(json["PAID"], 2);
        assert_eq!(json["total"], 5);
    }

    #[test]
    fn test_lead_id_is_transparent() {
        assert_eq!(serde_json::to_string(&LeadId(42)).unwrap(), "42");
        assert_eq!(LeadId(42).to_string(), "42");
    }
}
