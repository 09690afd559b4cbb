//! In-memory lead ledger
//!
//! The default backend when no database path is configured. The PAID
//! transition is a check-and-set performed under one write guard, which is
//! the in-memory equivalent of a conditional `UPDATE`.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;

use super::{Lead, LeadFilter, LeadId, LeadLedger, LeadStats, LeadStatus, MarkPaid, NewLead};
use crate::error::LedgerError;

/// Lead ledger backed by a `BTreeMap` behind a `parking_lot` lock
#[derive(Debug)]
pub struct InMemoryLeadLedger {
    leads: RwLock<BTreeMap<LeadId, Lead>>,
    next_id: AtomicU64,
}

impl Default for InMemoryLeadLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLeadLedger {
    /// Empty ledger; ids start at 1
    pub fn new() -> Self {
        Self::starting_at(LeadId(1))
    }

    /// Empty ledger whose first created lead gets `first`
    pub fn starting_at(first: LeadId) -> Self {
        Self {
            leads: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(first.0),
        }
    }

    /// Number of stored leads
    pub fn len(&self) -> usize {
        self.leads.read().len()
    }

    /// True when no lead is stored
    pub fn is_empty(&self) -> bool {
        self.leads.read().is_empty()
    }
}

#[async_trait::async_trait]
impl LeadLedger for InMemoryLeadLedger {
    async fn create(&self, lead: NewLead) -> Result<Lead, LedgerError> {
        let id = LeadId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let now = Utc::now();
        let lead = Lead {
            id,
            name: lead.name,
            email: lead.email,
            whatsapp: lead.whatsapp,
            status: LeadStatus::Pending,
            payment_id: None,
            created_at: now,
            updated_at: now,
        };
        self.leads.write().insert(id, lead.clone());
        debug!(lead_id = %id, "Lead stored in memory");
        Ok(lead)
    }

    async fn find_by_id(&self, id: LeadId) -> Result<Option<Lead>, LedgerError> {
        Ok(self.leads.read().get(&id).cloned())
    }

    async fn mark_paid(
        &self,
        id: LeadId,
        payment_id: Option<&str>,
    ) -> Result<MarkPaid, LedgerError> {
        let mut leads = self.leads.write();
        let lead = leads.get_mut(&id).ok_or(LedgerError::NotFound(id))?;

        if lead.status == LeadStatus::Paid {
            return Ok(MarkPaid {
                applied: false,
                lead: lead.clone(),
            });
        }

        lead.status = LeadStatus::Paid;
        lead.payment_id = payment_id.map(str::to_string);
        lead.updated_at = Utc::now();

        Ok(MarkPaid {
            applied: true,
            lead: lead.clone(),
        })
    }

    async fn list(&self, filter: LeadFilter) -> Result<Vec<Lead>, LedgerError> {
        let leads = self.leads.read();
        Ok(leads
            .values()
            .rev()
            .filter(|lead| filter.status.map_or(true, |s| lead.status == s))
            .skip(filter.offset)
            .take(filter.limit)
            .cloned()
            .collect())
    }

    async fn count_by_status(&self) -> Result<LeadStats, LedgerError> {
        let leads = self.leads.read();
        let mut counts = HashMap::new();
        for lead in leads.values() {
            *counts.entry(lead.status).or_insert(0u64) += 1;
        }
        Ok(LeadStats::from_counts(&counts))
    }
}
