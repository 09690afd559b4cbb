//! SQLite lead ledger
//!
//! Persists leads in a single `leads` table. The PAID transition is one
//! conditional statement:
//!
//! ```sql
//! UPDATE leads SET status = 'PAID', payment_id = ?2, updated_at = ?3
//!  WHERE id = ?1 AND status = 'PENDING'
//! ```
//!
//! so the "first writer wins" guarantee holds even when several processes
//! share the database file. Blocking rusqlite calls run on the blocking pool.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::{Lead, LeadFilter, LeadId, LeadLedger, LeadStats, LeadStatus, MarkPaid, NewLead};
use crate::error::LedgerError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS leads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    whatsapp TEXT,
    email TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'PENDING',
    payment_id TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_leads_status ON leads(status);
";

const SELECT_COLUMNS: &str =
    "SELECT id, name, email, whatsapp, status, payment_id, created_at, updated_at FROM leads";

/// Lead ledger stored in SQLite
#[derive(Clone)]
pub struct SqliteLeadLedger {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteLeadLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteLeadLedger").finish_non_exhaustive()
    }
}

impl SqliteLeadLedger {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| LedgerError::Storage(e.to_string()))?;
            }
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Connected to SQLite lead ledger");
        Self::with_connection(conn)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, LedgerError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            op(&conn)
        })
        .await?
    }
}

fn sql_id(id: LeadId) -> Option<i64> {
    i64::try_from(id.0).ok()
}

fn row_to_lead(row: &Row<'_>) -> rusqlite::Result<Lead> {
    let id: i64 = row.get(0)?;
    let status: String = row.get(4)?;
    let status = LeadStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown lead status '{}'", status).into(),
        )
    })?;
    Ok(Lead {
        id: LeadId(id as u64),
        name: row.get(1)?,
        email: row.get(2)?,
        whatsapp: row.get(3)?,
        status,
        payment_id: row.get(5)?,
        created_at: row.get::<_, DateTime<Utc>>(6)?,
        updated_at: row.get::<_, DateTime<Utc>>(7)?,
    })
}

fn select_by_id(conn: &Connection, id: i64) -> Result<Option<Lead>, LedgerError> {
    let lead = conn
        .query_row(
            &format!("{} WHERE id = ?1", SELECT_COLUMNS),
            params![id],
            row_to_lead,
        )
        .optional()?;
    Ok(lead)
}

#[async_trait::async_trait]
impl LeadLedger for SqliteLeadLedger {
    async fn create(&self, lead: NewLead) -> Result<Lead, LedgerError> {
        self.blocking(move |conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO leads (name, whatsapp, email, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'PENDING', ?4, ?4)",
                params![lead.name, lead.whatsapp, lead.email, now],
            )?;
            let id = conn.last_insert_rowid();
            debug!(lead_id = id, "Lead inserted");
            select_by_id(conn, id)?
                .ok_or_else(|| LedgerError::Storage(format!("inserted lead {} vanished", id)))
        })
        .await
    }

    async fn find_by_id(&self, id: LeadId) -> Result<Option<Lead>, LedgerError> {
        let Some(sql_id) = sql_id(id) else {
            return Ok(None);
        };
        self.blocking(move |conn| select_by_id(conn, sql_id)).await
    }

    async fn mark_paid(
        &self,
        id: LeadId,
        payment_id: Option<&str>,
    ) -> Result<MarkPaid, LedgerError> {
        let sql_id = sql_id(id).ok_or(LedgerError::NotFound(id))?;
        let payment_id = payment_id.map(str::to_string);
        self.blocking(move |conn| {
            let changed = conn.execute(
                "UPDATE leads SET status = 'PAID', payment_id = ?2, updated_at = ?3
                 WHERE id = ?1 AND status = 'PENDING'",
                params![sql_id, payment_id, Utc::now()],
            )?;
            let lead = select_by_id(conn, sql_id)?.ok_or(LedgerError::NotFound(id))?;
            Ok(MarkPaid {
                applied: changed == 1,
                lead,
            })
        })
        .await
    }

    async fn list(&self, filter: LeadFilter) -> Result<Vec<Lead>, LedgerError> {
        self.blocking(move |conn| {
            let limit = i64::try_from(filter.limit).unwrap_or(i64::MAX);
            let offset = i64::try_from(filter.offset).unwrap_or(i64::MAX);
            let leads = match filter.status {
                Some(status) => {
                    let mut stmt = conn.prepare(&format!(
                        "{} WHERE status = ?1 ORDER BY id DESC LIMIT ?2 OFFSET ?3",
                        SELECT_COLUMNS
                    ))?;
                    let rows = stmt.query_map(params![status.as_str(), limit, offset], row_to_lead)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                }
                None => {
                    let mut stmt = conn.prepare(&format!(
                        "{} ORDER BY id DESC LIMIT ?1 OFFSET ?2",
                        SELECT_COLUMNS
                    ))?;
                    let rows = stmt.query_map(params![limit, offset], row_to_lead)?;
                    rows.collect::<rusqlite::Result<Vec<_>>>()?
                }
            };
            Ok(leads)
        })
        .await
    }

    async fn count_by_status(&self) -> Result<LeadStats, LedgerError> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM leads GROUP BY status")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            let mut counts = HashMap::new();
            for row in rows {
                let (status, count) = row?;
                if let Some(status) = LeadStatus::parse(&status) {
                    counts.insert(status, count.max(0) as u64);
                }
            }
            Ok(LeadStats::from_counts(&counts))
        })
        .await
    }
}
