// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Audit trail: append-only SQLite log of per-recipient delivery decisions.
//
// Schema:
//   mail_audit(
//     id          INTEGER PRIMARY KEY AUTOINCREMENT,
//     timestamp   TEXT    NOT NULL,   -- RFC 3339
//     recipient   TEXT    NOT NULL,
//     scheme      TEXT,               -- "pgp", "smime", or NULL when sent in clear
//     signed      INTEGER NOT NULL,
//     encrypted   INTEGER NOT NULL,
//     body_hash   TEXT    NOT NULL,   -- SHA-256 hex of the outgoing body
//     details     TEXT
//   )
//
// Only digests are stored. Message bodies and subjects never reach the log.

use std::path::Path;

use chrono::Utc;
use mailseal_core::error::MailsealError;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS mail_audit (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp   TEXT    NOT NULL,
    recipient   TEXT    NOT NULL,
    scheme      TEXT,
    signed      INTEGER NOT NULL,
    encrypted   INTEGER NOT NULL,
    body_hash   TEXT    NOT NULL,
    details     TEXT
);";

/// Convert a `rusqlite::Error` into a `MailsealError::Database`.
fn db_err(e: rusqlite::Error) -> MailsealError {
    MailsealError::Database(e.to_string())
}

/// What is recorded for one recipient of one send.
#[derive(Debug, Clone)]
pub struct DeliveryRecord<'a> {
    pub recipient: &'a str,
    pub scheme: Option<&'a str>,
    pub signed: bool,
    pub encrypted: bool,
    pub body_hash: &'a str,
    pub details: Option<&'a str>,
}

/// A stored audit row, used for queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub recipient: String,
    pub scheme: Option<String>,
    pub signed: bool,
    pub encrypted: bool,
    pub body_hash: String,
    pub details: Option<String>,
}

/// Append-only audit log backed by a SQLite database.
pub struct AuditLog {
    conn: Connection,
}

impl AuditLog {
    /// Open (or create) the audit database at `path` with WAL enabled.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, MailsealError> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;

        debug!("audit log opened");
        Ok(Self { conn })
    }

    /// Open an in-memory audit database (useful for tests).
    pub fn open_in_memory() -> Result<Self, MailsealError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;
        Ok(Self { conn })
    }

    #[instrument(skip(self, record), fields(recipient = %record.recipient, encrypted = record.encrypted))]
    pub fn record(&self, record: &DeliveryRecord<'_>) -> Result<(), MailsealError> {
        self.conn
            .execute(
                "INSERT INTO mail_audit
                    (timestamp, recipient, scheme, signed, encrypted, body_hash, details)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    Utc::now().to_rfc3339(),
                    record.recipient,
                    record.scheme,
                    record.signed,
                    record.encrypted,
                    record.body_hash,
                    record.details,
                ],
            )
            .map_err(db_err)?;

        debug!("audit entry recorded");
        Ok(())
    }

    /// All entries for `recipient`, oldest first.
    pub fn entries_for_recipient(&self, recipient: &str) -> Result<Vec<AuditEntry>, MailsealError> {
        self.query(
            "SELECT id, timestamp, recipient, scheme, signed, encrypted, body_hash, details
             FROM mail_audit WHERE recipient = ?1 ORDER BY id ASC",
            params![recipient],
        )
    }

    /// The most recent `limit` entries, newest first.
    pub fn recent_entries(&self, limit: u32) -> Result<Vec<AuditEntry>, MailsealError> {
        self.query(
            "SELECT id, timestamp, recipient, scheme, signed, encrypted, body_hash, details
             FROM mail_audit ORDER BY id DESC LIMIT ?1",
            params![limit],
        )
    }

    pub fn count(&self) -> Result<u64, MailsealError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM mail_audit", [], |row| row.get(0))
            .map_err(db_err)
    }

    fn query(
        &self,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<AuditEntry>, MailsealError> {
        let mut stmt = self.conn.prepare(sql).map_err(db_err)?;
        let rows = stmt
            .query_map(args, |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    recipient: row.get(2)?,
                    scheme: row.get(3)?,
                    signed: row.get(4)?,
                    encrypted: row.get(5)?,
                    body_hash: row.get(6)?,
                    details: row.get(7)?,
                })
            })
            .map_err(db_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }
}
