// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Recipient credential lookup.
//
// Schema:
//   recipient_credentials(
//     address        TEXT PRIMARY KEY,   -- lowercased email address
//     public_key     TEXT,
//     certificate    TEXT,
//     method         TEXT NOT NULL,      -- "pgp" | "smime"
//     redact_subject INTEGER NOT NULL,
//     receive_signed INTEGER NOT NULL,
//     roles          TEXT NOT NULL,      -- JSON array of role names
//     updated_at     TEXT NOT NULL       -- RFC 3339
//   )

use std::collections::HashMap;
use std::path::Path;

use chrono::Utc;
use mailseal_core::MailConfig;
use mailseal_core::error::{MailsealError, Result};
use mailseal_core::types::{Credential, RecipientCredential, Scheme};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::backend::KeyEncryptor;
use crate::certificate::{Certificate, parse_certificate};
use crate::pgp::PgpAdapter;

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS recipient_credentials (
    address        TEXT PRIMARY KEY,
    public_key     TEXT,
    certificate    TEXT,
    method         TEXT    NOT NULL,
    redact_subject INTEGER NOT NULL,
    receive_signed INTEGER NOT NULL,
    roles          TEXT    NOT NULL,
    updated_at     TEXT    NOT NULL
);";

fn db_err(e: rusqlite::Error) -> MailsealError {
    MailsealError::Database(e.to_string())
}

/// Raw credential record for one address, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoredCredential {
    pub public_key: Option<String>,
    pub certificate: Option<String>,
    pub method: Scheme,
    pub redact_subject: bool,
    pub receive_signed: bool,
    pub roles: Vec<String>,
}

impl Default for StoredCredential {
    fn default() -> Self {
        Self {
            public_key: None,
            certificate: None,
            method: Scheme::Pgp,
            redact_subject: false,
            receive_signed: true,
            roles: Vec::new(),
        }
    }
}

impl StoredCredential {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }
}

/// Source of per-recipient credential records.
pub trait CredentialStore {
    /// `Ok(None)` means the address is not registered.
    fn lookup(&self, recipient: &str) -> Result<Option<StoredCredential>>;
}

fn normalize(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// Fixed in-memory store, for tests and one-shot CLI use.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentialStore {
    entries: HashMap<String, StoredCredential>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: &str, credential: StoredCredential) {
        self.entries.insert(normalize(address), credential);
    }

    pub fn with(mut self, address: &str, credential: StoredCredential) -> Self {
        self.insert(address, credential);
        self
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn lookup(&self, recipient: &str) -> Result<Option<StoredCredential>> {
        Ok(self.entries.get(&normalize(recipient)).cloned())
    }
}

/// SQLite-backed credential store.
pub struct SqliteCredentialStore {
    conn: Connection,
}

impl SqliteCredentialStore {
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;
        debug!("credential store opened");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(db_err)?;
        Ok(Self { conn })
    }

    /// Insert or replace the record for `address`.
    #[instrument(skip(self, credential))]
    pub fn upsert(&self, address: &str, credential: &StoredCredential) -> Result<()> {
        let roles = serde_json::to_string(&credential.roles)?;
        self.conn
            .execute(
                "INSERT INTO recipient_credentials
                    (address, public_key, certificate, method, redact_subject, receive_signed, roles, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(address) DO UPDATE SET
                    public_key = excluded.public_key,
                    certificate = excluded.certificate,
                    method = excluded.method,
                    redact_subject = excluded.redact_subject,
                    receive_signed = excluded.receive_signed,
                    roles = excluded.roles,
                    updated_at = excluded.updated_at",
                params![
                    normalize(address),
                    credential.public_key,
                    credential.certificate,
                    credential.method.as_str(),
                    credential.redact_subject,
                    credential.receive_signed,
                    roles,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(db_err)?;
        debug!("credential stored");
        Ok(())
    }

    /// Remove the record for `address`. Returns whether one existed.
    pub fn remove(&self, address: &str) -> Result<bool> {
        let n = self
            .conn
            .execute(
                "DELETE FROM recipient_credentials WHERE address = ?1",
                params![normalize(address)],
            )
            .map_err(db_err)?;
        Ok(n > 0)
    }

    /// Delete every stored key and certificate. Returns the number of rows removed.
    #[instrument(skip(self))]
    pub fn purge_all(&self) -> Result<usize> {
        let n = self
            .conn
            .execute("DELETE FROM recipient_credentials", [])
            .map_err(db_err)?;
        warn!(removed = n, "all recipient credentials purged");
        Ok(n)
    }

    pub fn count(&self) -> Result<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM recipient_credentials", [], |row| row.get(0))
            .map_err(db_err)
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn lookup(&self, recipient: &str) -> Result<Option<StoredCredential>> {
        let row = self
            .conn
            .query_row(
                "SELECT public_key, certificate, method, redact_subject, receive_signed, roles
                 FROM recipient_credentials WHERE address = ?1",
                params![normalize(recipient)],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, bool>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err)?;

        let Some((public_key, certificate, method, redact_subject, receive_signed, roles)) = row
        else {
            return Ok(None);
        };

        Ok(Some(StoredCredential {
            public_key,
            certificate,
            method: method.parse()?,
            redact_subject,
            receive_signed,
            roles: serde_json::from_str(&roles)?,
        }))
    }
}

/// Looks up and parses one recipient's credentials, fresh on every call.
pub struct CredentialResolver<'a> {
    config: &'a MailConfig,
    store: &'a dyn CredentialStore,
}

impl<'a> CredentialResolver<'a> {
    pub fn new(config: &'a MailConfig, store: &'a dyn CredentialStore) -> Self {
        Self { config, store }
    }

    /// The stored record for `recipient`, or `None` for an unknown address.
    ///
    /// The site administrator's record comes from configuration. Store
    /// failures are logged and treated as "no record".
    pub fn lookup(&self, recipient: &str) -> Option<StoredCredential> {
        if self.config.is_site_admin(recipient) {
            let site = &self.config.site;
            return Some(StoredCredential {
                public_key: site.public_key.clone(),
                certificate: site.certificate.clone(),
                method: site.method,
                redact_subject: site.redact_subject,
                ..StoredCredential::default()
            });
        }

        match self.store.lookup(recipient) {
            Ok(found) => found,
            Err(e) => {
                warn!(recipient, error = %e, "credential lookup failed");
                None
            }
        }
    }

    /// Parse a stored record into usable handles.
    ///
    /// Material that does not parse is dropped with a warning, so the
    /// recipient falls back to whatever remains. With nothing left the
    /// recipient has no usable credential.
    pub fn resolve<K: KeyEncryptor>(
        &self,
        recipient: &str,
        stored: &StoredCredential,
        keys: &PgpAdapter<K>,
    ) -> Result<RecipientCredential<K::Key, Certificate>> {
        let key = stored.public_key.as_deref().and_then(|material| {
            let parsed = keys.parse_key(material);
            if parsed.is_none() {
                let e = MailsealError::InvalidKey(format!("stored key for {recipient}"));
                warn!(recipient, error = %e, "dropping public key");
            }
            parsed
        });
        let cert = stored.certificate.as_deref().and_then(|material| {
            let parsed = parse_certificate(material.as_bytes());
            if parsed.is_none() {
                let e =
                    MailsealError::InvalidCertificate(format!("stored certificate for {recipient}"));
                warn!(recipient, error = %e, "dropping certificate");
            }
            parsed
        });

        let credential = Credential::from_parts(key, cert);
        if matches!(credential, Credential::None) {
            return Err(MailsealError::CredentialUnavailable(recipient.to_owned()));
        }
        Ok(RecipientCredential {
            credential,
            preference: stored.method,
            redact_subject: stored.redact_subject,
            receive_signed: stored.receive_signed,
        })
    }
}
