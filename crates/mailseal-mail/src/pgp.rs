// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Public-key scheme adapter.

use mailseal_core::error::{MailsealError, Result};
use mailseal_core::types::Scheme;
use tracing::{debug, instrument};

use crate::backend::KeyEncryptor;

/// Wraps a [`KeyEncryptor`] and enforces the adapter contract: the body
/// comes back as armored ciphertext or the attempt fails.
pub struct PgpAdapter<K> {
    backend: K,
}

impl<K: KeyEncryptor> PgpAdapter<K> {
    pub fn new(backend: K) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &K {
        &self.backend
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    /// Parse stored key material. Unusable material yields `None`.
    pub fn parse_key(&self, material: &str) -> Option<K::Key> {
        self.backend.parse_public_key(material.as_bytes())
    }

    /// Encrypt `body` to `key`.
    ///
    /// An empty result from the backend counts as failure, never as success.
    #[instrument(skip_all, fields(len = body.len()))]
    pub fn encrypt(&self, body: &str, key: &K::Key) -> Result<String> {
        let ciphertext = self.backend.encrypt(body, key).map_err(|e| match e {
            MailsealError::EncryptionFailed { .. } => e,
            other => MailsealError::encryption(Scheme::Pgp, other),
        })?;

        if ciphertext.trim().is_empty() {
            return Err(MailsealError::encryption(
                Scheme::Pgp,
                "backend returned empty ciphertext",
            ));
        }

        debug!(ciphertext_len = ciphertext.len(), "body encrypted");
        Ok(ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(&'static str);

    impl KeyEncryptor for Canned {
        type Key = ();

        fn parse_public_key(&self, bytes: &[u8]) -> Option<()> {
            (!bytes.is_empty()).then_some(())
        }

        fn encrypt(&self, _plaintext: &str, _key: &()) -> Result<String> {
            Ok(self.0.to_owned())
        }
    }

    #[test]
    fn ciphertext_passed_through() {
        let adapter = PgpAdapter::new(Canned("-----BEGIN PGP MESSAGE-----\n..."));
        assert!(adapter.encrypt("hi", &()).unwrap().starts_with("-----BEGIN"));
    }

    #[test]
    fn empty_ciphertext_is_failure() {
        let adapter = PgpAdapter::new(Canned("  \n"));
        let err = adapter.encrypt("hi", &()).unwrap_err();
        assert!(matches!(err, MailsealError::EncryptionFailed { scheme: Scheme::Pgp, .. }));
    }

    #[test]
    fn parse_key_delegates() {
        let adapter = PgpAdapter::new(Canned("x"));
        assert!(adapter.parse_key("material").is_some());
        assert!(adapter.parse_key("").is_none());
    }
}
