// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Site signing keypair: ECDSA P-256 / SHA-256 via `ring`.
//
// The keypair is persisted as an armored PKCS#8 v1 document with the key's
// identity (`Site <mail@example.org>`) as an armor header. It is read-only to
// the mail pipeline and loaded fresh for every send operation.

use std::path::Path;

use mailseal_core::error::{MailsealError, Result};
use ring::rand::SystemRandom;
use ring::signature::{
    ECDSA_P256_SHA256_ASN1, ECDSA_P256_SHA256_ASN1_SIGNING, EcdsaKeyPair, KeyPair,
    UnparsedPublicKey,
};
use tracing::{debug, instrument};

use crate::armor::{dearmor, enarmor};
use crate::integrity::hash_bytes;

pub const PRIVATE_KEY_LABEL: &str = "MAILSEAL SIGNING PRIVATE KEY";
pub const PUBLIC_KEY_LABEL: &str = "MAILSEAL SIGNING PUBLIC KEY";
const IDENTITY_HEADER: &str = "Identity";

/// The site's own signing credential.
pub struct SigningKeypair {
    identity: String,
    /// PKCS#8 v1 DER-encoded private key (includes the public key).
    pkcs8_der: Vec<u8>,
    /// Uncompressed SEC1 public key bytes.
    public_key: Vec<u8>,
}

impl SigningKeypair {
    /// Generate a fresh keypair using the OS CSPRNG.
    ///
    /// Blocking; there is no timeout.
    #[instrument]
    pub fn generate(identity: &str) -> Result<Self> {
        let rng = SystemRandom::new();
        let document = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &rng)
            .map_err(|e| MailsealError::SigningFailed(format!("key generation failed: {e}")))?;
        let keypair = Self::from_pkcs8(identity, document.as_ref())?;
        debug!(key_id = %keypair.key_id(), "signing keypair generated");
        Ok(keypair)
    }

    /// Wrap an existing PKCS#8 document, validating it on the way in.
    pub fn from_pkcs8(identity: &str, pkcs8_der: &[u8]) -> Result<Self> {
        let rng = SystemRandom::new();
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8_der, &rng)
            .map_err(|e| MailsealError::InvalidKey(format!("signing key parse failed: {e}")))?;

        Ok(Self {
            identity: identity.to_owned(),
            pkcs8_der: pkcs8_der.to_vec(),
            public_key: key_pair.public_key().as_ref().to_vec(),
        })
    }

    /// Parse the armored form produced by [`SigningKeypair::to_armored`].
    pub fn from_armored(text: &str) -> Result<Self> {
        let armored = dearmor(text).map_err(|e| MailsealError::InvalidKey(e.to_string()))?;
        if armored.label != PRIVATE_KEY_LABEL {
            return Err(MailsealError::InvalidKey(format!(
                "expected {PRIVATE_KEY_LABEL}, found {}",
                armored.label
            )));
        }
        let identity = armored.header(IDENTITY_HEADER).unwrap_or_default().to_owned();
        Self::from_pkcs8(&identity, &armored.data)
    }

    /// Load from an armored file on disk.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_armored(&text)
    }

    pub fn to_armored(&self) -> String {
        enarmor(
            &self.pkcs8_der,
            PRIVATE_KEY_LABEL,
            &[(IDENTITY_HEADER, &self.identity)],
        )
    }

    /// Armored public half, for publishing to recipients.
    pub fn public_key_armored(&self) -> String {
        enarmor(
            &self.public_key,
            PUBLIC_KEY_LABEL,
            &[(IDENTITY_HEADER, &self.identity)],
        )
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Short fingerprint: first 16 hex digits of SHA-256(public key).
    pub fn key_id(&self) -> String {
        hash_bytes(&self.public_key)[..16].to_ascii_uppercase()
    }

    /// Sign `message` (ASN.1 DER-encoded ECDSA signature).
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let rng = SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &self.pkcs8_der, &rng)
                .map_err(|e| MailsealError::SigningFailed(format!("key load failed: {e}")))?;

        let sig = key_pair
            .sign(&rng, message)
            .map_err(|e| MailsealError::SigningFailed(format!("signing failed: {e}")))?;

        Ok(sig.as_ref().to_vec())
    }
}

impl std::fmt::Debug for SigningKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeypair")
            .field("identity", &self.identity)
            .field("key_id", &self.key_id())
            .finish_non_exhaustive()
    }
}

/// Check a signature made by [`SigningKeypair::sign`].
pub fn verify_signature(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, public_key)
        .verify(message, signature)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_and_sign() {
        let keypair = SigningKeypair::generate("Site <site@example.org>").unwrap();
        assert_eq!(keypair.public_key().len(), 65);
        assert_eq!(keypair.public_key()[0], 0x04, "must be uncompressed point");

        let sig = keypair.sign(b"hello").unwrap();
        assert!(verify_signature(keypair.public_key(), b"hello", &sig));
        assert!(!verify_signature(keypair.public_key(), b"hellO", &sig));
    }

    #[test]
    fn armored_round_trip_keeps_identity() {
        let keypair = SigningKeypair::generate("Site <site@example.org>").unwrap();
        let restored = SigningKeypair::from_armored(&keypair.to_armored()).unwrap();

        assert_eq!(restored.identity(), "Site <site@example.org>");
        assert_eq!(restored.key_id(), keypair.key_id());
    }

    #[test]
    fn load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.key");
        let keypair = SigningKeypair::generate("Site <site@example.org>").unwrap();
        std::fs::write(&path, keypair.to_armored()).unwrap();

        assert_eq!(SigningKeypair::load(&path).unwrap().key_id(), keypair.key_id());
    }

    #[test]
    fn public_block_is_not_a_private_key() {
        let keypair = SigningKeypair::generate("Site <site@example.org>").unwrap();
        assert!(matches!(
            SigningKeypair::from_armored(&keypair.public_key_armored()),
            Err(MailsealError::InvalidKey(_))
        ));
    }

    #[test]
    fn garbage_pkcs8_rejected() {
        assert!(SigningKeypair::from_pkcs8("x", b"not a key").is_err());
    }
}
