// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Boundary traits for the external collaborators the pipeline drives.
//
// The cryptographic primitives, the enveloping program, and the mail
// transport all sit behind these traits. Bundled implementations live in
// `age_backend`, `openssl`, and `mailseal_security::keypair`; tests swap in
// instrumented fakes.

use std::path::Path;

use mailseal_core::error::Result;
use mailseal_core::types::OutgoingMessage;
use mailseal_security::SigningKeypair;

use crate::certificate::Certificate;

/// Public-key encryption for the key-based scheme.
pub trait KeyEncryptor {
    /// Parsed recipient key.
    type Key;

    /// Parse armored or raw key material; `None` if it is not a usable key.
    fn parse_public_key(&self, bytes: &[u8]) -> Option<Self::Key>;

    /// Encrypt `plaintext` to `key`, returning armored ciphertext.
    fn encrypt(&self, plaintext: &str, key: &Self::Key) -> Result<String>;

    fn is_available(&self) -> bool {
        true
    }
}

/// Produces detached signatures with the site keypair.
pub trait Signer {
    /// Name announced in the clearsign `Hash:` header.
    fn hash_algorithm(&self) -> &str {
        "SHA256"
    }

    fn sign(&self, literal: &[u8]) -> Result<Vec<u8>>;
}

impl Signer for SigningKeypair {
    fn sign(&self, literal: &[u8]) -> Result<Vec<u8>> {
        SigningKeypair::sign(self, literal)
    }
}

/// Content ciphers for certificate enveloping, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherSuite {
    Aes256Cbc,
    /// Legacy triple-DES, used only when AES-256 is missing on the host.
    TripleDes,
}

impl CipherSuite {
    pub const PREFERENCE: [Self; 2] = [Self::Aes256Cbc, Self::TripleDes];

    pub fn is_legacy(self) -> bool {
        self == Self::TripleDes
    }

    /// Algorithm name as listed by `openssl list -cipher-algorithms`.
    pub fn openssl_name(self) -> &'static str {
        match self {
            Self::Aes256Cbc => "AES-256-CBC",
            Self::TripleDes => "DES-EDE3-CBC",
        }
    }

    /// `openssl smime` flag selecting this cipher.
    pub fn openssl_flag(self) -> &'static str {
        match self {
            Self::Aes256Cbc => "-aes256",
            Self::TripleDes => "-des3",
        }
    }
}

/// The certificate enveloping primitive.
///
/// Reads plaintext from `input`, writes the enveloped entity (headers, blank
/// line, encoded body) to `output`. `headers` are prepended to the envelope's
/// own header block. Returns `false` on any failure.
pub trait Enveloper {
    fn supports(&self, cipher: CipherSuite) -> bool;

    fn envelope(
        &self,
        input: &Path,
        output: &Path,
        cert: &Certificate,
        headers: &[String],
        cipher: CipherSuite,
    ) -> bool;

    fn is_available(&self) -> bool {
        true
    }
}

/// The underlying mail transport used to re-submit single-recipient sends.
pub trait Transport {
    fn submit(&self, message: OutgoingMessage) -> Result<()>;
}
