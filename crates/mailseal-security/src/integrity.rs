// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// SHA-256 fingerprints for staged content and audit records.

use mailseal_core::error::MailsealError;
use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of `data` and return it as a lowercase hex string.
///
/// Used to fingerprint staged payloads and outgoing bodies without ever
/// persisting the bytes themselves.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Verify that `data` matches the expected SHA-256 hex digest.
pub fn verify_hash(data: &[u8], expected_hex: &str) -> Result<(), MailsealError> {
    let actual = hash_bytes(data);
    if actual.eq_ignore_ascii_case(expected_hex) {
        Ok(())
    } else {
        Err(MailsealError::IntegrityMismatch {
            expected: expected_hex.to_owned(),
            actual,
        })
    }
}
