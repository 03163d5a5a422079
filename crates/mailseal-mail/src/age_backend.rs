// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bundled key-scheme backend: age X25519 recipients with ASCII armor.
//
// Stored keys are `age1...` recipient strings. Output is an armored
// `AGE ENCRYPTED FILE` block, so it travels as a plain-text mail body.

use std::io::Write;

use age::armor::{ArmoredWriter, Format};
use mailseal_core::error::{MailsealError, Result};
use mailseal_core::types::Scheme;

use crate::backend::KeyEncryptor;

#[derive(Debug, Clone, Copy, Default)]
pub struct AgeKeyEncryptor;

fn age_err(e: impl std::fmt::Display) -> MailsealError {
    MailsealError::encryption(Scheme::Pgp, format!("age: {e}"))
}

impl KeyEncryptor for AgeKeyEncryptor {
    type Key = age::x25519::Recipient;

    /// Accepts the first `age1...` line in the material; comment lines
    /// (as written by `age-keygen`) are skipped.
    fn parse_public_key(&self, bytes: &[u8]) -> Option<Self::Key> {
        std::str::from_utf8(bytes)
            .ok()?
            .lines()
            .map(str::trim)
            .find(|line| line.starts_with("age1"))?
            .parse()
            .ok()
    }

    fn encrypt(&self, plaintext: &str, key: &Self::Key) -> Result<String> {
        let encryptor =
            age::Encryptor::with_recipients(std::iter::once(key as &dyn age::Recipient))
                .map_err(age_err)?;

        let mut out = Vec::with_capacity(plaintext.len() + 512);
        {
            let armor = ArmoredWriter::wrap_output(&mut out, Format::AsciiArmor).map_err(age_err)?;
            let mut writer = encryptor.wrap_output(armor).map_err(age_err)?;
            writer.write_all(plaintext.as_bytes()).map_err(age_err)?;
            writer
                .finish()
                .and_then(|armor| armor.finish())
                .map_err(age_err)?;
        }

        String::from_utf8(out).map_err(age_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn encrypts_to_armored_block_that_decrypts() {
        let identity = age::x25519::Identity::generate();
        let material = format!("# created: today\n# public key\n{}\n", identity.to_public());

        let backend = AgeKeyEncryptor;
        let key = backend.parse_public_key(material.as_bytes()).unwrap();
        let armored = backend.encrypt("secret order details", &key).unwrap();
        assert!(armored.starts_with("-----BEGIN AGE ENCRYPTED FILE-----"));
        assert!(mailseal_security::armor::is_armored_message(&armored));

        let decryptor = age::Decryptor::new(age::armor::ArmoredReader::new(armored.as_bytes())).unwrap();
        let mut reader = decryptor
            .decrypt(std::iter::once(&identity as &dyn age::Identity))
            .unwrap();
        let mut plaintext = String::new();
        reader.read_to_string(&mut plaintext).unwrap();
        assert_eq!(plaintext, "secret order details");
        assert!(!armored.contains("secret order details"));
    }

    #[test]
    fn rejects_non_age_material() {
        let backend = AgeKeyEncryptor;
        assert!(backend.parse_public_key(b"-----BEGIN PGP PUBLIC KEY BLOCK-----").is_none());
        assert!(backend.parse_public_key(b"age1notvalid").is_none());
        assert!(backend.parse_public_key(&[0xFF, 0xFE]).is_none());
    }
}
