// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Recipient X.509 certificates for the enveloping scheme.
//
// Only the outer shape is checked (PEM framing, base64, a DER SEQUENCE). Full
// path validation is the enveloping program's business.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mailseal_security::hash_bytes;

const BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const END: &str = "-----END CERTIFICATE-----";
/// DER tag for SEQUENCE.
const DER_SEQUENCE: u8 = 0x30;

/// A parsed certificate handle, held as both PEM and DER.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    pem: String,
    der: Vec<u8>,
}

impl Certificate {
    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// SHA-256 of the DER encoding, lowercase hex.
    pub fn fingerprint(&self) -> String {
        hash_bytes(&self.der)
    }
}

impl std::fmt::Debug for Certificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Certificate")
            .field("fingerprint", &self.fingerprint())
            .finish_non_exhaustive()
    }
}

/// Parse PEM or raw DER certificate material.
///
/// Returns `None` for anything that is not recognisably a certificate.
pub fn parse_certificate(bytes: &[u8]) -> Option<Certificate> {
    if bytes.first() == Some(&DER_SEQUENCE) {
        return from_der(bytes.to_vec());
    }

    let text = std::str::from_utf8(bytes).ok()?;
    let start = text.find(BEGIN)? + BEGIN.len();
    let end = start + text[start..].find(END)?;
    let encoded: String = text[start..end]
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let der = STANDARD.decode(encoded.as_bytes()).ok()?;
    from_der(der)
}

fn from_der(der: Vec<u8>) -> Option<Certificate> {
    if der.len() < 2 || der[0] != DER_SEQUENCE {
        return None;
    }
    Some(Certificate {
        pem: to_pem(&der),
        der,
    })
}

fn to_pem(der: &[u8]) -> String {
    let encoded = STANDARD.encode(der);
    let mut pem = String::with_capacity(encoded.len() + encoded.len() / 64 + 64);
    pem.push_str(BEGIN);
    pem.push('\n');
    // base64 output is ASCII, so byte chunks are valid str slices.
    for line in encoded.as_bytes().chunks(64) {
        pem.push_str(std::str::from_utf8(line).unwrap_or_default());
        pem.push('\n');
    }
    pem.push_str(END);
    pem.push('\n');
    pem
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Not a real certificate, just a well-formed DER SEQUENCE header.
    fn fake_der() -> Vec<u8> {
        let mut der = vec![0x30, 0x81, 0x90];
        der.extend(std::iter::repeat_n(0x11u8, 0x90));
        der
    }

    #[test]
    fn pem_round_trip() {
        let der = fake_der();
        let pem = to_pem(&der);
        let cert = parse_certificate(pem.as_bytes()).unwrap();

        assert_eq!(cert.der(), der.as_slice());
        assert_eq!(cert.pem(), pem);
        assert!(pem.lines().all(|l| l.len() <= 64 || l.starts_with("-----")));
    }

    #[test]
    fn pem_with_surrounding_text_and_crlf() {
        let pem = to_pem(&fake_der()).replace('\n', "\r\n");
        let wrapped = format!("Subject: test\r\n{pem}trailer");
        assert!(parse_certificate(wrapped.as_bytes()).is_some());
    }

    #[test]
    fn raw_der_accepted() {
        let cert = parse_certificate(&fake_der()).unwrap();
        assert!(cert.pem().starts_with(BEGIN));
        assert_eq!(cert.fingerprint().len(), 64);
    }

    #[test]
    fn garbage_rejected() {
        assert!(parse_certificate(b"").is_none());
        assert!(parse_certificate(b"hello").is_none());
        assert!(parse_certificate(format!("{BEGIN}\n!!!\n{END}").as_bytes()).is_none());
        // Valid base64, but not a SEQUENCE.
        assert!(parse_certificate(format!("{BEGIN}\nAAAA\n{END}").as_bytes()).is_none());
    }
}
