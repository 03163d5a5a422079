// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Cleartext signing of the message body (RFC 4880 §7 framing).
//
//   -----BEGIN PGP SIGNED MESSAGE-----
//   Hash: SHA256
//
//   <dash-escaped body>
//   -----BEGIN PGP SIGNATURE-----
//   ...
//   -----END PGP SIGNATURE-----
//
// The signature covers the canonical text: `\r\n` line endings, trailing
// spaces and tabs stripped from each line.

use mailseal_core::error::{MailsealError, Result};
use mailseal_security::armor::{dearmor, enarmor};
use tracing::{debug, instrument};

use crate::backend::Signer;

pub const SIGNED_MESSAGE_HEADER: &str = "-----BEGIN PGP SIGNED MESSAGE-----";
pub const SIGNATURE_LABEL: &str = "PGP SIGNATURE";
const SIGNATURE_BEGIN: &str = "-----BEGIN PGP SIGNATURE-----";

/// Produces clearsigned bodies with the site key.
pub struct SigningStage<'a> {
    signer: &'a dyn Signer,
}

impl<'a> SigningStage<'a> {
    pub fn new(signer: &'a dyn Signer) -> Self {
        Self { signer }
    }

    /// Clearsign `body`. Any failure is reported as `SigningFailed`.
    #[instrument(skip_all, fields(len = body.len()))]
    pub fn sign(&self, body: &str) -> Result<String> {
        let normalized = body.replace("\r\n", "\n");
        let signature = self
            .signer
            .sign(canonical_text(&normalized).as_bytes())
            .map_err(|e| match e {
                MailsealError::SigningFailed(_) => e,
                other => MailsealError::SigningFailed(other.to_string()),
            })?;
        if signature.is_empty() {
            return Err(MailsealError::SigningFailed("signer returned no signature".into()));
        }

        let mut out = String::with_capacity(normalized.len() + 512);
        out.push_str(SIGNED_MESSAGE_HEADER);
        out.push('\n');
        out.push_str("Hash: ");
        out.push_str(self.signer.hash_algorithm());
        out.push_str("\n\n");
        out.push_str(&dash_escape(&normalized));
        out.push('\n');
        out.push_str(&enarmor(&signature, SIGNATURE_LABEL, &[]));

        debug!("body clearsigned");
        Ok(out)
    }
}

/// A parsed clearsigned body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearSigned {
    pub hash: String,
    /// The body with dash-escaping removed.
    pub text: String,
    pub signature: Vec<u8>,
}

impl ClearSigned {
    /// Bytes the signature was made over.
    pub fn signed_bytes(&self) -> Vec<u8> {
        canonical_text(&self.text).into_bytes()
    }
}

/// Parse text produced by [`SigningStage::sign`].
pub fn parse_clearsigned(text: &str) -> Result<ClearSigned> {
    let text = text.replace("\r\n", "\n");
    let rest = text
        .strip_prefix(SIGNED_MESSAGE_HEADER)
        .and_then(|r| r.strip_prefix('\n'))
        .ok_or_else(|| MailsealError::Armor("not a clearsigned message".into()))?;

    let (header_block, rest) = rest
        .split_once("\n\n")
        .ok_or_else(|| MailsealError::Armor("clearsign header not terminated".into()))?;
    let hash = header_block
        .lines()
        .find_map(|l| l.strip_prefix("Hash: "))
        .unwrap_or("MD5")
        .to_owned();

    let marker = format!("\n{SIGNATURE_BEGIN}");
    let split = if rest.starts_with(SIGNATURE_BEGIN) {
        0
    } else {
        rest.find(&marker)
            .map(|i| i + 1)
            .ok_or_else(|| MailsealError::Armor("signature block missing".into()))?
    };
    let escaped = rest[..split].strip_suffix('\n').unwrap_or(&rest[..split]);
    let signature = dearmor(&rest[split..])?;
    if signature.label != SIGNATURE_LABEL {
        return Err(MailsealError::Armor(format!("unexpected block {}", signature.label)));
    }

    Ok(ClearSigned {
        hash,
        text: dash_unescape(escaped),
        signature: signature.data,
    })
}

/// Prefix every line that starts with `-` with `- `.
pub fn dash_escape(text: &str) -> String {
    text.split('\n')
        .map(|line| {
            if line.starts_with('-') {
                format!("- {line}")
            } else {
                line.to_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn dash_unescape(text: &str) -> String {
    text.split('\n')
        .map(|line| line.strip_prefix("- ").unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn canonical_text(text: &str) -> String {
    text.split('\n')
        .map(|line| line.trim_end_matches([' ', '\t']))
        .collect::<Vec<_>>()
        .join("\r\n")
}
