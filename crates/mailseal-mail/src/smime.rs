// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Certificate scheme adapter.
//
// The enveloping primitive is file-based, so every attempt stages the
// plaintext in one ephemeral artifact and receives the envelope in another.
// Both artifacts are released before `envelope` returns, on every path.

use mailseal_core::error::{MailsealError, Result};
use mailseal_core::types::{ContentTypePatch, Headers, Scheme};
use mailseal_security::{ArtifactPair, StagingArea};
use tracing::{debug, instrument, warn};

use crate::backend::{CipherSuite, Enveloper};
use crate::certificate::Certificate;
use crate::headers;

/// The enveloped replacement for a message's headers and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmimeEnvelope {
    pub headers: Headers,
    pub body: String,
    pub content_type_patch: Option<ContentTypePatch>,
}

pub struct SmimeAdapter<E> {
    staging: StagingArea,
    enveloper: E,
}

impl<E: Enveloper> SmimeAdapter<E> {
    pub fn new(staging: StagingArea, enveloper: E) -> Self {
        Self { staging, enveloper }
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    pub fn enveloper(&self) -> &E {
        &self.enveloper
    }

    pub fn is_available(&self) -> bool {
        self.enveloper.is_available()
    }

    /// Envelope `body` (with `headers`) to `cert`.
    #[instrument(skip_all, fields(cert = %cert.fingerprint()))]
    pub fn envelope(&self, body: &str, headers: &Headers, cert: &Certificate) -> Result<SmimeEnvelope> {
        let mut pair = self.staging.acquire_pair()?;
        let result = self.envelope_staged(&mut pair, body, headers, cert);

        let (input, output) = pair.release();
        debug!(?input, ?output, "staging pair released");
        result
    }

    fn envelope_staged(
        &self,
        pair: &mut ArtifactPair,
        body: &str,
        headers: &Headers,
        cert: &Certificate,
    ) -> Result<SmimeEnvelope> {
        pair.input.write(compose_payload(headers, body).as_bytes())?;

        let cipher = CipherSuite::PREFERENCE
            .into_iter()
            .find(|c| self.enveloper.supports(*c))
            .ok_or_else(|| MailsealError::encryption(Scheme::Smime, "no supported content cipher"))?;
        if cipher.is_legacy() {
            warn!(cipher = cipher.openssl_name(), "AES-256 unavailable, using legacy cipher");
        }

        let envelope_headers = headers::without_content_type(&headers.lines());
        if !self.enveloper.envelope(
            pair.input.path(),
            pair.output.path(),
            cert,
            &envelope_headers,
            cipher,
        ) {
            return Err(MailsealError::encryption(
                Scheme::Smime,
                "enveloping primitive reported failure",
            ));
        }

        let raw = pair.output.read_back()?;
        let text = String::from_utf8(raw)
            .map_err(|_| MailsealError::encryption(Scheme::Smime, "envelope is not text"))?;
        let (header_block, enveloped_body) = headers::split_entity(&text).ok_or_else(|| {
            MailsealError::encryption(Scheme::Smime, "envelope has no header/body separator")
        })?;
        if enveloped_body.trim().is_empty() {
            return Err(MailsealError::encryption(Scheme::Smime, "envelope body is empty"));
        }

        let content_type_patch = headers::content_type_patch(&header_block);
        debug!(
            patched = content_type_patch.is_some(),
            body_len = enveloped_body.len(),
            "message enveloped"
        );
        Ok(SmimeEnvelope {
            headers: Headers::Raw(header_block),
            body: enveloped_body,
            content_type_patch,
        })
    }
}

/// Header block, blank line, body. With no headers the payload is a blank
/// line followed by the body.
pub fn compose_payload(headers: &Headers, body: &str) -> String {
    if headers.is_empty() {
        format!("\n{body}")
    } else {
        format!("{}\n\n{body}", headers.to_block())
    }
}
