// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stand-in transport: one JSON object per outgoing message.

use std::cell::RefCell;
use std::io::Write;

use mailseal_core::error::Result;
use mailseal_core::types::OutgoingMessage;
use mailseal_mail::Transport;
use mailseal_mail::headers::{declared_content_type, finalize_content_type};
use mailseal_security::armor::is_armored_message;
use serde::Serialize;

const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=UTF-8";

/// A message as it leaves the pipeline, with its final `Content-Type`.
#[derive(Debug, Serialize)]
pub struct EmittedMessage {
    #[serde(flatten)]
    pub message: OutgoingMessage,
    pub content_type: String,
    /// Body is an armored encrypted block.
    pub armored: bool,
}

impl EmittedMessage {
    /// A pending patch wins; otherwise the headers' own `Content-Type`, then
    /// plain text.
    pub fn finalize(mut message: OutgoingMessage) -> Self {
        let declared = declared_content_type(&message.headers.to_block());
        let current = declared.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);
        let content_type = finalize_content_type(&mut message, current);
        let armored = is_armored_message(&message.body);
        Self {
            message,
            content_type,
            armored,
        }
    }
}

/// Writes every submitted message as a JSON line to `out`.
pub struct JsonLinesTransport<W: Write> {
    out: RefCell<W>,
}

impl<W: Write> JsonLinesTransport<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: RefCell::new(out),
        }
    }

    pub fn emit(&self, message: OutgoingMessage) -> Result<()> {
        let line = serde_json::to_string(&EmittedMessage::finalize(message))?;
        let mut out = self.out.borrow_mut();
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write> Transport for JsonLinesTransport<W> {
    fn submit(&self, message: OutgoingMessage) -> Result<()> {
        self.emit(message)
    }
}

#[cfg(test)]
mod tests {
    use mailseal_core::types::{ContentTypePatch, Headers};

    use super::*;

    #[test]
    fn patch_consumed_into_content_type() {
        let transport = JsonLinesTransport::new(Vec::new());
        let mut message = OutgoingMessage::new("a@example.org", "s", "MIAG...");
        message.content_type_patch = Some(ContentTypePatch {
            media_type: "application/x-pkcs7-mime".into(),
            params: "smime-type=enveloped-data".into(),
        });
        transport.submit(message).unwrap();
        transport
            .submit(OutgoingMessage::new("b@example.org", "s", "-----BEGIN AGE ENCRYPTED FILE-----\n"))
            .unwrap();

        let out = String::from_utf8(transport.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> =
            out.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0]["content_type"],
            "application/x-pkcs7-mime; smime-type=enveloped-data"
        );
        assert!(lines[0].get("content_type_patch").is_none());
        assert_eq!(lines[1]["content_type"], DEFAULT_CONTENT_TYPE);
        assert_eq!(lines[1]["armored"], true);
        assert_eq!(lines[1]["to"][0], "b@example.org");
    }

    #[test]
    fn unpatched_envelope_keeps_its_declared_type() {
        let message = OutgoingMessage::new("a@example.org", "s", "MIAG...").with_headers(
            Headers::Lines(vec![
                "MIME-Version: 1.0".into(),
                "Content-Type: application/pkcs7-mime; smime-type=enveloped-data;".into(),
                " name=\"smime.p7m\"".into(),
            ]),
        );
        let emitted = EmittedMessage::finalize(message);
        assert_eq!(
            emitted.content_type,
            "application/pkcs7-mime; smime-type=enveloped-data; name=\"smime.p7m\""
        );
        assert!(!emitted.armored);
    }
}
