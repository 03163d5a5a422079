// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Header-block helpers for enveloped messages.

use mailseal_core::types::{ContentTypePatch, OutgoingMessage};
use tracing::debug;

/// Media types carrying parameters the transport would otherwise drop.
const PATCHED_MEDIA_PREFIX: &str = "application/x-";

/// Whether a raw header line is a `Content-Type` header.
pub fn is_content_type(line: &str) -> bool {
    line.split_once(':')
        .is_some_and(|(name, _)| name.trim().eq_ignore_ascii_case("content-type"))
}

/// Drop every `Content-Type` line; the envelope declares its own.
pub fn without_content_type(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter(|line| !is_content_type(line))
        .cloned()
        .collect()
}

/// Split a MIME entity at its first blank line into (header block, body).
///
/// Accepts both `\n\n` and `\r\n\r\n` separators; the header block is returned
/// with `\n` line endings.
pub fn split_entity(text: &str) -> Option<(String, String)> {
    let lf = text.find("\n\n").map(|i| (i, 2));
    let crlf = text.find("\r\n\r\n").map(|i| (i, 4));
    let (at, width) = match (lf, crlf) {
        (Some(a), Some(b)) => {
            if a.0 < b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };

    let header_block = text[..at].replace("\r\n", "\n");
    let body = text[at + width..].to_owned();
    Some((header_block, body))
}

/// The unfolded value of the first `Content-Type` in `header_block`.
pub fn declared_content_type(header_block: &str) -> Option<String> {
    let line = unfold(header_block)
        .into_iter()
        .find(|line| is_content_type(line))?;
    let value = line.split_once(':')?.1.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

/// Find a `Content-Type` in `header_block` whose parameters must be restored
/// at emission time.
pub fn content_type_patch(header_block: &str) -> Option<ContentTypePatch> {
    let value = declared_content_type(header_block)?;

    let (media_type, params) = value.split_once(';')?;
    let media_type = media_type.trim().to_ascii_lowercase();
    let params = params.trim();
    if !media_type.starts_with(PATCHED_MEDIA_PREFIX) || params.is_empty() {
        return None;
    }

    Some(ContentTypePatch {
        media_type,
        params: params.to_owned(),
    })
}

/// Final `Content-Type` value at header emission.
///
/// Consumes the message's pending patch, so a second call (or a later
/// message) falls back to `current`.
pub fn finalize_content_type(message: &mut OutgoingMessage, current: &str) -> String {
    match message.take_content_type_patch() {
        Some(patch) => {
            debug!(media_type = %patch.media_type, "restoring content-type parameters");
            format!("{}; {}", patch.media_type, patch.params)
        }
        None => current.to_owned(),
    }
}

fn unfold(block: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for line in block.lines() {
        let continuation = line.starts_with([' ', '\t']);
        match lines.last_mut() {
            Some(last) if continuation => {
                last.push(' ');
                last.push_str(line.trim());
            }
            _ => lines.push(line.to_owned()),
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENVELOPE_HEADERS: &str = "MIME-Version: 1.0\n\
        Content-Disposition: attachment; filename=\"smime.p7m\"\n\
        Content-Type: application/x-pkcs7-mime; smime-type=enveloped-data;\n \
        name=\"smime.p7m\"\n\
        Content-Transfer-Encoding: base64";

    #[test]
    fn content_type_filter_is_case_insensitive() {
        let lines = vec![
            "From: shop@example.org".to_owned(),
            "content-TYPE: text/html; charset=UTF-8".to_owned(),
            "Reply-To: help@example.org".to_owned(),
            "X-Content-Type-Options: nosniff".to_owned(),
        ];
        let kept = without_content_type(&lines);
        assert_eq!(
            kept,
            vec![
                "From: shop@example.org",
                "Reply-To: help@example.org",
                "X-Content-Type-Options: nosniff"
            ]
        );
    }

    #[test]
    fn split_on_first_blank_line() {
        let (head, body) = split_entity("A: 1\nB: 2\n\nline one\n\nline two").unwrap();
        assert_eq!(head, "A: 1\nB: 2");
        assert_eq!(body, "line one\n\nline two");

        let (head, body) = split_entity("A: 1\r\nB: 2\r\n\r\nbody").unwrap();
        assert_eq!(head, "A: 1\nB: 2");
        assert_eq!(body, "body");

        assert!(split_entity("no separator here").is_none());
    }

    #[test]
    fn patch_extracted_from_folded_header() {
        let patch = content_type_patch(ENVELOPE_HEADERS).unwrap();
        assert_eq!(patch.media_type, "application/x-pkcs7-mime");
        assert_eq!(patch.params, "smime-type=enveloped-data; name=\"smime.p7m\"");
    }

    #[test]
    fn standard_or_parameterless_types_need_no_patch() {
        assert!(content_type_patch("Content-Type: text/plain; charset=UTF-8").is_none());
        assert!(content_type_patch("Content-Type: application/x-pkcs7-mime").is_none());
        assert!(content_type_patch("Subject: hi").is_none());
    }

    #[test]
    fn patch_applies_exactly_once() {
        let mut message = OutgoingMessage::new("a@example.org", "s", "b");
        message.content_type_patch = content_type_patch(ENVELOPE_HEADERS);

        let first = finalize_content_type(&mut message, "application/x-pkcs7-mime");
        assert_eq!(
            first,
            "application/x-pkcs7-mime; smime-type=enveloped-data; name=\"smime.p7m\""
        );
        assert_eq!(finalize_content_type(&mut message, "text/plain"), "text/plain");
    }

    #[test]
    fn declared_type_read_from_folded_block() {
        assert_eq!(
            declared_content_type(ENVELOPE_HEADERS).as_deref(),
            Some("application/x-pkcs7-mime; smime-type=enveloped-data; name=\"smime.p7m\"")
        );
        let standard = "MIME-Version: 1.0\nContent-Type: application/pkcs7-mime; smime-type=enveloped-data";
        assert!(content_type_patch(standard).is_none());
        assert_eq!(
            declared_content_type(standard).as_deref(),
            Some("application/pkcs7-mime; smime-type=enveloped-data")
        );
        assert!(declared_content_type("From: a@example.org").is_none());
    }
}
