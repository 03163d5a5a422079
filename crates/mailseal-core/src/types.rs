// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Mailseal pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::MailsealError;

/// The two credential schemes a recipient can be reached with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    /// Public-key end-to-end encryption (OpenPGP-style keys).
    #[default]
    Pgp,
    /// Certificate-based enveloping (S/MIME-style X.509).
    Smime,
}

impl Scheme {
    /// The scheme that is not `self`.
    pub fn other(self) -> Self {
        match self {
            Self::Pgp => Self::Smime,
            Self::Smime => Self::Pgp,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pgp => "pgp",
            Self::Smime => "smime",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = MailsealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pgp" | "openpgp" => Ok(Self::Pgp),
            "smime" | "s/mime" => Ok(Self::Smime),
            other => Err(MailsealError::Config(format!(
                "unknown encryption method: {other}"
            ))),
        }
    }
}

/// Message headers, either as individual raw lines or as one raw blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Headers {
    Lines(Vec<String>),
    Raw(String),
}

impl Default for Headers {
    fn default() -> Self {
        Self::Raw(String::new())
    }
}

impl Headers {
    /// Newline-joined header block (no trailing newline).
    pub fn to_block(&self) -> String {
        match self {
            Self::Lines(lines) => lines
                .iter()
                .map(|l| l.trim_end_matches(['\r', '\n']))
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
            Self::Raw(raw) => raw
                .lines()
                .filter(|l| !l.trim().is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Individual logical header lines, folded continuations included.
    pub fn lines(&self) -> Vec<String> {
        let block = self.to_block();
        let mut out: Vec<String> = Vec::new();
        for line in block.lines() {
            let continuation = line.starts_with(' ') || line.starts_with('\t');
            match out.last_mut() {
                Some(prev) if continuation => {
                    prev.push('\n');
                    prev.push_str(line);
                }
                _ => out.push(line.to_owned()),
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.to_block().is_empty()
    }
}

/// Split a single delimited recipient string (`"a@x, b@y"`) into addresses.
pub fn split_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Parameters of a non-standard enveloped-mail content type, to be
/// reattached to the transport's own `Content-Type` header exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTypePatch {
    /// Media type as declared by the envelope, e.g. `application/x-pkcs7-mime`.
    pub media_type: String,
    /// Raw parameter list after the media type, e.g. `smime-type=enveloped-data; name="smime.p7m"`.
    pub params: String,
}

/// An outgoing email as handed to (and returned from) the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutgoingMessage {
    /// Recipients in order. Duplicates are processed independently.
    #[serde(deserialize_with = "deserialize_recipients")]
    pub to: Vec<String>,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub headers: Headers,
    /// Opaque attachment references, passed through untouched.
    #[serde(default)]
    pub attachments: Vec<String>,
    /// Set by the certificate adapter; consumed once at header emission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type_patch: Option<ContentTypePatch>,
}

impl OutgoingMessage {
    pub fn new(to: impl AsRef<str>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: split_recipients(to.as_ref()),
            subject: subject.into(),
            body: body.into(),
            ..Self::default()
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Take the pending content-type patch, leaving none behind.
    pub fn take_content_type_patch(&mut self) -> Option<ContentTypePatch> {
        self.content_type_patch.take()
    }
}

fn deserialize_recipients<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Field {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Field::deserialize(deserializer)? {
        Field::One(raw) => split_recipients(&raw),
        Field::Many(list) => list.iter().flat_map(|r| split_recipients(r)).collect(),
    })
}

/// What a recipient can be encrypted to, resolved once per recipient.
#[derive(Debug, Clone)]
pub enum Credential<K, C> {
    None,
    Key(K),
    Cert(C),
    Both { key: K, cert: C },
}

impl<K, C> Default for Credential<K, C> {
    fn default() -> Self {
        Self::None
    }
}

impl<K, C> Credential<K, C> {
    pub fn from_parts(key: Option<K>, cert: Option<C>) -> Self {
        match (key, cert) {
            (Some(key), Some(cert)) => Self::Both { key, cert },
            (Some(key), None) => Self::Key(key),
            (None, Some(cert)) => Self::Cert(cert),
            (None, None) => Self::None,
        }
    }

    pub fn key(&self) -> Option<&K> {
        match self {
            Self::Key(key) | Self::Both { key, .. } => Some(key),
            _ => None,
        }
    }

    pub fn cert(&self) -> Option<&C> {
        match self {
            Self::Cert(cert) | Self::Both { cert, .. } => Some(cert),
            _ => None,
        }
    }

    /// Ordered schemes to attempt. With both credentials the recipient's
    /// preference goes first.
    pub fn candidates(&self, preferred: Scheme) -> Vec<Scheme> {
        match self {
            Self::Both { .. } => vec![preferred, preferred.other()],
            Self::Key(_) => vec![Scheme::Pgp],
            Self::Cert(_) => vec![Scheme::Smime],
            Self::None => Vec::new(),
        }
    }
}

/// Per-recipient settings plus parsed credential handles.
#[derive(Debug, Clone)]
pub struct RecipientCredential<K, C> {
    pub credential: Credential<K, C>,
    pub preference: Scheme,
    pub redact_subject: bool,
    pub receive_signed: bool,
}

impl<K, C> Default for RecipientCredential<K, C> {
    fn default() -> Self {
        Self {
            credential: Credential::None,
            preference: Scheme::Pgp,
            redact_subject: false,
            receive_signed: true,
        }
    }
}

impl<K, C> RecipientCredential<K, C> {
    pub fn candidates(&self) -> Vec<Scheme> {
        self.credential.candidates(self.preference)
    }
}

/// Outcome of one scheme attempt for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum AttemptOutcome {
    Encrypted,
    Unavailable,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionAttempt {
    pub scheme: Scheme,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

impl EncryptionAttempt {
    pub fn succeeded(&self) -> bool {
        self.outcome == AttemptOutcome::Encrypted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Cred = Credential<&'static str, &'static str>;

    #[test]
    fn candidates_follow_preference_when_both_present() {
        let both = Cred::from_parts(Some("k"), Some("c"));
        assert_eq!(both.candidates(Scheme::Smime), vec![Scheme::Smime, Scheme::Pgp]);
        assert_eq!(both.candidates(Scheme::Pgp), vec![Scheme::Pgp, Scheme::Smime]);
    }

    #[test]
    fn candidates_ignore_preference_with_single_credential() {
        assert_eq!(Cred::Key("k").candidates(Scheme::Smime), vec![Scheme::Pgp]);
        assert_eq!(Cred::Cert("c").candidates(Scheme::Pgp), vec![Scheme::Smime]);
        assert!(Cred::None.candidates(Scheme::Smime).is_empty());
    }

    #[test]
    fn split_recipients_trims_and_drops_empties() {
        assert_eq!(
            split_recipients(" a@example.org,b@example.org ,, a@example.org"),
            vec!["a@example.org", "b@example.org", "a@example.org"]
        );
    }

    #[test]
    fn header_block_from_lines_and_raw() {
        let lines = Headers::Lines(vec!["From: site@example.org\r\n".into(), "X-A: 1".into()]);
        assert_eq!(lines.to_block(), "From: site@example.org\nX-A: 1");

        let raw = Headers::Raw("From: site@example.org\nX-Long: a\n b\n".into());
        assert_eq!(raw.lines(), vec!["From: site@example.org", "X-Long: a\n b"]);
        assert!(Headers::default().is_empty());
    }

    #[test]
    fn message_accepts_string_or_list_recipients() {
        let one: OutgoingMessage =
            serde_json::from_str(r#"{"to":"a@x.org, b@x.org","subject":"s","body":"b"}"#)
                .unwrap();
        assert_eq!(one.to, vec!["a@x.org", "b@x.org"]);
        assert_eq!(one.headers, Headers::default());

        let many: OutgoingMessage = serde_json::from_str(
            r#"{"to":["a@x.org"],"subject":"s","body":"b","headers":["X-A: 1"]}"#,
        )
        .unwrap();
        assert_eq!(many.to, vec!["a@x.org"]);
        assert_eq!(many.headers, Headers::Lines(vec!["X-A: 1".into()]));
    }

    #[test]
    fn content_type_patch_is_single_use() {
        let mut msg = OutgoingMessage::new("a@x.org", "s", "b");
        msg.content_type_patch = Some(ContentTypePatch {
            media_type: "application/x-pkcs7-mime".into(),
            params: "smime-type=enveloped-data".into(),
        });
        assert!(msg.take_content_type_patch().is_some());
        assert!(msg.take_content_type_patch().is_none());
    }

    #[test]
    fn scheme_parsing() {
        assert_eq!("SMIME".parse::<Scheme>().unwrap(), Scheme::Smime);
        assert_eq!("pgp".parse::<Scheme>().unwrap(), Scheme::Pgp);
        assert!("rot13".parse::<Scheme>().is_err());
    }
}
