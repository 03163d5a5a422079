// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scheme selection with fallback for one recipient.
//
// The candidate list comes from the recipient's credential. Each candidate
// yields an `EncryptionAttempt`; the loop stops at the first `Encrypted`.
// Subject redaction is applied only after a successful attempt.

use mailseal_core::types::{
    AttemptOutcome, EncryptionAttempt, Headers, OutgoingMessage, RecipientCredential, Scheme,
};
use tracing::{debug, instrument, warn};

use crate::backend::{Enveloper, KeyEncryptor};
use crate::certificate::Certificate;
use crate::pgp::PgpAdapter;
use crate::smime::SmimeAdapter;

/// A single-recipient envelope plus how it came to be.
#[derive(Debug, Clone)]
pub struct PreparedMail {
    pub message: OutgoingMessage,
    pub attempts: Vec<EncryptionAttempt>,
}

impl PreparedMail {
    pub fn encrypted(&self) -> bool {
        self.attempts.iter().any(EncryptionAttempt::succeeded)
    }

    /// The scheme that encrypted the body, if any.
    pub fn scheme(&self) -> Option<Scheme> {
        self.attempts
            .iter()
            .find(|a| a.succeeded())
            .map(|a| a.scheme)
    }

    /// `scheme: reason` for every failed attempt, joined with `; `.
    pub fn failure_summary(&self) -> Option<String> {
        let failures: Vec<String> = self
            .attempts
            .iter()
            .filter_map(|a| match &a.outcome {
                AttemptOutcome::Failed { reason } => Some(format!("{}: {reason}", a.scheme)),
                _ => None,
            })
            .collect();
        (!failures.is_empty()).then(|| failures.join("; "))
    }
}

pub struct MethodSelector<'a, K, E> {
    pgp: &'a PgpAdapter<K>,
    smime: &'a SmimeAdapter<E>,
}

impl<'a, K: KeyEncryptor, E: Enveloper> MethodSelector<'a, K, E> {
    pub fn new(pgp: &'a PgpAdapter<K>, smime: &'a SmimeAdapter<E>) -> Self {
        Self { pgp, smime }
    }

    /// Prepare the envelope for `to`.
    ///
    /// Never fails: with no candidate or no successful attempt the inputs
    /// come back unchanged.
    #[instrument(skip_all, fields(recipient = %to))]
    pub fn prepare(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        headers: &Headers,
        credential: &RecipientCredential<K::Key, Certificate>,
    ) -> PreparedMail {
        let mut message = OutgoingMessage {
            to: vec![to.to_owned()],
            subject: subject.to_owned(),
            body: body.to_owned(),
            headers: headers.clone(),
            ..OutgoingMessage::default()
        };
        let mut attempts = Vec::new();

        for scheme in credential.candidates() {
            let outcome = match scheme {
                Scheme::Pgp => self.attempt_pgp(&mut message, credential),
                Scheme::Smime => self.attempt_smime(&mut message, credential),
            };
            if let AttemptOutcome::Failed { reason } = &outcome {
                warn!(%scheme, %reason, "cannot send encrypted email, trying next scheme");
            }
            let done = outcome == AttemptOutcome::Encrypted;
            attempts.push(EncryptionAttempt { scheme, outcome });
            if done {
                break;
            }
        }

        let mut prepared = PreparedMail { message, attempts };
        if prepared.encrypted() && credential.redact_subject {
            prepared.message.subject.clear();
        }

        debug!(
            encrypted = prepared.encrypted(),
            attempts = prepared.attempts.len(),
            "recipient prepared"
        );
        prepared
    }

    fn attempt_pgp(
        &self,
        message: &mut OutgoingMessage,
        credential: &RecipientCredential<K::Key, Certificate>,
    ) -> AttemptOutcome {
        let Some(key) = credential.credential.key() else {
            return AttemptOutcome::Unavailable;
        };
        if !self.pgp.is_available() {
            return AttemptOutcome::Unavailable;
        }
        match self.pgp.encrypt(&message.body, key) {
            Ok(ciphertext) => {
                message.body = ciphertext;
                AttemptOutcome::Encrypted
            }
            Err(e) => AttemptOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }

    fn attempt_smime(
        &self,
        message: &mut OutgoingMessage,
        credential: &RecipientCredential<K::Key, Certificate>,
    ) -> AttemptOutcome {
        let Some(cert) = credential.credential.cert() else {
            return AttemptOutcome::Unavailable;
        };
        if !self.smime.is_available() {
            return AttemptOutcome::Unavailable;
        }
        match self.smime.envelope(&message.body, &message.headers, cert) {
            Ok(envelope) => {
                message.headers = envelope.headers;
                message.body = envelope.body;
                message.content_type_patch = envelope.content_type_patch;
                AttemptOutcome::Encrypted
            }
            Err(e) => AttemptOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(scheme: Scheme, outcome: AttemptOutcome) -> EncryptionAttempt {
        EncryptionAttempt { scheme, outcome }
    }

    #[test]
    fn summary_of_fallback() {
        let prepared = PreparedMail {
            message: OutgoingMessage::default(),
            attempts: vec![
                attempt(Scheme::Smime, AttemptOutcome::Failed { reason: "openssl exited 1".into() }),
                attempt(Scheme::Pgp, AttemptOutcome::Encrypted),
            ],
        };
        assert!(prepared.encrypted());
        assert_eq!(prepared.scheme(), Some(Scheme::Pgp));
        assert_eq!(prepared.failure_summary().as_deref(), Some("smime: openssl exited 1"));
    }

    #[test]
    fn unavailable_is_not_a_failure() {
        let prepared = PreparedMail {
            message: OutgoingMessage::default(),
            attempts: vec![attempt(Scheme::Pgp, AttemptOutcome::Unavailable)],
        };
        assert!(!prepared.encrypted());
        assert_eq!(prepared.scheme(), None);
        assert!(prepared.failure_summary().is_none());
    }
}
