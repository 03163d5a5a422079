// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Multi-recipient fan-out: the pipeline's transport-facing entry point.
//
//   Idle -> Signing -> PerRecipient (loop) -> Resubmit | ReturnLast
//
// The body is signed at most once. Recipients are popped from the end of the
// list; every envelope but the last is re-submitted to the transport, the
// last is returned to the caller. A failure for one recipient degrades that
// recipient only; a batch-scoped transport error stops the send.

use std::path::PathBuf;

use mailseal_core::MailConfig;
use mailseal_core::error::{MailsealError, Result};
use mailseal_core::failure::{self, FailureScope};
use mailseal_core::types::{OutgoingMessage, RecipientCredential, split_recipients};
use mailseal_security::{AuditLog, DeliveryRecord, SigningKeypair, hash_bytes};
use tracing::{debug, error, info, instrument, warn};

use crate::backend::{Enveloper, KeyEncryptor, Signer, Transport};
use crate::credentials::{CredentialResolver, CredentialStore};
use crate::pgp::PgpAdapter;
use crate::policy::{SignOverride, SignPolicy};
use crate::selector::{MethodSelector, PreparedMail};
use crate::signing::SigningStage;
use crate::smime::SmimeAdapter;

/// Where the site signing key comes from.
pub enum SigningSource<'a> {
    /// Send unsigned.
    None,
    /// An already-loaded signer.
    Signer(&'a dyn Signer),
    /// An armored keypair file, loaded afresh for every dispatch.
    KeyFile(PathBuf),
}

/// Per-dispatch counters, for logging and the CLI summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub recipients: usize,
    pub encrypted: usize,
    pub signed: usize,
    pub resubmit_failures: usize,
}

pub struct MailFanout<'a, K, E> {
    config: &'a MailConfig,
    store: &'a dyn CredentialStore,
    pgp: &'a PgpAdapter<K>,
    smime: &'a SmimeAdapter<E>,
    transport: &'a dyn Transport,
    signing: SigningSource<'a>,
    sign_override: Option<&'a dyn SignOverride>,
    audit: Option<&'a AuditLog>,
}

impl<'a, K: KeyEncryptor, E: Enveloper> MailFanout<'a, K, E> {
    pub fn new(
        config: &'a MailConfig,
        store: &'a dyn CredentialStore,
        pgp: &'a PgpAdapter<K>,
        smime: &'a SmimeAdapter<E>,
        transport: &'a dyn Transport,
    ) -> Self {
        Self {
            config,
            store,
            pgp,
            smime,
            transport,
            signing: SigningSource::None,
            sign_override: None,
            audit: None,
        }
    }

    pub fn with_signing(mut self, signing: SigningSource<'a>) -> Self {
        self.signing = signing;
        self
    }

    pub fn with_sign_override(mut self, sign_override: &'a dyn SignOverride) -> Self {
        self.sign_override = Some(sign_override);
        self
    }

    pub fn with_audit(mut self, audit: &'a AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Process every recipient of `message` and return the last envelope.
    pub fn dispatch(&self, message: OutgoingMessage) -> Result<OutgoingMessage> {
        self.dispatch_with_stats(message).map(|(last, _)| last)
    }

    /// As [`MailFanout::dispatch`], also reporting what happened.
    #[instrument(skip_all, fields(recipients = message.to.len()))]
    pub fn dispatch_with_stats(
        &self,
        message: OutgoingMessage,
    ) -> Result<(OutgoingMessage, DispatchStats)> {
        let OutgoingMessage {
            to,
            subject,
            body,
            headers,
            attachments,
            ..
        } = message;

        // Entries may still hold a delimited list ("a@x, b@y").
        let mut to: Vec<String> = to.iter().flat_map(|r| split_recipients(r)).collect();
        if to.is_empty() {
            return Err(MailsealError::NoRecipients);
        }
        if let Err(e) = self.smime.staging().verify() {
            error!(error = %e, "staging directory unusable, aborting send");
            return Err(e);
        }

        let signed_body = self.sign_once(&body);
        let resolver = CredentialResolver::new(self.config, self.store);
        let policy = SignPolicy::new(self.config.sign_for_unknown_recipients, self.sign_override);
        let selector = MethodSelector::new(self.pgp, self.smime);

        let mut stats = DispatchStats::default();
        let mut staged = false;
        let mut last = None;
        let mut fatal = None;

        while let Some(recipient) = to.pop() {
            stats.recipients += 1;
            let stored = resolver.lookup(&recipient);

            let signed_variant = signed_body
                .as_deref()
                .filter(|_| policy.should_sign(&recipient, stored.as_ref()));
            let chosen_body = signed_variant.unwrap_or(body.as_str());

            let credential = match stored.as_ref().map(|s| resolver.resolve(&recipient, s, self.pgp)) {
                Some(Ok(credential)) => credential,
                Some(Err(e)) => {
                    debug!(error = %e, "sending unencrypted");
                    RecipientCredential::default()
                }
                None => RecipientCredential::default(),
            };
            staged |= credential.credential.cert().is_some();

            let mut prepared =
                selector.prepare(&recipient, &subject, chosen_body, &headers, &credential);
            prepared.message.attachments = attachments.clone();

            stats.signed += usize::from(signed_variant.is_some());
            stats.encrypted += usize::from(prepared.encrypted());
            self.record(&recipient, &prepared, signed_variant.is_some());

            if to.is_empty() {
                last = Some(prepared.message);
                break;
            }
            if let Err(e) = self.transport.submit(prepared.message) {
                if failure::classify(&e) == FailureScope::Batch {
                    error!(recipient = %recipient, error = %e, "transport cannot continue, aborting send");
                    fatal = Some(e);
                    break;
                }
                stats.resubmit_failures += 1;
                let e = match e {
                    MailsealError::Transport { .. } => e,
                    other => MailsealError::Transport {
                        recipient: recipient.clone(),
                        reason: other.to_string(),
                    },
                };
                error!(recipient = %recipient, error = %e, "re-submission failed");
            }
        }

        if staged {
            self.smime.staging().sweep();
        }
        if let Some(e) = fatal {
            return Err(e);
        }
        info!(
            recipients = stats.recipients,
            encrypted = stats.encrypted,
            signed = stats.signed,
            resubmit_failures = stats.resubmit_failures,
            "dispatch complete"
        );

        last.map(|message| (message, stats))
            .ok_or(MailsealError::NoRecipients)
    }

    /// Clearsign `body` once; any failure means sending unsigned.
    fn sign_once(&self, body: &str) -> Option<String> {
        let result = match &self.signing {
            SigningSource::None => return None,
            SigningSource::Signer(signer) => SigningStage::new(*signer).sign(body),
            SigningSource::KeyFile(path) => SigningKeypair::load(path)
                .map_err(|e| MailsealError::SigningFailed(format!("cannot load site key: {e}")))
                .and_then(|keypair| SigningStage::new(&keypair).sign(body)),
        };

        match result {
            Ok(signed) => {
                debug!("body signed for opted-in recipients");
                Some(signed)
            }
            Err(e) => {
                warn!(error = %e, "signing failed, sending unsigned");
                None
            }
        }
    }

    fn record(&self, recipient: &str, prepared: &PreparedMail, signed: bool) {
        let Some(audit) = self.audit else {
            return;
        };
        let body_hash = hash_bytes(prepared.message.body.as_bytes());
        let details = prepared.failure_summary();
        let entry = DeliveryRecord {
            recipient,
            scheme: prepared.scheme().map(|s| s.as_str()),
            signed,
            encrypted: prepared.encrypted(),
            body_hash: &body_hash,
            details: details.as_deref(),
        };
        if let Err(e) = audit.record(&entry) {
            warn!(recipient, error = %e, "audit record failed");
        }
    }
}
