// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Failure isolation for multi-recipient sends.
//
// The unit of failure is the single recipient. Only a staging directory that
// cannot be used at all (nothing can be staged safely for anyone) or a broken
// configuration escalates to the whole batch.

use serde::{Deserialize, Serialize};

use crate::error::MailsealError;

/// How far a failure propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureScope {
    /// Degrade this recipient (unsigned and/or unencrypted) and carry on.
    Recipient,
    /// Abort the send and surface the error to the caller.
    Batch,
}

/// Classify a `MailsealError` for the fan-out loop.
pub fn classify(err: &MailsealError) -> FailureScope {
    match err {
        MailsealError::StagingDirUnusable { .. } => FailureScope::Batch,
        MailsealError::Config(_) => FailureScope::Batch,
        MailsealError::NoRecipients => FailureScope::Batch,

        MailsealError::CredentialUnavailable(_) => FailureScope::Recipient,
        MailsealError::InvalidKey(_) => FailureScope::Recipient,
        MailsealError::InvalidCertificate(_) => FailureScope::Recipient,
        MailsealError::EncryptionFailed { .. } => FailureScope::Recipient,
        MailsealError::SigningFailed(_) => FailureScope::Recipient,
        MailsealError::IntegrityMismatch { .. } => FailureScope::Recipient,
        MailsealError::Armor(_) => FailureScope::Recipient,
        MailsealError::StagingIo { .. } => FailureScope::Recipient,
        MailsealError::ErasureIncomplete(_) => FailureScope::Recipient,
        MailsealError::Transport { .. } => FailureScope::Recipient,
        MailsealError::Database(_) => FailureScope::Recipient,
        MailsealError::Serialization(_) => FailureScope::Recipient,

        // A read-only filesystem means no staging file can ever be created.
        MailsealError::Io(io_err) => match io_err.kind() {
            std::io::ErrorKind::ReadOnlyFilesystem => FailureScope::Batch,
            _ => FailureScope::Recipient,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Scheme;

    #[test]
    fn adapter_failures_stay_with_recipient() {
        let err = MailsealError::encryption(Scheme::Smime, "openssl exited 1");
        assert_eq!(classify(&err), FailureScope::Recipient);
        assert_eq!(
            classify(&MailsealError::staging("/tmp/x", "short write")),
            FailureScope::Recipient
        );
    }

    #[test]
    fn unusable_staging_dir_is_fatal() {
        let err = MailsealError::StagingDirUnusable {
            path: "/tmp".into(),
            reason: "read-only".into(),
        };
        assert_eq!(classify(&err), FailureScope::Batch);
    }

    #[test]
    fn read_only_fs_is_fatal() {
        let err = MailsealError::Io(std::io::Error::from(std::io::ErrorKind::ReadOnlyFilesystem));
        assert_eq!(classify(&err), FailureScope::Batch);
        let err = MailsealError::Io(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(classify(&err), FailureScope::Recipient);
    }
}
