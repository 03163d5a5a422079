// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Mailseal.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::Scheme;

/// Top-level error type for all Mailseal operations.
#[derive(Debug, Error)]
pub enum MailsealError {
    // -- Credential errors --
    #[error("no usable credential for {0}")]
    CredentialUnavailable(String),

    #[error("public key rejected: {0}")]
    InvalidKey(String),

    #[error("certificate rejected: {0}")]
    InvalidCertificate(String),

    // -- Cryptographic operations --
    #[error("{scheme} encryption failed: {reason}")]
    EncryptionFailed { scheme: Scheme, reason: String },

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("armor decoding failed: {0}")]
    Armor(String),

    // -- Staging / erasure --
    #[error("staging file {}: {}", .path.display(), .reason)]
    StagingIo { path: PathBuf, reason: String },

    #[error("staging directory {} is unusable: {}", .path.display(), .reason)]
    StagingDirUnusable { path: PathBuf, reason: String },

    #[error("erasure of {} could not be verified", .0.display())]
    ErasureIncomplete(PathBuf),

    // -- Dispatch --
    #[error("message has no recipients")]
    NoRecipients,

    #[error("transport rejected message for {recipient}: {reason}")]
    Transport { recipient: String, reason: String },

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MailsealError {
    /// Shorthand for a staging failure on `path`.
    pub fn staging(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::StagingIo {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for an adapter failure under `scheme`.
    pub fn encryption(scheme: Scheme, reason: impl ToString) -> Self {
        Self::EncryptionFailed {
            scheme,
            reason: reason.to_string(),
        }
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MailsealError>;
