// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Mailseal Mail: per-recipient signing and encryption of outgoing mail.
// `MailFanout` splits a send into single-recipient envelopes, the
// `MethodSelector` picks and falls back between the key and certificate
// schemes, and the adapters drive the pluggable backends in `backend`.

pub mod age_backend;
pub mod backend;
pub mod certificate;
pub mod credentials;
pub mod fanout;
pub mod headers;
pub mod openssl;
pub mod pgp;
pub mod policy;
pub mod selector;
pub mod signing;
pub mod smime;

pub use age_backend::AgeKeyEncryptor;
pub use backend::{CipherSuite, Enveloper, KeyEncryptor, Signer, Transport};
pub use certificate::{Certificate, parse_certificate};
pub use credentials::{
    CredentialResolver, CredentialStore, InMemoryCredentialStore, SqliteCredentialStore,
    StoredCredential,
};
pub use fanout::{DispatchStats, MailFanout, SigningSource};
pub use openssl::OpenSslEnveloper;
pub use pgp::PgpAdapter;
pub use policy::{CustomerRoleOverride, SignOverride, SignPolicy};
pub use selector::{MethodSelector, PreparedMail};
pub use signing::SigningStage;
pub use smime::{SmimeAdapter, SmimeEnvelope};
