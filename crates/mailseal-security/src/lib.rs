// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

//! mailseal-security: the pieces of the pipeline that touch disk or keys.
//!
//! Staged plaintext only ever exists inside an `EphemeralArtifact`, whose
//! scope end hands the file to the `SecureEraser`. The site signing keypair,
//! ASCII armor, SHA-256 fingerprints, and the delivery audit log live here
//! too.

pub mod armor;
pub mod artifact;
pub mod audit;
pub mod erase;
pub mod integrity;
pub mod keypair;
pub mod random;

// PUBLIC API: Re-export the primitives the mail pipeline builds on
pub use artifact::{ArtifactPair, EphemeralArtifact, StagingArea};
pub use audit::{AuditLog, DeliveryRecord};
pub use erase::{DeleteUtility, EraseOutcome, SecureEraser, ShredUtility};
pub use integrity::{hash_bytes, verify_hash};
pub use keypair::SigningKeypair;
