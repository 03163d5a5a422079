// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Mailseal: Core types, errors, and configuration shared across all crates.

pub mod config;
pub mod error;
pub mod failure;
pub mod types;

pub use config::{MailConfig, SiteProfile};
pub use error::MailsealError;
pub use failure::FailureScope;
pub use types::*;
