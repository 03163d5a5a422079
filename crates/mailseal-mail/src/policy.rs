// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-recipient signing decision.

use crate::credentials::StoredCredential;

/// Hook for replacing the signing decision of a known recipient.
///
/// `default` is the decision the policy would take on its own.
pub trait SignOverride {
    fn should_sign(&self, recipient: &str, stored: &StoredCredential, default: bool) -> bool;
}

/// Shop-style rule: recipients with the `customer` role get signed mail
/// only if they opted in; every other registered recipient always does.
#[derive(Debug, Clone)]
pub struct CustomerRoleOverride {
    role: String,
}

impl CustomerRoleOverride {
    pub fn new(role: impl Into<String>) -> Self {
        Self { role: role.into() }
    }
}

impl Default for CustomerRoleOverride {
    fn default() -> Self {
        Self::new("customer")
    }
}

impl SignOverride for CustomerRoleOverride {
    fn should_sign(&self, _recipient: &str, stored: &StoredCredential, default: bool) -> bool {
        if stored.has_role(&self.role) {
            default
        } else {
            true
        }
    }
}

pub struct SignPolicy<'a> {
    sign_for_unknown: bool,
    sign_override: Option<&'a dyn SignOverride>,
}

impl<'a> SignPolicy<'a> {
    pub fn new(sign_for_unknown: bool, sign_override: Option<&'a dyn SignOverride>) -> Self {
        Self {
            sign_for_unknown,
            sign_override,
        }
    }

    /// Unknown recipients follow the global flag; known ones their own
    /// `receive_signed` setting, subject to the override.
    pub fn should_sign(&self, recipient: &str, stored: Option<&StoredCredential>) -> bool {
        match stored {
            None => self.sign_for_unknown,
            Some(stored) => {
                let default = stored.receive_signed;
                self.sign_override
                    .map_or(default, |o| o.should_sign(recipient, stored, default))
            }
        }
    }
}
