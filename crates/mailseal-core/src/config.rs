// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{MailsealError, Result};
use crate::types::Scheme;

/// Site-level credentials used when mail is addressed to the administrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteProfile {
    /// The administrator address this profile applies to.
    pub email: Option<String>,
    /// Armored public key for the administrator.
    pub public_key: Option<String>,
    /// PEM certificate for the administrator.
    pub certificate: Option<String>,
    pub method: Scheme,
    pub redact_subject: bool,
}

/// Persistent pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Sign mail to addresses with no stored credential record.
    pub sign_for_unknown_recipients: bool,
    /// Overwrite passes for manual erasure (and for the delete utility).
    pub erasure_passes: u32,
    /// Directory for staging files. `None` means the OS temp dir.
    pub staging_dir: Option<PathBuf>,
    /// Filename prefix for staging files; the housekeeping sweep matches it.
    pub staging_prefix: String,
    /// Try the host's secure-delete utility before manual overwrite.
    pub use_delete_utility: bool,
    pub delete_utility: String,
    /// Armored site signing keypair.
    pub signing_key_path: Option<PathBuf>,
    pub openssl_binary: String,
    pub credential_db: Option<PathBuf>,
    pub audit_db: Option<PathBuf>,
    pub site: SiteProfile,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            sign_for_unknown_recipients: false,
            erasure_passes: 3,
            staging_dir: None,
            staging_prefix: "mailseal-".to_owned(),
            use_delete_utility: true,
            delete_utility: "shred".to_owned(),
            signing_key_path: None,
            openssl_binary: "openssl".to_owned(),
            credential_db: None,
            audit_db: None,
            site: SiteProfile::default(),
        }
    }
}

impl MailConfig {
    /// Load settings from a JSON file. Missing fields take their defaults.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        debug!("configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.erasure_passes == 0 {
            return Err(MailsealError::Config(
                "erasure_passes must be at least 1".into(),
            ));
        }
        if self.staging_prefix.is_empty() || self.staging_prefix.contains(['/', '\\']) {
            return Err(MailsealError::Config(format!(
                "invalid staging_prefix {:?}",
                self.staging_prefix
            )));
        }
        Ok(())
    }

    /// Effective staging directory.
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    /// Whether `recipient` is the configured site administrator.
    pub fn is_site_admin(&self, recipient: &str) -> bool {
        self.site
            .email
            .as_deref()
            .is_some_and(|admin| admin.eq_ignore_ascii_case(recipient.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mailseal.json");
        std::fs::write(
            &path,
            r#"{"sign_for_unknown_recipients": true, "site": {"email": "admin@example.org", "method": "smime"}}"#,
        )
        .unwrap();

        let config = MailConfig::load(&path).unwrap();
        assert!(config.sign_for_unknown_recipients);
        assert_eq!(config.erasure_passes, 3);
        assert_eq!(config.staging_prefix, "mailseal-");
        assert_eq!(config.site.method, Scheme::Smime);
        assert!(config.is_site_admin("Admin@Example.org"));
        assert!(!config.is_site_admin("someone@example.org"));
    }

    #[test]
    fn zero_passes_rejected() {
        let config = MailConfig {
            erasure_passes: 0,
            ..MailConfig::default()
        };
        assert!(matches!(config.validate(), Err(MailsealError::Config(_))));
    }

    #[test]
    fn prefix_with_separator_rejected() {
        let config = MailConfig {
            staging_prefix: "../escape".into(),
            ..MailConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
