// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bundled enveloping backend: the host's `openssl smime` command.
//
// The recipient certificate is staged through its own ephemeral artifact, so
// nothing the pipeline writes outlives the call. Cipher support is probed
// once per process via `openssl list -cipher-algorithms`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use mailseal_security::StagingArea;
use tracing::{debug, instrument, warn};

use crate::backend::{CipherSuite, Enveloper};
use crate::certificate::Certificate;

pub struct OpenSslEnveloper {
    binary: String,
    staging: StagingArea,
    /// Uppercased cipher listing, or `None` if the binary could not run.
    ciphers: OnceLock<Option<String>>,
}

impl OpenSslEnveloper {
    pub fn new(binary: impl Into<String>, staging: StagingArea) -> Self {
        Self {
            binary: binary.into(),
            staging,
            ciphers: OnceLock::new(),
        }
    }

    fn cipher_listing(&self) -> Option<&str> {
        self.ciphers
            .get_or_init(|| {
                let output = Command::new(&self.binary)
                    .args(["list", "-cipher-algorithms"])
                    .stdin(Stdio::null())
                    .stderr(Stdio::null())
                    .output();
                match output {
                    Ok(out) if out.status.success() => {
                        Some(String::from_utf8_lossy(&out.stdout).to_ascii_uppercase())
                    }
                    Ok(out) => {
                        warn!(binary = %self.binary, status = %out.status, "cipher probe failed");
                        None
                    }
                    Err(e) => {
                        warn!(binary = %self.binary, error = %e, "openssl not runnable");
                        None
                    }
                }
            })
            .as_deref()
    }

    /// Rewrites `output` in place, never truncating it: the ciphertext
    /// extent must stay with the artifact until it is erased.
    fn prepend_headers(output: &Path, headers: &[String]) -> std::io::Result<()> {
        if headers.is_empty() {
            return Ok(());
        }
        let envelope = fs::read(output)?;
        let mut combined = headers.join("\n").into_bytes();
        combined.push(b'\n');
        combined.extend_from_slice(&envelope);

        let mut file = OpenOptions::new().write(true).open(output)?;
        file.write_all(&combined)?;
        file.sync_all()
    }
}

impl Enveloper for OpenSslEnveloper {
    fn is_available(&self) -> bool {
        self.cipher_listing().is_some()
    }

    fn supports(&self, cipher: CipherSuite) -> bool {
        self.cipher_listing()
            .is_some_and(|listing| listing.contains(cipher.openssl_name()))
    }

    #[instrument(skip_all, fields(cipher = cipher.openssl_name()))]
    fn envelope(
        &self,
        input: &Path,
        output: &Path,
        cert: &Certificate,
        headers: &[String],
        cipher: CipherSuite,
    ) -> bool {
        let mut cert_file = match self.staging.acquire("cert") {
            Ok(file) => file,
            Err(e) => {
                warn!(error = %e, "cannot stage recipient certificate");
                return false;
            }
        };
        if let Err(e) = cert_file.write(cert.pem().as_bytes()) {
            warn!(error = %e, "cannot stage recipient certificate");
            return false;
        }

        let result = Command::new(&self.binary)
            .args(["smime", "-encrypt", "-binary", cipher.openssl_flag()])
            .arg("-in")
            .arg(input)
            .arg("-out")
            .arg(output)
            .args(["-outform", "SMIME"])
            .arg(cert_file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output();

        match result {
            Ok(out) if out.status.success() => {}
            Ok(out) => {
                warn!(
                    status = %out.status,
                    stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                    "openssl smime failed"
                );
                return false;
            }
            Err(e) => {
                warn!(error = %e, "openssl smime could not be started");
                return false;
            }
        }

        if let Err(e) = Self::prepend_headers(output, headers) {
            warn!(error = %e, "cannot add headers to envelope");
            return false;
        }
        debug!("envelope written");
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mailseal_security::SecureEraser;

    use super::*;

    #[test]
    fn missing_binary_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(dir.path(), "mailseal-", Arc::new(SecureEraser::new(1)));
        let enveloper = OpenSslEnveloper::new("/nonexistent/openssl-binary", staging);

        assert!(!enveloper.is_available());
        assert!(!enveloper.supports(CipherSuite::Aes256Cbc));
        assert!(!enveloper.supports(CipherSuite::TripleDes));
    }

    #[test]
    fn failed_run_leaves_no_staged_certificate() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(dir.path(), "mailseal-", Arc::new(SecureEraser::new(1)));
        let enveloper = OpenSslEnveloper::new("/nonexistent/openssl-binary", staging.clone());

        let mut der = vec![0x30, 0x04];
        der.extend([1u8; 4]);
        let cert = crate::certificate::parse_certificate(&der).unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        fs::write(&input, "payload").unwrap();

        assert!(!enveloper.envelope(&input, &output, &cert, &[], CipherSuite::Aes256Cbc));
        assert!(staging.sweep().is_empty());
    }

    #[test]
    fn headers_prepended_to_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");
        fs::write(&output, "MIME-Version: 1.0\n\nBODY").unwrap();

        OpenSslEnveloper::prepend_headers(&output, &["From: shop@example.org".to_owned()]).unwrap();
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "From: shop@example.org\nMIME-Version: 1.0\n\nBODY"
        );
    }

    #[cfg(unix)]
    #[test]
    fn header_rewrite_keeps_inode_and_grows() {
        use std::os::unix::fs::MetadataExt;

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out");
        let envelope = format!("MIME-Version: 1.0\n\n{}", "C".repeat(64 * 1024));
        fs::write(&output, &envelope).unwrap();
        let before = fs::metadata(&output).unwrap();

        let headers = vec!["From: shop@example.org".to_owned(), "X-Tag: 1".to_owned()];
        OpenSslEnveloper::prepend_headers(&output, &headers).unwrap();

        let after = fs::metadata(&output).unwrap();
        assert_eq!(after.ino(), before.ino());
        assert!(after.len() > before.len());
        let text = fs::read_to_string(&output).unwrap();
        assert!(text.starts_with("From: shop@example.org\nX-Tag: 1\nMIME-Version: 1.0\n\n"));
        assert!(text.ends_with(&envelope));
        assert_eq!(text.len() as u64, after.len());
    }
}
