// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Ephemeral staging files for external cryptographic calls.
//
// An `EphemeralArtifact` owns exactly one uniquely named file in the staging
// directory. However its scope ends (explicit release, early return, `?`, or
// unwinding) the file is handed to the `SecureEraser`. Erasure failures are
// logged and never propagated, so they cannot mask the caller's own result.
//
// Lifecycle: created empty -> written once -> read back -> destroyed.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mailseal_core::MailConfig;
use mailseal_core::error::{MailsealError, Result};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::erase::{self, EraseOutcome, SecureEraser};
use crate::integrity::{hash_bytes, verify_hash};

/// The shared directory where artifacts are created.
#[derive(Clone)]
pub struct StagingArea {
    dir: PathBuf,
    prefix: String,
    eraser: Arc<SecureEraser>,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>, eraser: Arc<SecureEraser>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            eraser,
        }
    }

    pub fn from_config(config: &MailConfig) -> Self {
        Self::new(
            config.staging_dir(),
            config.staging_prefix.clone(),
            Arc::new(SecureEraser::from_config(config)),
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Create an empty, uniquely named staging file.
    ///
    /// `label` is only a readability aid in the filename (`input`, `output`,
    /// `cert`); uniqueness comes from a random UUID.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub fn acquire(&self, label: &str) -> Result<EphemeralArtifact> {
        let name = format!("{}{}-{}", self.prefix, label, Uuid::new_v4().simple());
        let path = self.dir.join(name);

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        options
            .open(&path)
            .map_err(|e| MailsealError::staging(&path, format!("create: {e}")))?;

        debug!(path = %path.display(), "staging file acquired");
        Ok(EphemeralArtifact {
            path,
            eraser: Arc::clone(&self.eraser),
            written: false,
            len: 0,
            digest: None,
            released: false,
        })
    }

    /// Acquire the input/output pair used by one enveloping call.
    ///
    /// If the second acquisition fails the first artifact is dropped, and
    /// therefore erased, before the error is returned.
    pub fn acquire_pair(&self) -> Result<ArtifactPair> {
        let input = self.acquire("input")?;
        let output = self.acquire("output")?;
        Ok(ArtifactPair { input, output })
    }

    /// Confirm the directory can hold staging files at all.
    ///
    /// Failure here means no recipient can be processed safely, so it is
    /// reported as `StagingDirUnusable`.
    pub fn verify(&self) -> Result<()> {
        let unusable = |reason: String| MailsealError::StagingDirUnusable {
            path: self.dir.clone(),
            reason,
        };

        let mut probe = self.acquire("probe").map_err(|e| unusable(e.to_string()))?;
        probe.write(b"probe").map_err(|e| unusable(e.to_string()))?;
        probe.release();
        Ok(())
    }

    /// Log any staging files still present in the directory.
    pub fn sweep(&self) -> Vec<PathBuf> {
        erase::sweep(&self.dir, &self.prefix)
    }
}

/// One staging file with a destruction guarantee.
pub struct EphemeralArtifact {
    path: PathBuf,
    eraser: Arc<SecureEraser>,
    written: bool,
    len: u64,
    digest: Option<String>,
    released: bool,
}

impl EphemeralArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte length of what was written.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// SHA-256 of what was written, if anything.
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Write the artifact's content. Allowed once.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.written {
            return Err(MailsealError::staging(&self.path, "already written"));
        }
        self.written = true;

        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|e| MailsealError::staging(&self.path, format!("open: {e}")))?;
        file.write_all(bytes)
            .map_err(|e| MailsealError::staging(&self.path, format!("write: {e}")))?;
        file.sync_all()
            .map_err(|e| MailsealError::staging(&self.path, format!("sync: {e}")))?;

        // A short or torn write must not reach the enveloping call.
        let digest = hash_bytes(bytes);
        verify_hash(&self.read_back()?, &digest)?;

        self.len = bytes.len() as u64;
        self.digest = Some(digest);
        Ok(())
    }

    /// Read back what an external process left in the file.
    pub fn read_back(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|e| MailsealError::staging(&self.path, format!("read: {e}")))
    }

    /// Erase the file now.
    pub fn release(mut self) -> EraseOutcome {
        self.destroy()
    }

    fn destroy(&mut self) -> EraseOutcome {
        self.released = true;
        let outcome = self.eraser.erase(&self.path);
        match outcome {
            EraseOutcome::Erased | EraseOutcome::NotFound => {
                debug!(path = %self.path.display(), ?outcome, "staging file released");
            }
            EraseOutcome::NotAFile | EraseOutcome::Incomplete => {
                let err = MailsealError::ErasureIncomplete(self.path.clone());
                error!(error = %err, ?outcome, "staging file may still hold message data");
            }
        }
        outcome
    }
}

impl Drop for EphemeralArtifact {
    fn drop(&mut self) {
        if !self.released {
            self.destroy();
        }
    }
}

impl std::fmt::Debug for EphemeralArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralArtifact")
            .field("path", &self.path)
            .field("len", &self.len)
            .field("released", &self.released)
            .finish()
    }
}

/// Input and output files for one enveloping call, released together.
#[derive(Debug)]
pub struct ArtifactPair {
    pub input: EphemeralArtifact,
    pub output: EphemeralArtifact,
}

impl ArtifactPair {
    pub fn release(self) -> (EraseOutcome, EraseOutcome) {
        (self.input.release(), self.output.release())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn area(dir: &Path) -> StagingArea {
        StagingArea::new(dir, "mailseal-", Arc::new(SecureEraser::new(1)))
    }

    #[test]
    fn acquire_creates_empty_unique_files() {
        let dir = tempfile::tempdir().unwrap();
        let staging = area(dir.path());

        let a = staging.acquire("input").unwrap();
        let b = staging.acquire("input").unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().exists());
        assert_eq!(fs::read(a.path()).unwrap().len(), 0);
        assert!(
            a.path()
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("mailseal-input-"))
        );
    }

    #[test]
    fn concurrent_acquires_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let staging = area(dir.path());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let staging = staging.clone();
                std::thread::spawn(move || {
                    (0..16)
                        .map(|_| staging.acquire("input").unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let artifacts: Vec<EphemeralArtifact> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        let mut names: Vec<_> = artifacts.iter().map(|a| a.path().to_path_buf()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 128);

        drop(artifacts);
        assert!(staging.sweep().is_empty());
    }

    #[test]
    fn write_is_single_use() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifact = area(dir.path()).acquire("input").unwrap();

        artifact.write(b"Subject: hi\n\nbody").unwrap();
        assert_eq!(artifact.len(), 17);
        assert_eq!(artifact.digest(), Some(hash_bytes(b"Subject: hi\n\nbody").as_str()));
        assert!(matches!(
            artifact.write(b"again"),
            Err(MailsealError::StagingIo { .. })
        ));
        assert_eq!(artifact.read_back().unwrap(), b"Subject: hi\n\nbody");
    }

    #[test]
    fn release_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifact = area(dir.path()).acquire("input").unwrap();
        artifact.write(b"secret").unwrap();
        let path = artifact.path().to_path_buf();

        assert_eq!(artifact.release(), EraseOutcome::Erased);
        assert!(!path.exists());
    }

    #[test]
    fn drop_erases_on_early_exit() {
        let dir = tempfile::tempdir().unwrap();
        let staging = area(dir.path());

        fn failing(staging: &StagingArea) -> Result<()> {
            let mut artifact = staging.acquire("input")?;
            artifact.write(b"plaintext")?;
            Err(MailsealError::staging(artifact.path(), "simulated"))
        }

        assert!(failing(&staging).is_err());
        assert!(staging.sweep().is_empty());
    }

    #[test]
    fn drop_erases_during_unwind() {
        let dir = tempfile::tempdir().unwrap();
        let staging = area(dir.path());

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut artifact = staging.acquire("input").unwrap();
            artifact.write(b"plaintext").unwrap();
            panic!("boom");
        }));

        assert!(result.is_err());
        assert!(staging.sweep().is_empty());
    }

    #[test]
    fn release_after_external_removal_is_quiet() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = area(dir.path()).acquire("output").unwrap();
        fs::remove_file(artifact.path()).unwrap();
        assert_eq!(artifact.release(), EraseOutcome::NotFound);
    }

    #[test]
    fn pair_releases_both_even_if_only_one_written() {
        let dir = tempfile::tempdir().unwrap();
        let staging = area(dir.path());
        let mut pair = staging.acquire_pair().unwrap();
        pair.input.write(b"plaintext").unwrap();

        let (a, b) = pair.release();
        assert!(a.is_success() && b.is_success());
        assert!(staging.sweep().is_empty());
    }

    #[test]
    fn verify_rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let staging = area(&dir.path().join("does-not-exist"));
        assert!(matches!(
            staging.verify(),
            Err(MailsealError::StagingDirUnusable { .. })
        ));

        assert!(area(dir.path()).verify().is_ok());
        assert!(area(dir.path()).sweep().is_empty());
    }
}
