// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Secure erasure: overwrite a file with random data, truncate, unlink.
//
// Erasure is best effort: each failing filesystem step is logged and the next
// step is still attempted. The only success criterion is that the path no
// longer exists afterwards.
//
// When the host has a secure-delete utility (`shred` by default) it is tried
// first with force/remove/zero semantics; the manual overwrite runs only if
// the utility is missing or leaves the file behind.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use mailseal_core::MailConfig;
use tracing::{debug, error, instrument, warn};

use crate::random::{OverwriteRandom, RandomSource};

/// Overwrite buffer size.
const CHUNK: usize = 64 * 1024;

/// Result of erasing one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EraseOutcome {
    /// Content overwritten (or delegated) and the path is gone.
    Erased,
    /// Nothing existed at the path.
    NotFound,
    /// The path is a directory or other non-regular entry; left untouched.
    NotAFile,
    /// The path still exists after every step was attempted.
    Incomplete,
}

impl EraseOutcome {
    pub fn is_success(self) -> bool {
        self == Self::Erased
    }
}

/// An OS-level secure-delete program.
pub trait DeleteUtility: Send + Sync {
    fn is_available(&self) -> bool;

    /// Run the utility against `path`. `Ok(true)` when it exits successfully.
    fn invoke(&self, path: &Path, passes: u32) -> io::Result<bool>;
}

/// GNU `shred` (or a compatible binary) invoked as `-f -u -z -n <passes>`.
pub struct ShredUtility {
    binary: String,
    available: OnceLock<bool>,
}

impl ShredUtility {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            available: OnceLock::new(),
        }
    }
}

impl DeleteUtility for ShredUtility {
    fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let found = Command::new(&self.binary)
                .arg("--version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|s| s.success())
                .unwrap_or(false);
            debug!(binary = %self.binary, found, "probed secure-delete utility");
            found
        })
    }

    fn invoke(&self, path: &Path, passes: u32) -> io::Result<bool> {
        let status = Command::new(&self.binary)
            .args(["-f", "-u", "-z", "-n"])
            .arg(passes.to_string())
            .arg("--")
            .arg(path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        Ok(status.success())
    }
}

/// Destroys file contents beyond casual forensic recovery, then removes the file.
pub struct SecureEraser {
    passes: u32,
    utility: Option<Box<dyn DeleteUtility>>,
    random: OverwriteRandom,
}

impl SecureEraser {
    /// Manual overwrite only, with `passes` passes (minimum 1).
    pub fn new(passes: u32) -> Self {
        Self {
            passes: passes.max(1),
            utility: None,
            random: OverwriteRandom::default(),
        }
    }

    /// Settings from configuration, including the delete utility if enabled.
    pub fn from_config(config: &MailConfig) -> Self {
        let eraser = Self::new(config.erasure_passes);
        if config.use_delete_utility {
            eraser.with_utility(ShredUtility::new(config.delete_utility.clone()))
        } else {
            eraser
        }
    }

    pub fn with_utility(mut self, utility: impl DeleteUtility + 'static) -> Self {
        self.utility = Some(Box::new(utility));
        self
    }

    pub fn with_random(mut self, source: impl RandomSource + 'static) -> Self {
        self.random = OverwriteRandom::new(source);
        self
    }

    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Erase a single path.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub fn erase(&self, path: &Path) -> EraseOutcome {
        let len_hint = match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => {
                warn!("refusing to erase a directory");
                return EraseOutcome::NotAFile;
            }
            Ok(meta) if !meta.is_file() => {
                warn!("refusing to erase a non-regular file");
                return EraseOutcome::NotAFile;
            }
            Ok(meta) => Some(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("nothing to erase");
                return EraseOutcome::NotFound;
            }
            Err(e) => {
                warn!(error = %e, "stat failed; erasing anyway");
                None
            }
        };

        if let Some(utility) = self.utility.as_ref().filter(|u| u.is_available()) {
            match utility.invoke(path, self.passes) {
                Ok(true) if !still_present(path) => {
                    debug!("erased by delete utility");
                    return EraseOutcome::Erased;
                }
                Ok(_) => warn!("delete utility left the file behind; overwriting manually"),
                Err(e) => warn!(error = %e, "delete utility could not run; overwriting manually"),
            }
        }

        self.overwrite_and_unlink(path, len_hint)
    }

    fn overwrite_and_unlink(&self, path: &Path, len_hint: Option<u64>) -> EraseOutcome {
        match open_for_overwrite(path) {
            Some(mut file) => {
                let len = file
                    .metadata()
                    .map(|m| m.len())
                    .ok()
                    .or(len_hint)
                    .unwrap_or(0);
                for pass in 1..=self.passes {
                    if let Err(e) = self.overwrite_pass(&mut file, len) {
                        warn!(pass, error = %e, "overwrite pass incomplete");
                    }
                }
                if let Err(e) = file.set_len(0) {
                    warn!(error = %e, "truncate failed");
                }
                if let Err(e) = file.sync_all() {
                    warn!(error = %e, "final sync failed");
                }
                debug!(len, passes = self.passes, "overwrite complete");
            }
            None => warn!("file is not writable; attempting unlink only"),
        }

        if let Err(e) = fs::remove_file(path) {
            warn!(error = %e, "unlink failed");
        }

        if still_present(path) {
            error!("erasure incomplete: path still exists");
            EraseOutcome::Incomplete
        } else {
            EraseOutcome::Erased
        }
    }

    fn overwrite_pass(&self, file: &mut File, len: u64) -> io::Result<()> {
        file.seek(SeekFrom::Start(0))?;
        let mut buf = vec![0u8; CHUNK];
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(CHUNK as u64) as usize;
            self.random.fill(&mut buf[..n]);
            file.write_all(&buf[..n])?;
            remaining -= n as u64;
        }
        file.sync_all()
    }
}

/// Open for writing, clearing a read-only flag first if needed.
fn open_for_overwrite(path: &Path) -> Option<File> {
    match OpenOptions::new().write(true).open(path) {
        Ok(file) => Some(file),
        Err(first) => {
            debug!(error = %first, "open for write failed; making writable");
            if let Err(e) = make_writable(path) {
                warn!(error = %e, "cannot make file writable");
                return None;
            }
            OpenOptions::new()
                .write(true)
                .open(path)
                .map_err(|e| warn!(error = %e, "reopen for write failed"))
                .ok()
        }
    }
}

#[cfg(unix)]
fn make_writable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn make_writable(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    perms.set_readonly(false);
    fs::set_permissions(path, perms)
}

/// True unless the path is definitely gone.
pub(crate) fn still_present(path: &Path) -> bool {
    match fs::symlink_metadata(path) {
        Ok(_) => true,
        Err(e) => e.kind() != io::ErrorKind::NotFound,
    }
}

/// Scan `dir` for entries whose name starts with `prefix` and log each one.
pub fn sweep(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "housekeeping sweep could not read directory");
            return Vec::new();
        }
    };

    let survivors: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(prefix))
        })
        .map(|entry| entry.path())
        .collect();

    for path in &survivors {
        warn!(path = %path.display(), "staging file present after erasure batch");
    }
    survivors
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Utility that claims success but never touches the file.
    struct LyingUtility {
        calls: Arc<AtomicU32>,
    }

    impl DeleteUtility for LyingUtility {
        fn is_available(&self) -> bool {
            true
        }

        fn invoke(&self, _path: &Path, _passes: u32) -> io::Result<bool> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }
    }

    struct MissingUtility;

    impl DeleteUtility for MissingUtility {
        fn is_available(&self) -> bool {
            false
        }

        fn invoke(&self, _path: &Path, _passes: u32) -> io::Result<bool> {
            panic!("unavailable utility must not be invoked");
        }
    }

    #[test]
    fn erases_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.txt");
        fs::write(&path, b"1 2 3 4 5 6").unwrap();

        let outcome = SecureEraser::new(3).erase(&path);
        assert_eq!(outcome, EraseOutcome::Erased);
        assert!(!path.exists());
    }

    #[test]
    fn missing_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = SecureEraser::new(1).erase(&dir.path().join("absent"));
        assert_eq!(outcome, EraseOutcome::NotFound);
        assert!(!outcome.is_success());
    }

    #[test]
    fn directory_is_rejected_and_kept() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("folder");
        fs::create_dir(&sub).unwrap();

        assert_eq!(SecureEraser::new(1).erase(&sub), EraseOutcome::NotAFile);
        assert!(sub.is_dir());
    }

    #[test]
    fn overwrite_pass_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret");
        let original = vec![b'A'; 200_000];
        fs::write(&path, &original).unwrap();

        let eraser = SecureEraser::new(1);
        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        eraser.overwrite_pass(&mut file, original.len() as u64).unwrap();
        drop(file);

        let after = fs::read(&path).unwrap();
        assert_eq!(after.len(), original.len());
        assert_ne!(after, original);
    }

    #[test]
    fn falls_back_when_utility_leaves_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stubborn");
        fs::write(&path, b"plaintext").unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let eraser = SecureEraser::new(2).with_utility(LyingUtility {
            calls: Arc::clone(&calls),
        });

        assert_eq!(eraser.erase(&path), EraseOutcome::Erased);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!path.exists());
    }

    #[test]
    fn unavailable_utility_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"x").unwrap();

        let eraser = SecureEraser::new(1).with_utility(MissingUtility);
        assert_eq!(eraser.erase(&path), EraseOutcome::Erased);
    }

    #[cfg(unix)]
    #[test]
    fn read_only_file_still_removed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro");
        fs::write(&path, b"locked").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o400)).unwrap();

        assert_eq!(SecureEraser::new(1).erase(&path), EraseOutcome::Erased);
        assert!(!path.exists());
    }

    struct NoEntropy;

    impl RandomSource for NoEntropy {
        fn try_fill(&self, _dest: &mut [u8]) -> Result<(), crate::random::SourceUnavailable> {
            Err(crate::random::SourceUnavailable)
        }
    }

    #[test]
    fn erases_without_secure_random() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("degraded");
        fs::write(&path, vec![b'Z'; 4096]).unwrap();

        let eraser = SecureEraser::new(2).with_random(NoEntropy);
        assert_eq!(eraser.erase(&path), EraseOutcome::Erased);
        assert!(eraser.random.is_degraded());
        assert!(!path.exists());
    }

    #[test]
    fn sweep_reports_prefixed_leftovers() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("mailseal-left"), b"x").unwrap();
        fs::write(dir.path().join("unrelated"), b"x").unwrap();

        let survivors = sweep(dir.path(), "mailseal-");
        assert_eq!(survivors, vec![dir.path().join("mailseal-left")]);
    }
}
