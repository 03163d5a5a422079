// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Overwrite data for erasure passes.
//
// The OS CSPRNG (via `ring`) is the normal source. If it ever fails, passes
// continue with a seeded non-cryptographic generator so that erasure still
// happens; the degradation is logged once per source.

use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use ring::rand::{SecureRandom, SystemRandom};
use tracing::warn;

/// A source of unpredictable bytes that may be unavailable.
pub trait RandomSource: Send + Sync {
    /// Fill `dest` completely, or report that the source is unavailable.
    fn try_fill(&self, dest: &mut [u8]) -> Result<(), SourceUnavailable>;
}

/// The secure source could not produce bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceUnavailable;

/// The operating system CSPRNG.
pub struct OsRandom(SystemRandom);

impl Default for OsRandom {
    fn default() -> Self {
        Self(SystemRandom::new())
    }
}

impl RandomSource for OsRandom {
    fn try_fill(&self, dest: &mut [u8]) -> Result<(), SourceUnavailable> {
        self.0.fill(dest).map_err(|_| SourceUnavailable)
    }
}

/// Secure source with a non-cryptographic fallback.
pub struct OverwriteRandom {
    secure: Box<dyn RandomSource>,
    degraded: AtomicBool,
    fallback: Fallback,
}

impl Default for OverwriteRandom {
    fn default() -> Self {
        Self::new(OsRandom::default())
    }
}

impl OverwriteRandom {
    pub fn new(secure: impl RandomSource + 'static) -> Self {
        Self {
            secure: Box::new(secure),
            degraded: AtomicBool::new(false),
            fallback: Fallback::seeded(),
        }
    }

    /// Fill `dest`; never fails.
    pub fn fill(&self, dest: &mut [u8]) {
        if self.secure.try_fill(dest).is_ok() {
            return;
        }
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!("secure random source unavailable; erasure passes use a non-cryptographic generator");
        }
        self.fallback.fill(dest);
    }

    /// Whether the fallback generator has been used at least once.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }
}

/// splitmix64 stream seeded from the process's randomised hasher state.
struct Fallback {
    state: AtomicU64,
}

impl Fallback {
    fn seeded() -> Self {
        let mut hasher = RandomState::new().build_hasher();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        hasher.write_u128(nanos);
        hasher.write_u32(std::process::id());
        Self {
            state: AtomicU64::new(hasher.finish()),
        }
    }

    fn next(&self) -> u64 {
        let mut z = self
            .state
            .fetch_add(0x9E37_79B9_7F4A_7C15, Ordering::Relaxed)
            .wrapping_add(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    fn fill(&self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let word = self.next().to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
    }
}
