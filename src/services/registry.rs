//! Claim registry
//!
//! Process-wide set of canonical paths already accepted for delivery.
//! Uses DashMap's set for lock-free concurrent access; `insert` performs the
//! membership test and the insertion under one shard lock.

use dashmap::DashSet;
use std::path::{Path, PathBuf};

/// Paths claimed for delivery. Entries are never removed.
#[derive(Debug, Default)]
pub struct DedupRegistry {
    claimed: DashSet<PathBuf>,
}

impl DedupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `path` for delivery.
    ///
    /// Returns `true` for the first caller only; every later call for the
    /// same canonical path returns `false` without side effects.
    pub fn try_claim(&self, path: &Path) -> bool {
        self.claimed.insert(canonical_key(path))
    }

    /// Check whether `path` has been claimed
    pub fn is_claimed(&self, path: &Path) -> bool {
        self.claimed.contains(&canonical_key(path))
    }

    /// Number of claimed paths
    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}

/// Canonical identity of a candidate path.
///
/// Falls back to the absolute (non-resolved) form when the file is gone.
pub fn canonical_key(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
