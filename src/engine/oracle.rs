//! Decides whether a cached digest can stand in for re-reading a file.

use crate::manifest::FileRecord;

/// Cached mtimes at or before this instant are never trusted
/// (1990-01-01T00:00:00Z).
pub const DEFAULT_SANITY_EPOCH: f64 = 631_152_000.0;

/// Current on-disk facts about a file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileStat {
    /// Size in bytes
    pub size: u64,
    /// Modification time in fractional seconds since the Unix epoch
    pub mtime: f64,
    /// Inode number, `0` where unavailable
    pub inode: u64,
}

/// Skip check applied to every file before hashing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkipOracle {
    sanity_epoch: f64,
}

impl Default for SkipOracle {
    fn default() -> Self {
        Self::new(DEFAULT_SANITY_EPOCH)
    }
}

impl SkipOracle {
    /// Create an oracle with a custom sanity epoch.
    #[must_use]
    pub fn new(sanity_epoch: f64) -> Self {
        Self { sanity_epoch }
    }

    /// The configured sanity epoch.
    #[must_use]
    pub fn sanity_epoch(&self) -> f64 {
        self.sanity_epoch
    }

    /// Whether `cached` may be reused for a file currently described by `current`.
    ///
    /// True only when a cached record exists, its mtime is later than the
    /// sanity epoch, and both size and mtime match exactly. Legacy records
    /// carry an mtime of zero and therefore always fail.
    #[must_use]
    pub fn can_skip(&self, current: &FileStat, cached: Option<&FileRecord>) -> bool {
        let Some(cached) = cached else {
            return false;
        };
        if cached.mtime <= self.sanity_epoch {
            return false;
        }
        #[allow(clippy::float_cmp)]
        let same_mtime = cached.mtime == current.mtime;
        cached.size == current.size && same_mtime
    }
}
