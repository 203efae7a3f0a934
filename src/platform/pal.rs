//! PAL trait and platform-specific implementations of the free-space query.

#![allow(missing_docs)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SsmError};

/// Filesystem statistics for the volume holding a path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FsStats {
    pub total_bytes: u64,
    /// All free blocks, including the pool reserved for root.
    pub free_bytes: u64,
    /// Free blocks usable by an unprivileged writer.
    pub available_bytes: u64,
}

/// OS abstraction used by the free-space probe.
pub trait Platform: Send + Sync {
    fn fs_stats(&self, path: &Path) -> Result<FsStats>;
}

/// Linux platform implementation using `statvfs`.
#[derive(Debug, Default)]
pub struct LinuxPlatform;

impl LinuxPlatform {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
impl Platform for LinuxPlatform {
    fn fs_stats(&self, path: &Path) -> Result<FsStats> {
        let stat = nix::sys::statvfs::statvfs(path).map_err(|error| SsmError::FsStats {
            path: path.to_path_buf(),
            details: error.to_string(),
        })?;
        let fragment = stat.fragment_size();
        Ok(FsStats {
            total_bytes: stat.blocks().saturating_mul(fragment),
            free_bytes: stat.blocks_free().saturating_mul(fragment),
            available_bytes: stat.blocks_available().saturating_mul(fragment),
        })
    }
}

/// In-memory mock implementation for deterministic tests.
///
/// Stats are keyed by path prefix; the longest matching prefix wins. Values can
/// be replaced while a monitor is running.
#[derive(Debug, Default)]
pub struct MockPlatform {
    stats_by_prefix: RwLock<HashMap<PathBuf, FsStats>>,
}

impl MockPlatform {
    #[must_use]
    pub fn new(stats_by_prefix: HashMap<PathBuf, FsStats>) -> Self {
        Self {
            stats_by_prefix: RwLock::new(stats_by_prefix),
        }
    }

    /// Replace (or add) the stats reported for a prefix.
    pub fn set_stats(&self, prefix: impl Into<PathBuf>, stats: FsStats) {
        self.stats_by_prefix.write().insert(prefix.into(), stats);
    }

    /// Forget a prefix so queries under it fail.
    pub fn remove(&self, prefix: &Path) {
        self.stats_by_prefix.write().remove(prefix);
    }
}

impl Platform for MockPlatform {
    fn fs_stats(&self, path: &Path) -> Result<FsStats> {
        let stats = self.stats_by_prefix.read();
        stats
            .iter()
            .filter(|(prefix, _)| path.starts_with(prefix))
            .max_by_key(|(prefix, _)| prefix.as_os_str().len())
            .map(|(_, stats)| stats.clone())
            .ok_or_else(|| SsmError::FsStats {
                path: path.to_path_buf(),
                details: "mock stats not found".to_string(),
            })
    }
}

/// Detect active platform implementation.
pub fn detect_platform() -> Result<Arc<dyn Platform>> {
    #[cfg(unix)]
    {
        Ok(Arc::new(LinuxPlatform::new()))
    }
    #[cfg(not(unix))]
    {
        Err(SsmError::UnsupportedPlatform {
            details: "only statvfs-capable platforms are currently implemented".to_string(),
        })
    }
}
