//! Free-space query seam: the async probe both monitor loops call.

#![allow(missing_docs)]

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SsmError};
use crate::platform::pal::{FsStats, Platform};

/// Which free-space figure a query reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Space an unprivileged writer can actually use (`f_bavail`).
    #[default]
    Important,
    /// Every free block, including the root-reserved pool (`f_bfree`).
    IncludeReserved,
}

impl StorageMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Important => "important",
            Self::IncludeReserved => "include_reserved",
        }
    }

    /// Pick this mode's figure out of a stats snapshot.
    #[must_use]
    pub const fn bytes_from(self, stats: &FsStats) -> u64 {
        match self {
            Self::Important => stats.available_bytes,
            Self::IncludeReserved => stats.free_bytes,
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageMode {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "important" => Ok(Self::Important),
            "include_reserved" => Ok(Self::IncludeReserved),
            other => Err(format!(
                "unknown storage mode {other:?} (expected important or include_reserved)"
            )),
        }
    }
}

/// Asynchronous free-space query. May fail with an I/O-class error.
#[async_trait]
pub trait FreeSpaceProbe: Send + Sync {
    async fn query_free_disk_storage(&self, mode: StorageMode) -> Result<u64>;
}

/// Probe backed by a [`Platform`] stats call on a fixed path.
///
/// The blocking `statvfs` runs on tokio's blocking pool.
#[derive(Clone)]
pub struct PlatformFreeSpaceProbe {
    platform: Arc<dyn Platform>,
    path: PathBuf,
}

impl PlatformFreeSpaceProbe {
    #[must_use]
    pub fn new(platform: Arc<dyn Platform>, path: impl Into<PathBuf>) -> Self {
        Self {
            platform,
            path: path.into(),
        }
    }
}

#[async_trait]
impl FreeSpaceProbe for PlatformFreeSpaceProbe {
    async fn query_free_disk_storage(&self, mode: StorageMode) -> Result<u64> {
        let platform = Arc::clone(&self.platform);
        let path = self.path.clone();
        let stats = tokio::task::spawn_blocking(move || platform.fs_stats(&path))
            .await
            .map_err(|error| SsmError::Runtime {
                details: format!("free-space query task failed: {error}"),
            })??;
        Ok(mode.bytes_from(&stats))
    }
}
