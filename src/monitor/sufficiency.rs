//! Space-sufficiency predicate: "is there enough free space for this artifact?"

#![allow(missing_docs)]

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::errors::{Result, SsmError};
use crate::monitor::artifact::Artifact;
use crate::monitor::free_space::{FreeSpaceProbe, StorageMode};

/// Asynchronous, possibly slow sufficiency check. Any margin or heuristic lives
/// behind this trait; the evaluator treats the answer as authoritative.
#[async_trait]
pub trait SufficiencyCheck: Send + Sync {
    async fn has_enough_space(&self, artifact: &Artifact) -> Result<bool>;
}

/// Default predicate: `size + margin <= free`, against a fresh probe reading.
#[derive(Clone)]
pub struct FreeSpaceSufficiency {
    probe: Arc<dyn FreeSpaceProbe>,
    mode: StorageMode,
    safety_margin_bytes: u64,
}

impl FreeSpaceSufficiency {
    #[must_use]
    pub fn new(probe: Arc<dyn FreeSpaceProbe>, mode: StorageMode, safety_margin_bytes: u64) -> Self {
        Self {
            probe,
            mode,
            safety_margin_bytes,
        }
    }
}

#[async_trait]
impl SufficiencyCheck for FreeSpaceSufficiency {
    async fn has_enough_space(&self, artifact: &Artifact) -> Result<bool> {
        if artifact.size == 0 {
            return Err(SsmError::InvalidArtifact {
                details: format!("artifact {:?} reports a size of zero bytes", artifact.id),
            });
        }
        let free = self.probe.query_free_disk_storage(self.mode).await?;
        Ok(artifact.size.saturating_add(self.safety_margin_bytes) <= free)
    }
}
