//! Description of a downloadable model artifact, as supplied by the caller.

#![allow(missing_docs)]

use serde::{Deserialize, Serialize};

/// Where an artifact comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactOrigin {
    /// Shipped catalogue entry, downloaded on demand.
    #[default]
    Preset,
    /// Imported from the device itself; never downloaded.
    Local,
    /// Pulled from the Hugging Face hub.
    #[serde(alias = "hf")]
    HuggingFace,
}

/// A downloadable resource with a known size and locality metadata.
///
/// Read-only to the monitor; a changed description is handed over through
/// [`crate::monitor::storage_check::StorageMonitor::set_artifact`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Required bytes on disk.
    pub size: u64,
    #[serde(default, alias = "isDownloaded")]
    pub is_downloaded: bool,
    #[serde(default, alias = "isLocal")]
    pub is_local: bool,
    #[serde(default)]
    pub origin: ArtifactOrigin,
}

impl Artifact {
    #[must_use]
    pub fn new(id: impl Into<String>, size: u64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            size,
            is_downloaded: false,
            is_local: false,
            origin: ArtifactOrigin::Preset,
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: ArtifactOrigin) -> Self {
        self.origin = origin;
        self
    }

    #[must_use]
    pub fn downloaded(mut self) -> Self {
        self.is_downloaded = true;
        self
    }

    #[must_use]
    pub fn local(mut self) -> Self {
        self.is_local = true;
        self
    }

    /// Whether the artifact already occupies (or never needs) local storage.
    ///
    /// Such artifacts are never checked for space.
    #[must_use]
    pub fn is_on_device(&self) -> bool {
        self.is_downloaded || self.is_local || self.origin == ArtifactOrigin::Local
    }
}
