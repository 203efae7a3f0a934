//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use storage_sufficiency::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{Result, SsmError};
pub use crate::core::units::format_bytes;

// Platform
pub use crate::platform::pal::{FsStats, Platform, detect_platform};

// Logger
pub use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};

// Monitor
pub use crate::monitor::artifact::{Artifact, ArtifactOrigin};
pub use crate::monitor::free_space::{FreeSpaceProbe, PlatformFreeSpaceProbe, StorageMode};
pub use crate::monitor::status::{StatusPublisher, StorageStatus};
pub use crate::monitor::storage_check::StorageMonitor;
pub use crate::monitor::sufficiency::{FreeSpaceSufficiency, SufficiencyCheck};
