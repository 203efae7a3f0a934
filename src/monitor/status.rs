//! Status publisher: the observable state shared by the poller, the evaluator
//! and any number of readers.
//!
//! Two independent fields live here. `free_disk_storage` is written only by the
//! free-space poller and `storage_status` only by the sufficiency evaluator;
//! the writer handles are crate-private and handed out to those two loops.
//! Readers observe both through `tokio::sync::watch` receivers.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;

use crate::core::units::format_bytes;

/// Message published when the check itself could not complete.
pub const CHECK_FAILED_MESSAGE: &str = "Failed to check storage";

/// Ok/not-ok verdict plus a human-readable reason.
///
/// Invariant: `is_ok` implies an empty message; not-ok implies a non-empty one.
/// The constructors are the only way to build a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStatus {
    is_ok: bool,
    message: String,
}

impl Default for StorageStatus {
    fn default() -> Self {
        Self::ok()
    }
}

impl StorageStatus {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            is_ok: true,
            message: String::new(),
        }
    }

    /// Not enough room: `required_bytes` does not fit next to `free_bytes`.
    #[must_use]
    pub fn low(required_bytes: u64, free_bytes: u64) -> Self {
        Self {
            is_ok: false,
            message: format!(
                "Storage low! Model {} > {} free",
                format_bytes(required_bytes),
                format_bytes(free_bytes)
            ),
        }
    }

    #[must_use]
    pub fn check_failed() -> Self {
        Self {
            is_ok: false,
            message: CHECK_FAILED_MESSAGE.to_string(),
        }
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.is_ok
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Holder of the latest free-space reading and storage status.
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    free_disk_storage: Arc<watch::Sender<Option<u64>>>,
    storage_status: Arc<watch::Sender<StorageStatus>>,
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusPublisher {
    /// Fresh state: no reading yet, status ok.
    #[must_use]
    pub fn new() -> Self {
        let (free_tx, _) = watch::channel(None);
        let (status_tx, _) = watch::channel(StorageStatus::ok());
        Self {
            free_disk_storage: Arc::new(free_tx),
            storage_status: Arc::new(status_tx),
        }
    }

    /// Latest successful free-space reading, `None` before the first one.
    #[must_use]
    pub fn free_disk_storage(&self) -> Option<u64> {
        *self.free_disk_storage.borrow()
    }

    #[must_use]
    pub fn storage_status(&self) -> StorageStatus {
        self.storage_status.borrow().clone()
    }

    #[must_use]
    pub fn subscribe_free_disk_storage(&self) -> watch::Receiver<Option<u64>> {
        self.free_disk_storage.subscribe()
    }

    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<StorageStatus> {
        self.storage_status.subscribe()
    }

    pub(crate) fn free_space_writer(&self) -> FreeSpaceWriter {
        FreeSpaceWriter {
            tx: Arc::clone(&self.free_disk_storage),
        }
    }

    pub(crate) fn status_writer(&self) -> StatusWriter {
        StatusWriter {
            tx: Arc::clone(&self.storage_status),
        }
    }
}

/// Write access to `free_disk_storage`, held by the poller.
#[derive(Debug, Clone)]
pub(crate) struct FreeSpaceWriter {
    tx: Arc<watch::Sender<Option<u64>>>,
}

impl FreeSpaceWriter {
    /// Replace the reading. Every call notifies subscribers, even for an
    /// unchanged value.
    pub(crate) fn publish(&self, bytes: u64) {
        self.tx.send_replace(Some(bytes));
    }
}

/// Write access to `storage_status`, held by the evaluator.
#[derive(Debug, Clone)]
pub(crate) struct StatusWriter {
    tx: Arc<watch::Sender<StorageStatus>>,
}

impl StatusWriter {
    /// Replace the status. Returns whether it differed from the previous one;
    /// identical writes do not wake subscribers.
    pub(crate) fn publish(&self, status: StorageStatus) -> bool {
        self.tx.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        })
    }
}
