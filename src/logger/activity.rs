//! Activity logging off the async path.
//!
//! A dedicated `ssm-logger` thread owns the [`JsonlWriter`]. Monitor tasks hold a
//! cloneable [`ActivityLoggerHandle`] and hand events over a bounded crossbeam
//! channel with `try_send`, so a slow disk never stalls a poll or an evaluation.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{Result, SsmError};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

const CHANNEL_CAPACITY: usize = 256;

/// Something worth recording about the monitor's life.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityEvent {
    ConfigLoaded {
        version: String,
        config_hash: String,
    },
    MonitorStarted {
        artifact_id: Option<String>,
    },
    MonitorStopped {
        uptime_secs: u64,
    },
    ArtifactChanged {
        artifact_id: String,
        size_bytes: u64,
    },
    FreeSpaceQueryFailed {
        code: String,
        message: String,
    },
    StorageCheckFailed {
        artifact_id: String,
        code: String,
        message: String,
    },
    StatusChanged {
        artifact_id: String,
        is_ok: bool,
        message: String,
        size_bytes: u64,
    },
    /// Asks the logger thread to flush and exit.
    Shutdown,
}

/// Cheap cloneable sender side of the activity log.
#[derive(Debug, Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// A handle whose events go nowhere.
    #[must_use]
    pub fn disabled() -> Self {
        let (handle, rx) = Self::channel(1);
        drop(rx);
        handle
    }

    /// A handle plus the raw receiving end, for callers that consume events
    /// themselves instead of spawning the file logger.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, Receiver<ActivityEvent>) {
        let (tx, rx) = bounded(capacity.max(1));
        (
            Self {
                tx,
                dropped_events: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Queue an event without blocking. A full channel drops the event and
    /// bumps the dropped counter; a closed one drops it silently.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and stop. Blocks only while the channel is full.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

#[derive(Debug, Clone)]
pub struct ActivityLoggerConfig {
    pub jsonl_config: JsonlConfig,
    pub channel_capacity: usize,
}

impl Default for ActivityLoggerConfig {
    fn default() -> Self {
        Self {
            jsonl_config: JsonlConfig::default(),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

/// Start the logger thread. It runs until [`ActivityLoggerHandle::shutdown`]
/// or until every handle is dropped.
pub fn spawn_logger(
    config: ActivityLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (handle, rx) = ActivityLoggerHandle::channel(config.channel_capacity);
    let dropped = Arc::clone(&handle.dropped_events);
    let jsonl_config = config.jsonl_config;

    let join = thread::Builder::new()
        .name("ssm-logger".to_string())
        .spawn(move || run_logger(&rx, jsonl_config, &dropped))
        .map_err(|error| SsmError::Runtime {
            details: format!("failed to spawn logger thread: {error}"),
        })?;

    Ok((handle, join))
}

fn run_logger(rx: &Receiver<ActivityEvent>, jsonl_config: JsonlConfig, dropped: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(jsonl_config);

    while let Ok(event) = rx.recv() {
        let lost = dropped.swap(0, Ordering::Relaxed);
        if lost > 0 {
            let mut entry = LogEntry::new(EventType::EventsDropped, Severity::Warning);
            entry.details = Some(format!("{lost} activity events dropped under back-pressure"));
            jsonl.write_entry(&entry);
        }

        let shutting_down = event == ActivityEvent::Shutdown;
        jsonl.write_entry(&event_to_log_entry(&event));
        if shutting_down {
            break;
        }
    }

    jsonl.sync();
}

fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::ConfigLoaded {
            version,
            config_hash,
        } => {
            let mut e = LogEntry::new(EventType::ConfigLoad, Severity::Info);
            e.details = Some(format!("version={version} config_hash={config_hash}"));
            e
        }
        ActivityEvent::MonitorStarted { artifact_id } => {
            let mut e = LogEntry::new(EventType::MonitorStart, Severity::Info);
            e.artifact.clone_from(artifact_id);
            e
        }
        ActivityEvent::MonitorStopped { uptime_secs } => {
            let mut e = LogEntry::new(EventType::MonitorStop, Severity::Info);
            e.details = Some(format!("uptime={uptime_secs}s"));
            e
        }
        ActivityEvent::ArtifactChanged {
            artifact_id,
            size_bytes,
        } => {
            let mut e = LogEntry::new(EventType::ArtifactChange, Severity::Info);
            e.artifact = Some(artifact_id.clone());
            e.size = Some(*size_bytes);
            e
        }
        ActivityEvent::FreeSpaceQueryFailed { code, message } => {
            let mut e = LogEntry::new(EventType::FreeSpaceQueryFailure, Severity::Warning);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e
        }
        ActivityEvent::StorageCheckFailed {
            artifact_id,
            code,
            message,
        } => {
            let mut e = LogEntry::new(EventType::StorageCheckFailure, Severity::Warning);
            e.artifact = Some(artifact_id.clone());
            e.ok = Some(false);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e
        }
        ActivityEvent::StatusChanged {
            artifact_id,
            is_ok,
            message,
            size_bytes,
        } => {
            let severity = if *is_ok {
                Severity::Info
            } else {
                Severity::Critical
            };
            let mut e = LogEntry::new(EventType::StatusChange, severity);
            e.artifact = Some(artifact_id.clone());
            e.size = Some(*size_bytes);
            e.ok = Some(*is_ok);
            if !message.is_empty() {
                e.message = Some(message.clone());
            }
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::Shutdown, Severity::Info),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn config_in(dir: &Path) -> ActivityLoggerConfig {
        ActivityLoggerConfig {
            jsonl_config: JsonlConfig {
                path: dir.join("activity.jsonl"),
                fallback_path: None,
                max_size_bytes: 1024 * 1024,
                max_rotated_files: 2,
                fsync_interval_secs: 60,
            },
            channel_capacity: 64,
        }
    }

    fn events_in(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn logger_thread_writes_events_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let path = config.jsonl_config.path.clone();
        let (handle, join) = spawn_logger(config).unwrap();

        handle.send(ActivityEvent::MonitorStarted {
            artifact_id: Some("phi-2".to_string()),
        });
        handle.send(ActivityEvent::StatusChanged {
            artifact_id: "phi-2".to_string(),
            is_ok: false,
            message: "Storage low! Model 2 GB > 1 GB free".to_string(),
            size_bytes: 2_000_000_000,
        });
        handle.send(ActivityEvent::StorageCheckFailed {
            artifact_id: "phi-2".to_string(),
            code: "SSM-2001".to_string(),
            message: "statvfs failed".to_string(),
        });
        handle.shutdown();
        join.join().unwrap();

        let events = events_in(&path);
        let kinds: Vec<_> = events.iter().map(|e| e["event"].clone()).collect();
        assert_eq!(
            kinds,
            vec![
                "monitor_start",
                "status_change",
                "storage_check_failure",
                "shutdown"
            ]
        );
        assert_eq!(events[1]["severity"], "critical");
        assert_eq!(events[1]["size"], 2_000_000_000_u64);
        assert_eq!(events[2]["error_code"], "SSM-2001");
    }

    #[test]
    fn dropping_every_handle_stops_the_thread() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let path = config.jsonl_config.path.clone();
        let (handle, join) = spawn_logger(config).unwrap();
        let clone = handle.clone();
        std::thread::spawn(move || {
            clone.send(ActivityEvent::MonitorStopped { uptime_secs: 3 });
        })
        .join()
        .unwrap();
        drop(handle);
        join.join().unwrap();

        let events = events_in(&path);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["details"], "uptime=3s");
    }

    #[test]
    fn full_channel_counts_dropped_events() {
        let (handle, rx) = ActivityLoggerHandle::channel(1);
        handle.send(ActivityEvent::Shutdown);
        handle.send(ActivityEvent::Shutdown);
        handle.send(ActivityEvent::Shutdown);
        assert_eq!(handle.dropped_events(), 2);
        assert_eq!(rx.try_recv().unwrap(), ActivityEvent::Shutdown);
    }

    #[test]
    fn disabled_handle_swallows_events() {
        let handle = ActivityLoggerHandle::disabled();
        handle.send(ActivityEvent::MonitorStopped { uptime_secs: 1 });
        handle.shutdown();
        assert_eq!(handle.dropped_events(), 0);
    }

    #[test]
    fn ok_status_omits_empty_message() {
        let entry = event_to_log_entry(&ActivityEvent::StatusChanged {
            artifact_id: "a".to_string(),
            is_ok: true,
            message: String::new(),
            size_bytes: 1,
        });
        assert_eq!(entry.severity, Severity::Info);
        assert!(entry.message.is_none());
        assert_eq!(entry.ok, Some(true));
    }
}
