//! Activity log file: one JSON object per line, append-only.
//!
//! Lines are serialized in full before they touch the file, so a concurrent
//! `tail -f` never sees half a record. When the configured file cannot be
//! written the sink steps down: fallback file, then stderr, then nothing.
//! Logging problems are reported once on stderr and never reach the monitor.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SsmError};

const BUFFER_CAPACITY: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ConfigLoad,
    MonitorStart,
    MonitorStop,
    ArtifactChange,
    FreeSpaceQueryFailure,
    StorageCheckFailure,
    StatusChange,
    EventsDropped,
    Shutdown,
}

/// One line of the activity log. Only `ts`, `event` and `severity` are always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC timestamp with millisecond precision.
    pub ts: String,
    pub event: EventType,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    /// Artifact size in bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    pub fn new(event: EventType, severity: Severity) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            event,
            severity,
            artifact: None,
            size: None,
            ok: None,
            message: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }
}

/// Where lines currently go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Primary,
    Fallback,
    Stderr,
    Discard,
}

impl SinkState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
            Self::Stderr => "stderr",
            Self::Discard => "discard",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    /// Second file tried when `path` cannot be opened or written.
    pub fallback_path: Option<PathBuf>,
    /// Size at which the active file is rotated. Default: 10 MiB.
    pub max_size_bytes: u64,
    /// Rotated generations kept next to the active file. Default: 3.
    pub max_rotated_files: u32,
    /// Minimum seconds between `sync_data` calls. Default: 5.
    pub fsync_interval_secs: u64,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            path: std::env::temp_dir().join("ssm").join("activity.jsonl"),
            fallback_path: None,
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
            fsync_interval_secs: 5,
        }
    }
}

struct OpenFile {
    path: PathBuf,
    out: BufWriter<File>,
    size: u64,
}

/// Rotating JSONL file writer with a fallback chain.
pub struct JsonlWriter {
    config: JsonlConfig,
    file: Option<OpenFile>,
    state: SinkState,
    entries_written: u64,
    last_sync: Instant,
}

impl JsonlWriter {
    /// Open the primary file, stepping down the chain if that fails. Never errors.
    pub fn open(config: JsonlConfig) -> Self {
        let mut writer = Self {
            config,
            file: None,
            state: SinkState::Discard,
            entries_written: 0,
            last_sync: Instant::now(),
        };
        match open_append(&writer.config.path) {
            Ok((out, size)) => {
                writer.file = Some(OpenFile {
                    path: writer.config.path.clone(),
                    out,
                    size,
                });
                writer.state = SinkState::Primary;
            }
            Err(error) => {
                eprintln!("[SSM-JSONL] cannot open activity log: {error}");
                writer.open_fallback();
            }
        }
        writer
    }

    pub fn write_entry(&mut self, entry: &LogEntry) {
        let mut line = match serde_json::to_string(entry) {
            Ok(json) => json,
            Err(error) => {
                eprintln!("[SSM-JSONL] cannot serialize entry: {error}");
                return;
            }
        };
        line.push('\n');
        self.write_line(&line);
    }

    /// Flush buffered lines. A failure steps the sink down the chain.
    pub fn flush(&mut self) {
        let failed = self.file.as_mut().and_then(|file| file.out.flush().err());
        if let Some(error) = failed {
            self.flush_failed(&error);
        }
    }

    /// Flush and `sync_data` the active file.
    pub fn sync(&mut self) {
        let failed = self.file.as_mut().and_then(|file| {
            file.out
                .flush()
                .and_then(|()| file.out.get_ref().sync_data())
                .err()
        });
        if let Some(error) = failed {
            self.flush_failed(&error);
        }
        self.last_sync = Instant::now();
    }

    #[must_use]
    pub fn state(&self) -> SinkState {
        self.state
    }

    /// Lines accepted by a file or stderr since opening.
    #[must_use]
    pub fn entries_written(&self) -> u64 {
        self.entries_written
    }

    fn write_line(&mut self, line: &str) {
        loop {
            match self.state {
                SinkState::Primary | SinkState::Fallback => {
                    let len = line.len() as u64;
                    if self
                        .file
                        .as_ref()
                        .is_some_and(|f| f.size > 0 && f.size + len > self.config.max_size_bytes)
                    {
                        self.rotate();
                        continue;
                    }
                    let Some(file) = self.file.as_mut() else {
                        self.step_down();
                        continue;
                    };
                    if file.out.write_all(line.as_bytes()).is_err() {
                        self.step_down();
                        continue;
                    }
                    file.size += len;
                    self.entries_written += 1;
                    if self.last_sync.elapsed().as_secs() >= self.config.fsync_interval_secs {
                        self.sync();
                    }
                    return;
                }
                SinkState::Stderr => {
                    let _ = write!(io::stderr(), "[SSM-JSONL] {line}");
                    self.entries_written += 1;
                    return;
                }
                SinkState::Discard => return,
            }
        }
    }

    fn flush_failed(&mut self, error: &io::Error) {
        eprintln!("[SSM-JSONL] {} log flush failed: {error}", self.state.as_str());
        self.step_down();
    }

    /// Move one level down the chain.
    fn step_down(&mut self) {
        self.file = None;
        match self.state {
            SinkState::Primary => self.open_fallback(),
            SinkState::Fallback => {
                eprintln!("[SSM-JSONL] fallback log failed, writing activity to stderr");
                self.state = SinkState::Stderr;
            }
            SinkState::Stderr | SinkState::Discard => self.state = SinkState::Discard,
        }
    }

    fn open_fallback(&mut self) {
        if let Some(path) = self.config.fallback_path.clone() {
            match open_append(&path) {
                Ok((out, size)) => {
                    eprintln!("[SSM-JSONL] using fallback log {}", path.display());
                    self.file = Some(OpenFile { path, out, size });
                    self.state = SinkState::Fallback;
                    return;
                }
                Err(error) => eprintln!("[SSM-JSONL] fallback log unusable: {error}"),
            }
        }
        eprintln!("[SSM-JSONL] writing activity to stderr");
        self.state = SinkState::Stderr;
    }

    /// Shift `log.N` to `log.N+1` (dropping the oldest) and start a fresh file.
    fn rotate(&mut self) {
        let Some(mut current) = self.file.take() else {
            return;
        };
        let _ = current.out.flush();
        let base = current.path.clone();
        drop(current);

        let keep = self.config.max_rotated_files;
        if keep == 0 {
            let _ = fs::remove_file(&base);
        } else {
            let _ = fs::remove_file(rotated_name(&base, keep));
            for generation in (1..keep).rev() {
                let _ = fs::rename(
                    rotated_name(&base, generation),
                    rotated_name(&base, generation + 1),
                );
            }
            let _ = fs::rename(&base, rotated_name(&base, 1));
        }

        match open_append(&base) {
            Ok((out, size)) => {
                self.file = Some(OpenFile {
                    path: base,
                    out,
                    size,
                });
            }
            Err(error) => {
                eprintln!("[SSM-JSONL] cannot reopen after rotation: {error}");
                self.step_down();
            }
        }
    }
}

impl Drop for JsonlWriter {
    fn drop(&mut self) {
        if let Some(file) = self.file.as_mut()
            && let Err(error) = file.out.flush()
        {
            eprintln!("[SSM-JSONL] final flush failed: {error}");
        }
    }
}

fn open_append(path: &Path) -> Result<(BufWriter<File>, u64)> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| SsmError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SsmError::io(path, source))?;
    let size = file.metadata().map_or(0, |meta| meta.len());
    Ok((BufWriter::with_capacity(BUFFER_CAPACITY, file), size))
}

/// `activity.jsonl` + 2 -> `activity.jsonl.2`.
fn rotated_name(base: &Path, generation: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}
