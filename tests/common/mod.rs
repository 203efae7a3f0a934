#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use storage_sufficiency::core::errors::{Result, SsmError};
use storage_sufficiency::monitor::artifact::Artifact;
use storage_sufficiency::monitor::free_space::{FreeSpaceProbe, StorageMode};
use storage_sufficiency::monitor::sufficiency::SufficiencyCheck;

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Some(path) = option_env!("CARGO_BIN_EXE_ssm") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "ssm.exe" } else { "ssm" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve ssm binary path for integration test"),
    }
}

/// Run the `ssm` binary with `home` as `$HOME`, so no user config leaks in.
/// Output is also saved under the temp dir for post-mortem reading.
pub fn run_cli_case(case_name: &str, home: &Path, args: &[&str]) -> CmdResult {
    let root = std::env::temp_dir().join("ssm-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let output = Command::new(&bin_path)
        .args(args)
        .env("HOME", home)
        .env_remove("SSM_OUTPUT_FORMAT")
        .env("RUST_BACKTRACE", "1")
        .output()
        .expect("execute ssm command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let log_content = format!(
        "case={case_name}\nbin={}\nargs={args:?}\nstatus={}\n----- stdout -----\n{stdout}\n----- stderr -----\n{stderr}\n",
        bin_path.display(),
        output.status,
    );
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

fn injected_failure() -> SsmError {
    SsmError::FsStats {
        path: PathBuf::from("/injected"),
        details: "injected failure".to_string(),
    }
}

/// Free-space probe whose reading the test moves by hand. `None` fails.
pub struct ManualProbe {
    free: Mutex<Option<u64>>,
    calls: AtomicUsize,
}

impl ManualProbe {
    pub fn new(free: Option<u64>) -> Self {
        Self {
            free: Mutex::new(free),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, free: Option<u64>) {
        *self.free.lock() = free;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FreeSpaceProbe for ManualProbe {
    async fn query_free_disk_storage(&self, _mode: StorageMode) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (*self.free.lock()).ok_or_else(injected_failure)
    }
}

/// Predicate resolving after a configurable delay. `None` fails.
pub struct SlowCheck {
    answer: Mutex<Option<bool>>,
    delay: Mutex<Duration>,
    calls: AtomicUsize,
}

impl SlowCheck {
    pub fn new(answer: Option<bool>, delay: Duration) -> Self {
        Self {
            answer: Mutex::new(answer),
            delay: Mutex::new(delay),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, answer: Option<bool>, delay: Duration) {
        *self.answer.lock() = answer;
        *self.delay.lock() = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SufficiencyCheck for SlowCheck {
    async fn has_enough_space(&self, _artifact: &Artifact) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answer = *self.answer.lock();
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        answer.ok_or_else(injected_failure)
    }
}
