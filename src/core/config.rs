//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SsmError};
use crate::monitor::free_space::StorageMode;

/// Full SSM configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub sufficiency: SufficiencyConfig,
    pub paths: PathsConfig,
}

/// Timers and the observed volume for the two monitor loops.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Any path on the volume models are downloaded to.
    pub storage_path: PathBuf,
    pub storage_mode: StorageMode,
    /// Free-space poller period.
    pub poll_interval_ms: u64,
    /// Sufficiency evaluator period.
    pub evaluate_interval_ms: u64,
    /// Restart the evaluator whenever the poller publishes a different reading.
    pub restart_on_free_space_change: bool,
}

/// Knobs for the default free-space sufficiency predicate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct SufficiencyConfig {
    /// Extra bytes that must remain free on top of the artifact size.
    pub safety_margin_bytes: u64,
}

/// Filesystem paths used by ssm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub jsonl_log: PathBuf,
    pub jsonl_fallback: Option<PathBuf>,
}

impl MonitorConfig {
    #[must_use]
    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.poll_interval_ms)
    }

    #[must_use]
    pub fn evaluate_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.evaluate_interval_ms)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            storage_path: home_dir(),
            storage_mode: StorageMode::Important,
            poll_interval_ms: 5_000,
            evaluate_interval_ms: 30_000,
            restart_on_free_space_change: true,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home = home_dir();
        Self {
            config_file: home.join(".config").join("ssm").join("config.toml"),
            jsonl_log: home
                .join(".local")
                .join("share")
                .join("ssm")
                .join("activity.jsonl"),
            jsonl_fallback: Some(env::temp_dir().join("ssm-activity.jsonl")),
        }
    }
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[SSM-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| SsmError::Io {
                path: path_buf.clone(),
                source,
            })?;
            Self::from_toml_str(&raw)?
        } else if is_explicit_path {
            return Err(SsmError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document without touching the environment.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Deterministic hash of the effective config for the activity log.
    ///
    /// FNV-1a over the canonical JSON form, stable across processes.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("SSM_MONITOR_STORAGE_PATH") {
            self.monitor.storage_path = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("SSM_MONITOR_STORAGE_MODE") {
            self.monitor.storage_mode = raw.parse::<StorageMode>().map_err(|details| {
                SsmError::ConfigParse {
                    context: "env",
                    details: format!("SSM_MONITOR_STORAGE_MODE={raw:?}: {details}"),
                }
            })?;
        }
        if let Some(raw) = lookup("SSM_MONITOR_POLL_INTERVAL_MS") {
            self.monitor.poll_interval_ms = parse_env_u64("SSM_MONITOR_POLL_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = lookup("SSM_MONITOR_EVALUATE_INTERVAL_MS") {
            self.monitor.evaluate_interval_ms =
                parse_env_u64("SSM_MONITOR_EVALUATE_INTERVAL_MS", &raw)?;
        }
        if let Some(raw) = lookup("SSM_MONITOR_RESTART_ON_FREE_SPACE_CHANGE") {
            self.monitor.restart_on_free_space_change =
                parse_env_bool("SSM_MONITOR_RESTART_ON_FREE_SPACE_CHANGE", &raw)?;
        }
        if let Some(raw) = lookup("SSM_SUFFICIENCY_SAFETY_MARGIN_BYTES") {
            self.sufficiency.safety_margin_bytes =
                parse_env_u64("SSM_SUFFICIENCY_SAFETY_MARGIN_BYTES", &raw)?;
        }
        if let Some(raw) = lookup("SSM_PATHS_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.monitor.poll_interval_ms == 0 || self.monitor.evaluate_interval_ms == 0 {
            return Err(SsmError::InvalidConfig {
                details: "monitor.poll_interval_ms and monitor.evaluate_interval_ms must be > 0"
                    .to_string(),
            });
        }

        if self.monitor.evaluate_interval_ms < self.monitor.poll_interval_ms {
            return Err(SsmError::InvalidConfig {
                details: format!(
                    "monitor.evaluate_interval_ms ({}) must be >= monitor.poll_interval_ms ({})",
                    self.monitor.evaluate_interval_ms, self.monitor.poll_interval_ms
                ),
            });
        }

        if self.monitor.storage_path.as_os_str().is_empty() {
            return Err(SsmError::InvalidConfig {
                details: "monitor.storage_path must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.parse::<u64>().map_err(|error| SsmError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    raw.parse::<bool>().map_err(|error| SsmError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
