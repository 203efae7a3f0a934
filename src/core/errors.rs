//! SSM-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, SsmError>;

/// Top-level error type for the storage sufficiency monitor.
#[derive(Debug, Error)]
pub enum SsmError {
    #[error("[SSM-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[SSM-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[SSM-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[SSM-1101] unsupported platform: {details}")]
    UnsupportedPlatform { details: String },

    #[error("[SSM-2001] filesystem stats failure for {path}: {details}")]
    FsStats { path: PathBuf, details: String },

    #[error("[SSM-2002] invalid artifact description: {details}")]
    InvalidArtifact { details: String },

    #[error("[SSM-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[SSM-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[SSM-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl SsmError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "SSM-1001",
            Self::MissingConfig { .. } => "SSM-1002",
            Self::ConfigParse { .. } => "SSM-1003",
            Self::UnsupportedPlatform { .. } => "SSM-1101",
            Self::FsStats { .. } => "SSM-2001",
            Self::InvalidArtifact { .. } => "SSM-2002",
            Self::Serialization { .. } => "SSM-2101",
            Self::Io { .. } => "SSM-3002",
            Self::Runtime { .. } => "SSM-3900",
        }
    }

    /// Whether retrying (e.g. on the next poll tick) might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::FsStats { .. } | Self::Runtime { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for SsmError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for SsmError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}
