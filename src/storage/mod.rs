//! Artifact store: hierarchical, per-job file storage behind opaque references.
//!
//! Every pipeline stage reads and writes bytes only through [`FileStore`],
//! addressed by [`StorageRef`] handles it previously returned. Callers never
//! interpret a ref's location except to pass it back into the store.

pub mod file_store;

pub use file_store::FileStore;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage mode '{0}' is not implemented")]
    UnsupportedMode(String),
}

/// Storage backend kind.
///
/// `S3` is an extension point: every [`FileStore`] operation rejects it with
/// [`StorageError::UnsupportedMode`] until a remote backend exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    Local,
    S3,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::S3 => "s3",
        }
    }
}

impl std::str::FromStr for StorageMode {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            other => Err(StorageError::UnsupportedMode(other.to_string())),
        }
    }
}

/// Opaque handle to a file or directory managed by the artifact store.
///
/// Locations are relative to the store's base directory and always use `/`
/// separators so refs written on one platform compare equal on another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRef {
    pub location: String,
    pub mode: StorageMode,
}

impl StorageRef {
    pub fn local(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            mode: StorageMode::Local,
        }
    }

    /// Separator- and whitespace-normalized location, for ref equality checks.
    pub fn canonical_location(&self) -> String {
        canonical_location(&self.location)
    }
}

/// Normalize a ref location for comparison: `\` becomes `/`, ends trimmed.
pub fn canonical_location(location: &str) -> String {
    location.replace('\\', "/").trim().to_string()
}
