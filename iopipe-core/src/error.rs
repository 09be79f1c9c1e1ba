//! Error types for iopipe-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading a sync manifest or decoding its step list.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The manifest file did not exist.
    #[error("manifest not found at {path}")]
    NotFound { path: PathBuf },

    /// YAML parse error on load; includes the file path.
    #[error("failed to parse manifest at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The manifest's data map has no `steps` key.
    #[error("invalid (missing) map key from the manifest: <steps>")]
    MissingSteps,

    /// The steps document is not a list of steps.
    #[error("failed to decode steps: {0}")]
    Steps(#[from] serde_yaml::Error),

    /// A decoded step cannot be synchronized.
    #[error("invalid step at index {index}: {reason}")]
    InvalidStep { index: usize, reason: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ManifestError {
    ManifestError::Io {
        path: path.into(),
        source,
    }
}
