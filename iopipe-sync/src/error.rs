//! Error types for iopipe-sync.

use std::path::PathBuf;

use thiserror::Error;

use iopipe_core::CompositeError;

/// All errors that can arise from reading, archiving or orchestrating a sync.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Several independent failures folded into one message.
    #[error(transparent)]
    Composite(#[from] CompositeError),

    /// A pipeline task panicked or was aborted.
    #[error("{task} task join failure: {message}")]
    Join { task: &'static str, message: String },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn join_err(task: &'static str, err: tokio::task::JoinError) -> SyncError {
    SyncError::Join {
        task,
        message: err.to_string(),
    }
}
