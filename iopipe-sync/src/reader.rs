//! Source readers.
//!
//! A resolved source path is either a single file or a directory; the
//! matching [`FileConfReader`] variant is picked by stat-ing the path.
//!
//! - [`SingleFileReader`] yields one record named after the file.
//! - [`DirectoryReader`] lists the immediate non-directory entries and reads
//!   each one on its own task. Per-file failures are composed into one
//!   failure; records that did read are still returned.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::mpsc;

use iopipe_core::{compose, CompositeError, ContentRecord};

use crate::cancel::Cancellation;
use crate::error::{io_err, SyncError};

// ---------------------------------------------------------------------------
// Read outcome
// ---------------------------------------------------------------------------

/// What a reader produced: every record it could read, plus the failure (if
/// any) for what it could not.
#[derive(Debug, Default)]
pub struct ReadOutcome {
    pub records: Vec<ContentRecord>,
    pub failure: Option<SyncError>,
}

impl ReadOutcome {
    pub fn ok(records: Vec<ContentRecord>) -> Self {
        Self {
            records,
            failure: None,
        }
    }

    pub fn failed(failure: SyncError) -> Self {
        Self {
            records: Vec::new(),
            failure: Some(failure),
        }
    }
}

/// Reads configuration content from a source.
#[async_trait]
pub trait ConfReader: Send + Sync {
    async fn read(&self, cancel: &Cancellation) -> ReadOutcome;
}

// ---------------------------------------------------------------------------
// FileConfReader
// ---------------------------------------------------------------------------

/// Filesystem reader selected by what the source path turns out to be.
#[derive(Debug, Clone)]
pub enum FileConfReader {
    File(SingleFileReader),
    Directory(DirectoryReader),
}

impl FileConfReader {
    /// Stat `path` and pick the matching variant.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, SyncError> {
        let path = path.into();
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| io_err(&path, e))?;
        if meta.is_dir() {
            Ok(Self::Directory(DirectoryReader::new(path)))
        } else {
            Ok(Self::File(SingleFileReader::new(path)))
        }
    }
}

#[async_trait]
impl ConfReader for FileConfReader {
    async fn read(&self, cancel: &Cancellation) -> ReadOutcome {
        match self {
            Self::File(reader) => reader.read(cancel).await,
            Self::Directory(reader) => reader.read(cancel).await,
        }
    }
}

/// Open and read `path`; a failed stat becomes the outcome's failure.
pub async fn read_source(path: &Path, cancel: &Cancellation) -> ReadOutcome {
    match FileConfReader::open(path).await {
        Ok(reader) => reader.read(cancel).await,
        Err(err) => ReadOutcome::failed(err),
    }
}

// ---------------------------------------------------------------------------
// Single file
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SingleFileReader {
    path: PathBuf,
}

impl SingleFileReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfReader for SingleFileReader {
    async fn read(&self, _cancel: &Cancellation) -> ReadOutcome {
        let name = base_name(&self.path);
        tracing::info!(file = %name, "file to read");

        match tokio::fs::read(&self.path).await {
            Ok(content) => ReadOutcome::ok(vec![ContentRecord::new(name, content)]),
            Err(e) => ReadOutcome::failed(io_err(&self.path, e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DirectoryReader {
    path: PathBuf,
}

struct FileRead {
    name: String,
    result: Result<Vec<u8>, SyncError>,
}

impl DirectoryReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ConfReader for DirectoryReader {
    async fn read(&self, cancel: &Cancellation) -> ReadOutcome {
        let files = match scan_for_files(&self.path).await {
            Ok(files) => files,
            Err(err) => return ReadOutcome::failed(err),
        };
        tracing::info!(dir = %self.path.display(), files = ?files, "files to read");

        let expected = files.len();
        let (tx, mut rx) = mpsc::channel::<FileRead>(1);

        for path in files {
            if cancel.is_cancelled() {
                break;
            }
            let tx = tx.clone();
            let cancel = cancel.clone();
            let name = base_name(&path);
            tokio::spawn(async move {
                if cancel.is_cancelled() {
                    return;
                }
                let result = tokio::select! {
                    _ = cancel.cancelled() => return,
                    read = tokio::fs::read(&path) => read.map_err(|e| io_err(&path, e)),
                };
                let _ = tx.send(FileRead { name, result }).await;
            });
        }
        // Tasks dropped by cancellation close the channel instead of sending.
        drop(tx);

        let mut records = Vec::with_capacity(expected);
        let mut failure: Option<CompositeError> = None;
        let mut received = 0usize;

        while received < expected {
            let Some(read) = rx.recv().await else { break };
            received += 1;
            match read.result {
                Ok(content) => records.push(ContentRecord::new(read.name, content)),
                Err(err) => failure = compose(failure, [Some(err)]),
            }
        }

        if received < expected {
            tracing::debug!(
                dir = %self.path.display(),
                missing = expected - received,
                "directory read cut short by cancellation",
            );
        }

        ReadOutcome {
            records,
            failure: failure.map(SyncError::from),
        }
    }
}

/// Paths of the immediate non-directory entries of `dir`, sorted.
async fn scan_for_files(dir: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| io_err(dir, e))?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(dir, e))? {
        let ty = entry
            .file_type()
            .await
            .map_err(|e| io_err(entry.path(), e))?;
        if ty.is_dir() {
            continue;
        }
        files.push(entry.path());
    }
    files.sort();
    Ok(files)
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
