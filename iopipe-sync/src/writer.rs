//! Archive writer.
//!
//! Every [`ContentRecord`] becomes one artifact file under the step's output
//! root, named `id-<step>.<record name without extension>.gz`. The artifact
//! holds a single uncompressed tar member named after the record, mode `0644`,
//! sized to the record's byte length. The `.gz` suffix is kept for
//! compatibility with existing consumers.
//!
//! Records are written one after another. The first failure stops the batch:
//! later records are not written and the failure is returned on its own.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use iopipe_core::{ContentRecord, StepId};

use crate::cancel::Cancellation;
use crate::error::{io_err, join_err, SyncError};

/// Suffix of every artifact file name.
pub const ARTIFACT_SUFFIX: &str = "gz";
/// Permission bits recorded on the archive member.
pub const MEMBER_MODE: u32 = 0o644;

/// Persists a batch of records.
///
/// Returns the artifacts written, or the failure that stopped the batch.
#[async_trait]
pub trait ConfWriter: Send + Sync {
    async fn write(
        &self,
        cancel: &Cancellation,
        records: Vec<ContentRecord>,
    ) -> Result<Vec<PathBuf>, SyncError>;
}

// ---------------------------------------------------------------------------
// ArchiveWriter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ArchiveWriter {
    id: StepId,
    dest: PathBuf,
}

impl ArchiveWriter {
    pub fn new(id: StepId, dest: impl Into<PathBuf>) -> Self {
        Self {
            id,
            dest: dest.into(),
        }
    }
}

#[async_trait]
impl ConfWriter for ArchiveWriter {
    async fn write(
        &self,
        cancel: &Cancellation,
        records: Vec<ContentRecord>,
    ) -> Result<Vec<PathBuf>, SyncError> {
        tracing::info!(step = %self.id, items = records.len(), "received items");
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let writer = self.clone();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || writer.write_blocking(&cancel, &records))
            .await
            .map_err(|e| join_err("archive writer", e))?
    }
}

impl ArchiveWriter {
    fn write_blocking(
        &self,
        cancel: &Cancellation,
        records: &[ContentRecord],
    ) -> Result<Vec<PathBuf>, SyncError> {
        std::fs::create_dir_all(&self.dest).map_err(|e| io_err(&self.dest, e))?;

        let mut written = Vec::with_capacity(records.len());
        for record in records {
            if cancel.is_cancelled() {
                tracing::debug!(step = %self.id, "archive writes stopped by cancellation");
                break;
            }
            let path = artifact_path(&self.dest, &artifact_name(&self.id, &record.name))?;
            tracing::info!(step = %self.id, path = %path.display(), "creating artifact");
            write_archive(&path, record)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// `id-<step>.<name without extension>.gz`
pub fn artifact_name(id: &StepId, record_name: &str) -> String {
    format!(
        "id-{id}.{}.{ARTIFACT_SUFFIX}",
        strip_extension(record_name)
    )
}

/// Drop everything from the last `.` on; names without a `.` are unchanged.
fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) => &name[..idx],
        None => name,
    }
}

/// Absolute path of `name` under `dest`.
fn artifact_path(dest: &Path, name: &str) -> Result<PathBuf, SyncError> {
    let joined = dest.join(name);
    if joined.is_absolute() {
        return Ok(joined);
    }
    let cwd = std::env::current_dir().map_err(|e| io_err(&joined, e))?;
    Ok(cwd.join(joined))
}

fn write_archive(path: &Path, record: &ContentRecord) -> Result<(), SyncError> {
    let file = File::create(path).map_err(|e| io_err(path, e))?;
    let mut builder = tar::Builder::new(BufWriter::new(file));

    let mut header = tar::Header::new_ustar();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_mode(MEMBER_MODE);
    header.set_size(record.content.len() as u64);
    builder
        .append_data(&mut header, &record.name, record.content.as_slice())
        .map_err(|e| io_err(path, e))?;

    let mut out = builder.into_inner().map_err(|e| io_err(path, e))?;
    out.flush().map_err(|e| io_err(path, e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
