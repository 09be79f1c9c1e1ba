//! Step orchestration: the synchronization entrypoint.
//!
//! Steps run strictly one after another. Inside a step:
//!
//! ```text
//! entry reads (one task each) ──read_tx──▶ aggregator ──bulk_tx──▶ write stage ──write_tx──▶ drain
//! ```
//!
//! `read_tx` closes once every entry task has finished, which is what lets the
//! aggregator emit its single batch. The drain logs failures and never
//! returns them: a pass "succeeds" even when records failed.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio::task::JoinSet;

use iopipe_core::{Directories, ResolvedStep, Step};

use crate::aggregate::{collect_as_bulk, BulkOutcome};
use crate::cancel::Cancellation;
use crate::error::{join_err, SyncError};
use crate::reader::{read_source, ReadOutcome};
use crate::writer::{ArchiveWriter, ConfWriter};

/// What reached the drain for one step.
#[derive(Debug)]
pub enum WriteOutcome {
    /// The batch was archived.
    Written(Vec<PathBuf>),
    /// An entry failed to read; carried through from the aggregator.
    ReadFailed(SyncError),
    /// Archiving stopped at the first failing record.
    WriteFailed(SyncError),
}

/// Synchronize `steps` using the default input/output roots.
pub async fn synchronize(cancel: &Cancellation, steps: &[Step]) -> Result<(), SyncError> {
    synchronize_with(cancel, &Directories::default(), steps).await
}

/// Synchronize `steps`, filling unset roots from `dirs`.
///
/// Record-level failures are logged, not returned. An `Err` means the pipeline
/// itself broke (a stage task panicked).
pub async fn synchronize_with(
    cancel: &Cancellation,
    dirs: &Directories,
    steps: &[Step],
) -> Result<(), SyncError> {
    tracing::info!(steps = steps.len(), "synchronization started");

    for step in steps {
        if cancel.is_cancelled() {
            tracing::warn!(step = %step.id, "synchronization cancelled, skipping remaining steps");
            break;
        }
        let step = step.resolve(dirs);
        let writer = ArchiveWriter::new(step.id.clone(), step.output_dir.clone());
        execute_step(cancel, &step, writer).await?;
    }

    tracing::info!("synchronization finished");
    Ok(())
}

/// Read every entry of `step` concurrently, merge the results and hand the
/// batch to `writer` once.
pub async fn execute_step<W>(
    cancel: &Cancellation,
    step: &ResolvedStep,
    writer: W,
) -> Result<(), SyncError>
where
    W: ConfWriter + 'static,
{
    tracing::info!(
        step = %step.id,
        entries = step.configs.len(),
        input = %step.input_dir.display(),
        output = %step.output_dir.display(),
        "executing step",
    );

    let (read_tx, read_rx) = mpsc::channel::<ReadOutcome>(1);
    let (bulk_tx, bulk_rx) = mpsc::channel::<BulkOutcome>(1);
    let (write_tx, mut write_rx) = mpsc::channel::<WriteOutcome>(1);

    let aggregator = tokio::spawn(collect_as_bulk(cancel.clone(), read_rx, bulk_tx));
    let write_stage = tokio::spawn(write_configs(cancel.clone(), writer, bulk_rx, write_tx));

    let mut readers = JoinSet::new();
    if !cancel.is_cancelled() {
        for (component, relative) in &step.configs {
            let path = step.source_path(component, relative);
            let cancel = cancel.clone();
            let read_tx = read_tx.clone();
            readers.spawn(read_entry(cancel, path, read_tx));
        }
    }
    drop(read_tx);

    while let Some(joined) = readers.join_next().await {
        joined.map_err(|e| join_err("reader", e))?;
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(step = %step.id, "drain stopped by cancellation");
                break;
            }
            outcome = write_rx.recv() => {
                let Some(outcome) = outcome else { break };
                log_outcome(step, outcome);
            }
        }
    }
    drop(write_rx);

    aggregator.await.map_err(|e| join_err("aggregator", e))?;
    write_stage.await.map_err(|e| join_err("writer", e))?;
    Ok(())
}

async fn read_entry(cancel: Cancellation, path: PathBuf, read_tx: mpsc::Sender<ReadOutcome>) {
    let outcome = tokio::select! {
        _ = cancel.cancelled() => return,
        outcome = read_source(&path, &cancel) => outcome,
    };
    let _ = read_tx.send(outcome).await;
}

/// Forward carried read failures, then archive the batch.
async fn write_configs<W: ConfWriter>(
    cancel: Cancellation,
    writer: W,
    mut bulk_rx: mpsc::Receiver<BulkOutcome>,
    write_tx: mpsc::Sender<WriteOutcome>,
) {
    loop {
        let bulk = tokio::select! {
            _ = cancel.cancelled() => return,
            bulk = bulk_rx.recv() => match bulk {
                Some(bulk) => bulk,
                None => return,
            },
        };

        for failure in bulk.failures {
            if write_tx.send(WriteOutcome::ReadFailed(failure)).await.is_err() {
                return;
            }
        }

        let outcome = match writer.write(&cancel, bulk.records).await {
            Ok(paths) => WriteOutcome::Written(paths),
            Err(err) => WriteOutcome::WriteFailed(err),
        };
        if write_tx.send(outcome).await.is_err() {
            return;
        }
    }
}

fn log_outcome(step: &ResolvedStep, outcome: WriteOutcome) {
    match outcome {
        WriteOutcome::Written(paths) => {
            tracing::info!(step = %step.id, artifacts = paths.len(), "step written");
        }
        WriteOutcome::ReadFailed(err) => {
            tracing::error!(step = %step.id, error = %err, "read failed");
        }
        WriteOutcome::WriteFailed(err) => {
            tracing::error!(step = %step.id, error = %err, "write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::fs;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use iopipe_core::ContentRecord;
    use tempfile::TempDir;

    use super::*;
    use crate::cancel::cancellation;

    /// Captures every batch handed to it.
    #[derive(Clone, Default)]
    struct RecordingWriter {
        batches: Arc<Mutex<Vec<Vec<ContentRecord>>>>,
    }

    #[async_trait]
    impl ConfWriter for RecordingWriter {
        async fn write(
            &self,
            _cancel: &Cancellation,
            records: Vec<ContentRecord>,
        ) -> Result<Vec<PathBuf>, SyncError> {
            self.batches.lock().unwrap().push(records);
            Ok(Vec::new())
        }
    }

    fn fixture() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let d1 = tmp.path().join("dir1").join("01");
        let d2 = tmp.path().join("dir2").join("01");
        fs::create_dir_all(&d1).unwrap();
        fs::create_dir_all(&d2).unwrap();
        fs::write(d1.join("infile-1.1.txt"), "1.1").unwrap();
        fs::write(d1.join("infile-1.2.txt"), "1.2").unwrap();
        fs::write(d2.join("infile-2.1.txt"), "2.1").unwrap();
        tmp
    }

    #[tokio::test]
    async fn writer_receives_one_batch_with_every_entry_record() {
        let input = fixture();
        let step = Step::new("s1")
            .with_config("dir1", "01")
            .with_config("dir2", "01")
            .with_config("missing", "nothing-here")
            .resolve(&Directories::new(input.path(), "/unused"));
        let writer = RecordingWriter::default();

        execute_step(&Cancellation::never(), &step, writer.clone())
            .await
            .expect("execute");

        let batches = writer.batches.lock().unwrap();
        assert_eq!(batches.len(), 1, "writer must be invoked exactly once");
        let names: HashSet<_> = batches[0].iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            HashSet::from(["infile-1.1.txt", "infile-1.2.txt", "infile-2.1.txt"])
        );
    }

    #[tokio::test]
    async fn cancelled_step_skips_fan_out() {
        let input = fixture();
        let step = Step::new("s1")
            .with_config("dir1", "01")
            .resolve(&Directories::new(input.path(), "/unused"));
        let writer = RecordingWriter::default();
        let (handle, token) = cancellation();
        handle.cancel();

        execute_step(&token, &step, writer.clone())
            .await
            .expect("execute");

        let batches = writer.batches.lock().unwrap();
        assert!(batches.iter().all(|b| b.is_empty()));
    }

    #[tokio::test]
    async fn carried_read_failures_are_forwarded_before_the_write() {
        let (bulk_tx, bulk_rx) = mpsc::channel::<BulkOutcome>(1);
        let (write_tx, mut write_rx) = mpsc::channel::<WriteOutcome>(1);
        let writer = RecordingWriter::default();
        let stage = tokio::spawn(write_configs(
            Cancellation::never(),
            writer.clone(),
            bulk_rx,
            write_tx,
        ));

        let bulk = BulkOutcome {
            records: vec![
                ContentRecord::new("a.txt", "hello"),
                ContentRecord::new("b.txt", "world"),
            ],
            failures: vec![
                SyncError::from(iopipe_core::CompositeError::new("entry one")),
                SyncError::from(iopipe_core::CompositeError::new("entry two")),
            ],
        };
        bulk_tx.send(bulk).await.expect("send bulk");
        drop(bulk_tx);

        let mut seen = Vec::new();
        while let Some(outcome) = write_rx.recv().await {
            seen.push(outcome);
        }
        stage.await.expect("write stage");

        assert_eq!(seen.len(), 3, "got: {seen:?}");
        let failed: Vec<String> = seen[..2]
            .iter()
            .map(|outcome| match outcome {
                WriteOutcome::ReadFailed(err) => err.to_string(),
                other => panic!("expected ReadFailed, got {other:?}"),
            })
            .collect();
        assert_eq!(failed, vec!["entry one", "entry two"]);
        assert!(matches!(seen[2], WriteOutcome::Written(_)), "got: {:?}", seen[2]);

        let batches = writer.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
    }

    #[tokio::test]
    async fn step_without_entries_completes() {
        let step = Step::new("empty").resolve(&Directories::new("/unused-in", "/unused-out"));
        let writer = RecordingWriter::default();
        execute_step(&Cancellation::never(), &step, writer.clone())
            .await
            .expect("execute");
        let batches = writer.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].is_empty());
    }
}
