//! Fan-in of per-entry read outcomes into one step-level batch.

use tokio::sync::mpsc;

use iopipe_core::ContentRecord;

use crate::cancel::Cancellation;
use crate::error::SyncError;
use crate::reader::ReadOutcome;

/// Every record read for a step, in arrival order.
///
/// Entry failures ride along unmerged so the write stage can report each one.
#[derive(Debug, Default)]
pub struct BulkOutcome {
    pub records: Vec<ContentRecord>,
    pub failures: Vec<SyncError>,
}

/// Consume `read_rx` until it closes, then send exactly one [`BulkOutcome`].
///
/// Cancellation stops consuming early; whatever was collected is still sent.
pub async fn collect_as_bulk(
    cancel: Cancellation,
    mut read_rx: mpsc::Receiver<ReadOutcome>,
    bulk_tx: mpsc::Sender<BulkOutcome>,
) {
    let mut bulk = BulkOutcome::default();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = read_rx.recv() => {
                let Some(outcome) = outcome else { break };
                bulk.records.extend(outcome.records);
                bulk.failures.extend(outcome.failure);
            }
        }
    }
    // Unblock readers still trying to send after a cancel.
    drop(read_rx);

    tracing::debug!(
        records = bulk.records.len(),
        failures = bulk.failures.len(),
        "collected step batch",
    );
    let _ = bulk_tx.send(bulk).await;
}
