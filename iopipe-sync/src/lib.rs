//! # iopipe-sync
//!
//! Concurrent read → aggregate → archive pipeline.
//!
//! Call [`synchronize`] (default roots) or [`synchronize_with`] (explicit
//! roots) with a decoded step list and a [`Cancellation`] token.

pub mod aggregate;
pub mod cancel;
pub mod error;
pub mod pipeline;
pub mod reader;
pub mod writer;

pub use cancel::{cancellation, CancelHandle, Cancellation};
pub use error::SyncError;
pub use pipeline::{execute_step, synchronize, synchronize_with, WriteOutcome};
pub use reader::{ConfReader, FileConfReader, ReadOutcome};
pub use writer::{artifact_name, ArchiveWriter, ConfWriter};
