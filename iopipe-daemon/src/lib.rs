//! Manifest watcher: turns labelled manifests in a directory into pipeline runs.

pub mod config;
mod error;
mod logging;
mod runtime;

pub use config::{is_manifest_file, DaemonConfig, DEBOUNCE_WINDOW};
pub use error::DaemonError;
pub use logging::{init_tracing, LogFormat};
pub use runtime::{process_manifest, run, start_blocking, ManifestOutcome};
