//! iopipe core library: domain types and sync manifests.
//!
//! - [`types`]: steps, roots and content records
//! - [`compose`]: [`compose::compose`] and [`CompositeError`]
//! - [`manifest`]: load and decode sync manifests
//! - [`error`]: [`ManifestError`]

pub mod compose;
pub mod error;
pub mod manifest;
pub mod types;

pub use compose::{compose, CompositeError};
pub use error::ManifestError;
pub use manifest::{load_manifest_at, load_steps_at, parse_steps, SyncManifest};
pub use types::{ContentRecord, Directories, ResolvedStep, Step, StepId};
