//! Sync manifests: the labelled documents a trigger turns into step lists.
//!
//! # Format
//!
//! ```text
//! metadata:
//!   name: pipeline
//!   namespace: team-a
//!   labels:
//!     iopipesync: "yes"
//! data:
//!   steps: |
//!     - id: s1
//!       configs:
//!         dir1: "01"
//! ```
//!
//! A manifest takes part in synchronization only when it carries
//! `iopipesync: "yes"` and lives in the namespace the trigger watches.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ManifestError};
use crate::types::Step;

/// Label that marks a manifest for synchronization.
pub const SYNC_LABEL: &str = "iopipesync";
/// Value [`SYNC_LABEL`] must carry.
pub const SYNC_LABEL_VALUE: &str = "yes";
/// Data key holding the YAML step list.
pub const STEPS_KEY: &str = "steps";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ManifestMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncManifest {
    #[serde(default)]
    pub metadata: ManifestMetadata,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl SyncManifest {
    /// True when the manifest is labelled for sync and belongs to `namespace`.
    pub fn is_marked_for_sync(&self, namespace: &str) -> bool {
        self.metadata.labels.get(SYNC_LABEL).map(String::as_str) == Some(SYNC_LABEL_VALUE)
            && self.metadata.namespace == namespace
    }

    /// Decode the step list held under [`STEPS_KEY`].
    pub fn steps(&self) -> Result<Vec<Step>, ManifestError> {
        let raw = self.data.get(STEPS_KEY).ok_or(ManifestError::MissingSteps)?;
        parse_steps(raw)
    }
}

/// Load a manifest from disk.
///
/// Returns `ManifestError::NotFound` if absent,
/// `ManifestError::Parse` (with path context) if malformed YAML.
pub fn load_manifest_at(path: &Path) -> Result<SyncManifest, ManifestError> {
    let contents = read_existing(path)?;
    serde_yaml::from_str(&contents).map_err(|source| ManifestError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a bare step list (no manifest envelope) from disk.
pub fn load_steps_at(path: &Path) -> Result<Vec<Step>, ManifestError> {
    let contents = read_existing(path)?;
    parse_steps(&contents)
}

/// Decode and validate a YAML step list.
///
/// An empty document decodes to no steps.
pub fn parse_steps(yaml: &str) -> Result<Vec<Step>, ManifestError> {
    if yaml.trim().is_empty() {
        return Ok(vec![]);
    }
    let steps: Vec<Step> = serde_yaml::from_str(yaml)?;
    validate_steps(&steps)?;
    Ok(steps)
}

fn validate_steps(steps: &[Step]) -> Result<(), ManifestError> {
    for (index, step) in steps.iter().enumerate() {
        if step.id.0.trim().is_empty() {
            return Err(ManifestError::InvalidStep {
                index,
                reason: "step id is empty".to_string(),
            });
        }
        if let Some(component) = step.configs.keys().find(|c| c.trim().is_empty()) {
            return Err(ManifestError::InvalidStep {
                index,
                reason: format!("empty component name {component:?}"),
            });
        }
    }
    Ok(())
}

fn read_existing(path: &Path) -> Result<String, ManifestError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(contents),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ManifestError::NotFound {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(io_err(path, e)),
    }
}
