//! Domain types for the iopipe synchronization pipeline.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Steps deserialize from the YAML step-list format (`id`, `configs`,
//! `inputDir`, `outputDir`).

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Input root used when a step does not declare one.
pub const DEFAULT_INPUT_ROOT: &str = "/tmp/iopipe/input";
/// Output root used when a step does not declare one.
pub const DEFAULT_OUTPUT_ROOT: &str = "/tmp/iopipe/output";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of a step; becomes part of every artifact name the step writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub String);

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for StepId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StepId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Input and output roots applied to steps that leave theirs unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directories {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
}

impl Default for Directories {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from(DEFAULT_INPUT_ROOT),
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
        }
    }
}

impl Directories {
    pub fn new(input_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            input_root: input_root.into(),
            output_root: output_root.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// One unit of synchronization work, as decoded from a step list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    /// Component name -> path relative to `<input_dir>/<component>`.
    #[serde(default)]
    pub configs: BTreeMap<String, String>,
    #[serde(
        rename = "inputDir",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub input_dir: Option<PathBuf>,
    #[serde(
        rename = "outputDir",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub output_dir: Option<PathBuf>,
}

impl Step {
    pub fn new(id: impl Into<StepId>) -> Self {
        Self {
            id: id.into(),
            configs: BTreeMap::new(),
            input_dir: None,
            output_dir: None,
        }
    }

    /// Builder-style helper used mostly by tests and the CLI.
    pub fn with_config(mut self, component: impl Into<String>, path: impl Into<String>) -> Self {
        self.configs.insert(component.into(), path.into());
        self
    }

    pub fn with_input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.input_dir = Some(dir.into());
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Fill unset or empty roots from `dirs`.
    pub fn resolve(&self, dirs: &Directories) -> ResolvedStep {
        ResolvedStep {
            id: self.id.clone(),
            configs: self.configs.clone(),
            input_dir: non_empty(self.input_dir.as_deref())
                .unwrap_or_else(|| dirs.input_root.clone()),
            output_dir: non_empty(self.output_dir.as_deref())
                .unwrap_or_else(|| dirs.output_root.clone()),
        }
    }
}

fn non_empty(path: Option<&Path>) -> Option<PathBuf> {
    path.filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

/// A step with both roots known. Immutable for one synchronization pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStep {
    pub id: StepId,
    pub configs: BTreeMap<String, String>,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl ResolvedStep {
    /// `<input_dir>/<component>/<relative>`.
    pub fn source_path(&self, component: &str, relative: &str) -> PathBuf {
        self.input_dir.join(component).join(relative)
    }
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

/// A source file's base name and its full content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentRecord {
    pub name: String,
    pub content: Vec<u8>,
}

impl ContentRecord {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Content as text; invalid UTF-8 is replaced.
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.content)
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
