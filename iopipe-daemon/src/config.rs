use std::path::{Path, PathBuf};
use std::time::Duration;

use iopipe_core::Directories;

pub const DEBOUNCE_WINDOW: Duration = Duration::from_millis(500);

/// Runtime settings for the manifest watcher.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Directory holding sync manifests (`*.yaml` / `*.yml`).
    pub manifests_dir: PathBuf,
    /// Only manifests in this namespace are synchronized.
    pub namespace: String,
    /// Roots applied to steps that leave theirs unset.
    pub directories: Directories,
    /// Events for the same manifest closer together than this collapse to one.
    pub debounce: Duration,
}

impl DaemonConfig {
    pub fn new(manifests_dir: impl Into<PathBuf>, namespace: impl Into<String>) -> Self {
        Self {
            manifests_dir: manifests_dir.into(),
            namespace: namespace.into(),
            directories: Directories::default(),
            debounce: DEBOUNCE_WINDOW,
        }
    }

    pub fn with_directories(mut self, directories: Directories) -> Self {
        self.directories = directories;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }
}

/// True for `*.yaml` / `*.yml` files directly inside `dir`.
pub fn is_manifest_file(path: &Path, dir: &Path) -> bool {
    path.parent() == Some(dir)
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
            .unwrap_or(false)
}
