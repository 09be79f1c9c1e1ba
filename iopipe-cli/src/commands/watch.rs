//! `iopipe watch`: foreground manifest watcher.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use iopipe_daemon::{start_blocking, DaemonConfig, DEBOUNCE_WINDOW};

use super::RootArgs;

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Directory holding sync manifests.
    pub dir: PathBuf,

    /// Only manifests in this namespace are synchronized.
    #[arg(long)]
    pub namespace: String,

    #[command(flatten)]
    pub roots: RootArgs,

    /// Quiet period per manifest before another change triggers a sync.
    #[arg(long, default_value_t = DEBOUNCE_WINDOW.as_millis() as u64)]
    pub debounce_ms: u64,
}

impl WatchArgs {
    pub fn run(self) -> Result<()> {
        let config = DaemonConfig::new(self.dir, self.namespace)
            .with_directories(self.roots.directories())
            .with_debounce(Duration::from_millis(self.debounce_ms));
        start_blocking(config).context("watcher exited with error")
    }
}
