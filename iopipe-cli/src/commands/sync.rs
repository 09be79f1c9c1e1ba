//! `iopipe sync`: run a step list once.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use iopipe_core::{load_manifest_at, load_steps_at, Step};
use iopipe_sync::{synchronize_with, Cancellation};

use super::RootArgs;

/// Arguments for `iopipe sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Steps file, or a manifest when `--manifest` is given.
    pub file: PathBuf,

    /// Treat FILE as a sync manifest instead of a bare step list.
    #[arg(long, requires = "namespace")]
    pub manifest: bool,

    /// Namespace the manifest must belong to.
    #[arg(long)]
    pub namespace: Option<String>,

    #[command(flatten)]
    pub roots: RootArgs,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let steps = self.load_steps()?;
        if steps.is_empty() {
            println!("{} nothing to do", "✓".green());
            return Ok(());
        }

        let dirs = self.roots.directories();
        let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
        runtime
            .block_on(synchronize_with(&Cancellation::never(), &dirs, &steps))
            .context("synchronization failed")?;

        println!(
            "{} synchronized {} step(s) from {}",
            "✓".green(),
            steps.len(),
            self.file.display()
        );
        for step in &steps {
            let resolved = step.resolve(&dirs);
            println!("  {}  {}", step.id, resolved.output_dir.display());
        }
        Ok(())
    }

    fn load_steps(&self) -> Result<Vec<Step>> {
        if !self.manifest {
            return load_steps_at(&self.file)
                .with_context(|| format!("failed to load steps from {}", self.file.display()));
        }

        let manifest = load_manifest_at(&self.file)
            .with_context(|| format!("failed to load manifest {}", self.file.display()))?;
        let namespace = self.namespace.as_deref().unwrap_or_default();
        if !manifest.is_marked_for_sync(namespace) {
            bail!(
                "manifest {} is not marked for sync in namespace '{namespace}'",
                self.file.display()
            );
        }
        manifest.steps().context("failed to get steps")
    }
}
