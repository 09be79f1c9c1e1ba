pub mod sync;
pub mod watch;

use std::path::PathBuf;

use clap::Args;
use iopipe_core::Directories;

/// Root overrides shared by `sync` and `watch`.
#[derive(Args, Debug)]
pub struct RootArgs {
    /// Input root for steps without `inputDir`.
    #[arg(long, default_value = iopipe_core::types::DEFAULT_INPUT_ROOT)]
    pub input_root: PathBuf,

    /// Output root for steps without `outputDir`.
    #[arg(long, default_value = iopipe_core::types::DEFAULT_OUTPUT_ROOT)]
    pub output_root: PathBuf,
}

impl RootArgs {
    pub fn directories(&self) -> Directories {
        Directories::new(&self.input_root, &self.output_root)
    }
}
