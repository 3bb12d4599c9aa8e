//! Create a local research object.

use std::path::PathBuf;

use clap::Args;
use ro_sync_core::LocalRo;

use super::CommandError;

/// Create a research object in a directory
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Name of the research object
    name: String,

    /// RO directory (created if missing)
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,
}

impl InitCommand {
    pub fn run(&self) -> Result<(), CommandError> {
        let ro = LocalRo::create(&self.dir, &self.name)?;
        println!(
            "Created research object '{}' in {}",
            ro.name(),
            ro.root().display()
        );
        Ok(())
    }
}
