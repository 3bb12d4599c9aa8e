//! Check out a remote RO into a new local directory.

use std::io::{self, Write};
use std::path::PathBuf;

use clap::Args;
use ro_sync_core::CheckoutReport;

use super::{cancel_on_ctrl_c, runtime, CommandError, RemoteArgs};
use crate::config::Config;

/// Check out a research object from the ROSRS service
#[derive(Debug, Args)]
pub struct CheckoutCommand {
    /// RO name or URI
    ro: String,

    /// Base directory; the RO is written to a subdirectory named after it
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Replace the contents of an existing target directory
    #[arg(long)]
    overwrite: bool,

    #[command(flatten)]
    remote: RemoteArgs,
}

impl CheckoutCommand {
    pub fn run(&self, config: &Config) -> Result<(), CommandError> {
        runtime()?.block_on(self.checkout(config))
    }

    async fn checkout(&self, config: &Config) -> Result<(), CommandError> {
        let engine = self.remote.engine(config)?;
        let base = self
            .dir
            .clone()
            .unwrap_or_else(|| config.checkout_dir.value.clone());
        let cancel = cancel_on_ctrl_c();

        let report = engine
            .checkout(&self.ro, &base, self.overwrite, &cancel)
            .await?;

        tracing::info!("Checked out {} into {}", report.ro, report.root.display());
        write_report(&mut io::stdout().lock(), &report)?;
        for failure in &report.failures {
            eprintln!("  {}", failure);
        }
        report.check()?;
        Ok(())
    }
}

fn write_report(out: &mut impl Write, report: &CheckoutReport) -> io::Result<()> {
    writeln!(out, "ro checkout")?;
    for id in &report.resources {
        writeln!(out, "  {}", id)?;
    }
    writeln!(out, "{} files checked out", report.resources.len())
}
