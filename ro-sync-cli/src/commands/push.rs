//! Push a local RO to the ROSRS service.

use std::io::{self, Write};
use std::path::PathBuf;

use clap::Args;
use ro_sync_core::{LocalRo, PushReport};

use super::{cancel_on_ctrl_c, runtime, CommandError, RemoteArgs};
use crate::config::Config;

/// Push a local research object to the ROSRS service
#[derive(Debug, Args)]
pub struct PushCommand {
    /// RO directory
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    #[command(flatten)]
    remote: RemoteArgs,
}

impl PushCommand {
    pub fn run(&self, config: &Config, verbose: bool) -> Result<(), CommandError> {
        runtime()?.block_on(self.push(config, verbose))
    }

    async fn push(&self, config: &Config, verbose: bool) -> Result<(), CommandError> {
        let local = LocalRo::open(&self.dir)?;
        let engine = self.remote.engine(config)?;
        let mut registry = local.load_registry()?;
        let cancel = cancel_on_ctrl_c();

        let result = engine.push(&local, &mut registry, &cancel).await;
        // Whatever completed is recorded, even if the push aborted.
        local.save_registry(&registry)?;
        let report = result?;

        write_report(&mut io::stdout().lock(), &report, verbose)?;
        for failure in &report.failures {
            eprintln!("  {}", failure);
        }
        if report.cancelled {
            eprintln!("Push cancelled before completion");
        }
        report.check()?;
        Ok(())
    }
}

fn write_report(out: &mut impl Write, report: &PushReport, verbose: bool) -> io::Result<()> {
    if verbose {
        for id in &report.uploaded {
            writeln!(out, "Resource uploaded: {}", id)?;
        }
        for id in &report.deleted {
            writeln!(out, "Resource deleted in ROSRS: {}", id)?;
        }
        for annotation in &report.annotations_pushed {
            writeln!(out, "Annotation pushed: {}", annotation)?;
        }
        for annotation in &report.annotations_retracted {
            writeln!(out, "Annotation deleted in ROSRS: {}", annotation)?;
        }
    }
    writeln!(out, "{}", report.summary())
}
