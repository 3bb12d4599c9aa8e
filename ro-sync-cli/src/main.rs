use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{
    AnnotateCommand, CheckoutCommand, CommandError, ConfigCommand, InitCommand, PushCommand,
};
use config::Config;

#[derive(Parser)]
#[command(name = "ro")]
#[command(version)]
#[command(about = "Synchronize Research Objects with a ROSRS service", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Report each transferred item and log progress
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a research object in a directory
    Init(InitCommand),

    /// Annotate the research object or one of its resources
    Annotate(AnnotateCommand),

    /// Push a local research object to the ROSRS service
    Push(PushCommand),

    /// Check out a research object from the ROSRS service
    Checkout(CheckoutCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        let code = e
            .downcast_ref::<CommandError>()
            .map(CommandError::exit_code)
            .unwrap_or(1);
        std::process::exit(code);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "ro_sync_core=info,ro=info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config)?;

    match &cli.command {
        Some(Commands::Init(cmd)) => cmd.run()?,
        Some(Commands::Annotate(cmd)) => cmd.run()?,
        Some(Commands::Push(cmd)) => cmd.run(&config, cli.verbose)?,
        Some(Commands::Checkout(cmd)) => cmd.run(&config)?,
        Some(Commands::Config(cmd)) => cmd.run(&config)?,
        None => println!("Use --help to see available commands"),
    }

    Ok(())
}
