mod annotate;
mod checkout;
mod config_cmd;
mod init;
mod push;

pub use annotate::AnnotateCommand;
pub use checkout::CheckoutCommand;
pub use config_cmd::ConfigCommand;
pub use init::InitCommand;
pub use push::PushCommand;

use std::time::Duration;

use clap::Args;
use ro_sync_core::{ClientConfig, RosrsClient, SyncEngine, SyncError, SyncOptions};
use tokio_util::sync::CancellationToken;

use crate::config::Config;

/// Connection flags shared by `push` and `checkout`.
#[derive(Debug, Args)]
pub struct RemoteArgs {
    /// ROSRS service URI (the RO collection)
    #[arg(short = 'r', long = "rosrs-uri", value_name = "URI")]
    rosrs_uri: Option<String>,

    /// Access token for the ROSRS service
    #[arg(short = 't', long = "token", value_name = "TOKEN")]
    token: Option<String>,
}

impl RemoteArgs {
    /// Builds an engine from flags, falling back to the configuration.
    pub fn engine(&self, config: &Config) -> Result<SyncEngine<RosrsClient>, CommandError> {
        let base = self
            .rosrs_uri
            .clone()
            .or_else(|| config.rosrs_uri.value.clone())
            .ok_or(CommandError::MissingRosrsUri)?;
        let timeout = Duration::from_secs(config.timeout_secs.value);

        let mut client_config = ClientConfig::new(base).with_timeout(timeout);
        if let Some(token) = self
            .token
            .clone()
            .or_else(|| config.access_token.value.clone())
        {
            client_config = client_config.with_token(token);
        }

        let options = SyncOptions::default()
            .with_workers(config.workers.value)
            .with_item_timeout(timeout);
        Ok(SyncEngine::with_options(
            RosrsClient::new(client_config)?,
            options,
        ))
    }
}

pub(crate) fn runtime() -> Result<tokio::runtime::Runtime, CommandError> {
    tokio::runtime::Runtime::new().map_err(|e| CommandError::RuntimeError(e.to_string()))
}

/// Token cancelled on Ctrl-C. Must be called from within the runtime.
pub(crate) fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, waiting for in-flight items...");
            trigger.cancel();
        }
    });
    token
}

/// Errors from RO commands
#[derive(Debug)]
pub enum CommandError {
    SyncError(SyncError),
    MissingRosrsUri,
    IoError(std::io::Error),
    RuntimeError(String),
}

impl CommandError {
    /// Process exit code: 2 when the sync completed with item failures.
    pub fn exit_code(&self) -> i32 {
        match self {
            CommandError::SyncError(SyncError::PartialSync { .. }) => 2,
            _ => 1,
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::SyncError(e) => write!(f, "{}", e),
            CommandError::MissingRosrsUri => write!(
                f,
                "No ROSRS service configured; pass -r <URI> or set rosrs_uri"
            ),
            CommandError::IoError(e) => write!(f, "{}", e),
            CommandError::RuntimeError(e) => write!(f, "Runtime error: {}", e),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::SyncError(e) => Some(e),
            CommandError::IoError(e) => Some(e),
            CommandError::MissingRosrsUri | CommandError::RuntimeError(_) => None,
        }
    }
}

impl From<SyncError> for CommandError {
    fn from(e: SyncError) -> Self {
        CommandError::SyncError(e)
    }
}

impl From<std::io::Error> for CommandError {
    fn from(e: std::io::Error) -> Self {
        CommandError::IoError(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSource, ConfigValue};
    use std::path::PathBuf;

    fn config(rosrs_uri: Option<&str>) -> Config {
        Config {
            rosrs_uri: ConfigValue::new(rosrs_uri.map(str::to_string), ConfigSource::File),
            access_token: ConfigValue::new(None, ConfigSource::Default),
            workers: ConfigValue::new(2, ConfigSource::Default),
            timeout_secs: ConfigValue::new(5, ConfigSource::Default),
            checkout_dir: ConfigValue::new(PathBuf::from("."), ConfigSource::Default),
            config_file: None,
        }
    }

    #[test]
    fn test_flag_overrides_config() {
        let args = RemoteArgs {
            rosrs_uri: Some("http://flag.example.org/ROs/".into()),
            token: None,
        };
        let engine = args.engine(&config(Some("http://file.example.org/ROs/"))).unwrap();
        assert_eq!(engine.remote().base_uri(), "http://flag.example.org/ROs/");
        assert_eq!(engine.options().workers, 2);
        assert_eq!(engine.options().item_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_uri_is_error() {
        let args = RemoteArgs {
            rosrs_uri: None,
            token: None,
        };
        assert!(matches!(
            args.engine(&config(None)),
            Err(CommandError::MissingRosrsUri)
        ));
    }

    #[test]
    fn test_partial_sync_exit_code() {
        let partial = CommandError::from(SyncError::PartialSync {
            failed: 1,
            total: 3,
        });
        assert_eq!(partial.exit_code(), 2);
        assert_eq!(CommandError::MissingRosrsUri.exit_code(), 1);
    }
}
