use serde::{Deserialize, Serialize, Serializer};
use std::path::PathBuf;

use ro_sync_core::engine::{DEFAULT_ITEM_TIMEOUT, DEFAULT_WORKERS};

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Client configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// RO collection URI of the ROSRS service
    pub rosrs_uri: ConfigValue<Option<String>>,
    /// Bearer token for the ROSRS service
    #[serde(serialize_with = "masked")]
    pub access_token: ConfigValue<Option<String>>,
    /// Items in flight per sync phase
    pub workers: ConfigValue<usize>,
    /// Per-item timeout in seconds
    pub timeout_secs: ConfigValue<u64>,
    /// Base directory for checkouts
    pub checkout_dir: ConfigValue<PathBuf>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    rosrs_uri: Option<String>,
    access_token: Option<String>,
    workers: Option<usize>,
    timeout_secs: Option<u64>,
    checkout_dir: Option<PathBuf>,
}

fn masked<S: Serializer>(
    token: &ConfigValue<Option<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    ConfigValue::new(token.value.as_ref().map(|_| "****"), token.source.clone())
        .serialize(serializer)
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnv(name.to_string(), raw)),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut rosrs_uri = ConfigValue::new(None, ConfigSource::Default);
        let mut access_token = ConfigValue::new(None, ConfigSource::Default);
        let mut workers = ConfigValue::new(DEFAULT_WORKERS, ConfigSource::Default);
        let mut timeout_secs =
            ConfigValue::new(DEFAULT_ITEM_TIMEOUT.as_secs(), ConfigSource::Default);
        let mut checkout_dir = ConfigValue::new(PathBuf::from("."), ConfigSource::Default);
        let mut config_file = None;

        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(uri) = file_config.rosrs_uri {
                rosrs_uri = ConfigValue::new(Some(uri), ConfigSource::File);
            }
            if let Some(token) = file_config.access_token {
                access_token = ConfigValue::new(Some(token), ConfigSource::File);
            }
            if let Some(n) = file_config.workers {
                workers = ConfigValue::new(n, ConfigSource::File);
            }
            if let Some(secs) = file_config.timeout_secs {
                timeout_secs = ConfigValue::new(secs, ConfigSource::File);
            }
            if let Some(dir) = file_config.checkout_dir {
                // Resolve relative paths against config file's directory
                let resolved = if dir.is_relative() {
                    path.parent().map(|p| p.join(&dir)).unwrap_or(dir)
                } else {
                    dir
                };
                checkout_dir = ConfigValue::new(resolved, ConfigSource::File);
            }
        }

        if let Ok(uri) = std::env::var("RO_ROSRS_URI") {
            rosrs_uri = ConfigValue::new(Some(uri), ConfigSource::Environment);
        }
        if let Ok(token) = std::env::var("RO_ACCESS_TOKEN") {
            access_token = ConfigValue::new(Some(token), ConfigSource::Environment);
        }
        if let Some(n) = parse_env("RO_WORKERS")? {
            workers = ConfigValue::new(n, ConfigSource::Environment);
        }
        if let Some(secs) = parse_env("RO_TIMEOUT_SECS")? {
            timeout_secs = ConfigValue::new(secs, ConfigSource::Environment);
        }
        if let Ok(dir) = std::env::var("RO_CHECKOUT_DIR") {
            checkout_dir = ConfigValue::new(PathBuf::from(dir), ConfigSource::Environment);
        }

        Ok(Self {
            rosrs_uri,
            access_token,
            workers,
            timeout_secs,
            checkout_dir,
            config_file,
        })
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/ro/
    /// - macOS: ~/Library/Application Support/ro/
    /// - Windows: %APPDATA%/ro/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ro")
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidEnv(String, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidEnv(name, value) => {
                write!(f, "Invalid value for {}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
