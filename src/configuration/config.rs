use super::types::RuntimeMode;
use crate::error_handling::types::ConfigError;
use clap::Parser;
use log::{debug, info};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_RECORDING_IMAGE: &str = "sessrec/recording-worker";
pub const DEFAULT_AUTOSTOP_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_STREAM_STOP_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_PUBLIC_URL: &str = "https://localhost:4443/";

/// Command-line arguments of the `sessrec` binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "sessrec")]
#[command(about = "Recording lifecycle orchestrator for live media sessions")]
pub struct Args {
    /// Path to the TOML configuration file
    pub config_file: PathBuf,

    /// Overrides `recording_path` from the configuration file
    #[arg(long)]
    pub recording_path: Option<PathBuf>,

    /// Forces public access to finished recordings
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub public_access: bool,
}

/// Runtime parameters consumed by the recording orchestrator.
///
/// # Fields Overview
///
/// - `recording_path`: root directory holding one sub-directory per recording
/// - `recording_image` / `recording_version`: worker image name and tag
/// - `autostop_timeout_secs`: how long a recording may run with no publisher
/// - `public_access` / `public_url`: whether finished recordings get a URL, and its base
/// - `runtime_mode`: how the container daemon is reached
/// - `stream_stop_timeout_secs`: bound on waiting for a per-stream worker to stop
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Config {
    pub recording_path: PathBuf,
    #[serde(default = "default_recording_image")]
    pub recording_image: String,
    pub recording_version: String,
    #[serde(default = "default_autostop_timeout")]
    pub autostop_timeout_secs: u64,
    #[serde(default)]
    pub public_access: bool,
    #[serde(default = "default_public_url")]
    pub public_url: String,
    #[serde(default)]
    pub runtime_mode: RuntimeMode,
    #[serde(default = "default_stream_stop_timeout")]
    pub stream_stop_timeout_secs: u64,
}

fn default_recording_image() -> String {
    DEFAULT_RECORDING_IMAGE.to_string()
}

fn default_autostop_timeout() -> u64 {
    DEFAULT_AUTOSTOP_TIMEOUT_SECS
}

fn default_public_url() -> String {
    DEFAULT_PUBLIC_URL.to_string()
}

fn default_stream_stop_timeout() -> u64 {
    DEFAULT_STREAM_STOP_TIMEOUT_SECS
}

impl Config {
    /// Builds a configuration with defaults for everything but the recording root and image tag.
    pub fn new<P: AsRef<Path>>(recording_path: P, recording_version: &str) -> Self {
        Config {
            recording_path: recording_path.as_ref().to_path_buf(),
            recording_image: default_recording_image(),
            recording_version: recording_version.to_string(),
            autostop_timeout_secs: DEFAULT_AUTOSTOP_TIMEOUT_SECS,
            public_access: false,
            public_url: default_public_url(),
            runtime_mode: RuntimeMode::default(),
            stream_stop_timeout_secs: DEFAULT_STREAM_STOP_TIMEOUT_SECS,
        }
    }

    /// Reads and validates a TOML configuration file, then applies environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))
    }

    /// Applies `SESSREC_RECORDING_PATH` and `SESSREC_PUBLIC_URL` when they are set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("SESSREC_RECORDING_PATH") {
            info!("Using recording path from SESSREC_RECORDING_PATH: {}", dir);
            self.recording_path = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var("SESSREC_PUBLIC_URL") {
            info!("Using public url from SESSREC_PUBLIC_URL: {}", url);
            self.public_url = url;
        }
    }

    /// Applies command-line overrides on top of the file configuration.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref path) = args.recording_path {
            self.recording_path = path.clone();
        }
        if args.public_access {
            self.public_access = true;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recording_version.trim().is_empty() {
            return Err(ConfigError::MissingValue(
                "recording_version must not be empty".to_string(),
            ));
        }
        if self.recording_image.trim().is_empty() {
            return Err(ConfigError::MissingValue(
                "recording_image must not be empty".to_string(),
            ));
        }
        if self.stream_stop_timeout_secs == 0 {
            return Err(ConfigError::NotInRange(
                "stream_stop_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Full `name:tag` reference of the worker image.
    pub fn image_reference(&self) -> String {
        format!("{}:{}", self.recording_image, self.recording_version)
    }

    pub fn autostop_timeout(&self) -> Duration {
        Duration::from_secs(self.autostop_timeout_secs)
    }

    pub fn stream_stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_stop_timeout_secs)
    }
}
