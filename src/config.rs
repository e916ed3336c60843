//! Configuration System
//!
//! Hierarchical configuration built with the `config` crate. Sources, lowest
//! precedence first: merge-policy defaults, the user's global file, the
//! workspace files, then `POKESYNC__*` environment variables.

use crate::logging::LoggingConfig;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod merge;
mod sources;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub frame: FrameConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where and how the versioned store is persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Store directory, relative paths resolve against the workspace root
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    /// Flush sled to disk after every committed frame
    #[serde(default = "default_true")]
    pub flush_on_commit: bool,
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".pokesync/store")
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            flush_on_commit: default_true(),
        }
    }
}

impl StorageConfig {
    pub fn resolve_path(&self, workspace_root: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            workspace_root.join(&self.path)
        }
    }
}

/// Frame cadence used by the `run` driver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameConfig {
    /// Length of each frame window in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Delay between frames in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_window_ms() -> u64 {
    100
}

fn default_interval_ms() -> u64 {
    100
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            window_ms: default_window_ms(),
            interval_ms: default_interval_ms(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Storage(String),
    Frame(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Frame(msg) => write!(f, "Frame: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl SyncConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.storage.path.as_os_str().is_empty() {
            errors.push(ValidationError::Storage(
                "Store path cannot be empty".to_string(),
            ));
        }
        if self.frame.window_ms == 0 {
            errors.push(ValidationError::Frame(
                "window_ms must be greater than zero".to_string(),
            ));
        }
        if self.frame.interval_ms == 0 {
            errors.push(ValidationError::Frame(
                "interval_ms must be greater than zero".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace from every source
    pub fn load(workspace_root: &Path) -> Result<SyncConfig, ConfigError> {
        let builder = merge::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        builder
            .add_source(Environment::with_prefix("POKESYNC").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Load configuration from one explicit file (plus defaults and env)
    pub fn load_from_file(path: &Path) -> Result<SyncConfig, ConfigError> {
        let path_str = path.to_str().ok_or_else(|| {
            ConfigError::Message(format!("Config path is not valid UTF-8: {:?}", path))
        })?;
        merge::builder_with_defaults()?
            .add_source(File::with_name(path_str).required(true))
            .add_source(Environment::with_prefix("POKESYNC").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Defaults only
    pub fn defaults() -> Result<SyncConfig, ConfigError> {
        let config: Config = merge::builder_with_defaults()?.build()?;
        config.try_deserialize()
    }
}
