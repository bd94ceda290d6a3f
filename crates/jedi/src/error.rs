//! # Runtime Error Types
//!
//! Configuration errors and the umbrella error of the runtime.

use std::path::PathBuf;

use jedi_core::MemoryError;
use jedi_tasks::SchedulerError;
use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        /// Path of the config file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config text is not valid TOML for [`crate::RuntimeConfig`].
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be written back as TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur in the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Region or pool failure.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// Task scheduler failure.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
