//! Error types for tunerd.

use crate::frequency::FrequencyError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TunerError {
    // Input validation
    #[error("Invalid frequency: {0}")]
    Validation(#[from] FrequencyError),

    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Process lifecycle errors
    #[error("Failed to start {process}: {message}")]
    Spawn { process: String, message: String },

    #[error("Failed to start {process}: {message}")]
    EarlyExit {
        process: String,
        message: String,
        exit_code: Option<i32>,
    },

    // IPC errors
    #[error("IPC socket error: {message}")]
    IpcSocket { message: String },

    #[error("IPC protocol error: {message}")]
    IpcProtocol { message: String },

    #[error("IPC connection failed: {message}")]
    IpcConnection { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl TunerError {
    /// Returns true for failures raised while bringing a pipeline up.
    pub fn is_startup_failure(&self) -> bool {
        matches!(self, TunerError::Spawn { .. } | TunerError::EarlyExit { .. })
    }
}

pub type Result<T> = std::result::Result<T, TunerError>;
