//! PulseDesk error types.

use thiserror::Error;

/// Result alias used across PulseDesk crates.
pub type Result<T> = std::result::Result<T, PulseDeskError>;

/// Unified error type for PulseDesk.
#[derive(Debug, Error)]
pub enum PulseDeskError {
    /// Configuration loading/parsing errors.
    #[error("Config error: {0}")]
    Config(String),

    /// Persistence (SQLite) errors.
    #[error("Store error: {0}")]
    Store(String),

    /// External trigger dispatch errors.
    #[error("Dispatch error: {0}")]
    Dispatch(String),

    /// I/O errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PulseDeskError {
    /// Create a config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a dispatch error.
    pub fn dispatch(msg: impl Into<String>) -> Self {
        Self::Dispatch(msg.into())
    }
}
