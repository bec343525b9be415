//! Error types for controller setup and persistence.

/// Result type for controller operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for controller operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to persist state file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[cfg(feature = "candle")]
    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}
