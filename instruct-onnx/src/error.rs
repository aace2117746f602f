//! Error types for instruct-onnx

use thiserror::Error;

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, AdapterError>;

/// Main error type for the model adapter
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The artifact bundle is missing, corrupt or incompatible. Raised only
    /// while loading; no adapter is produced.
    #[error("Load failure: {0}")]
    Load(String),

    /// Tokenizer or backend failure during a predict call.
    #[error("Generation failure: {0}")]
    Generation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AdapterError {
    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_load_failure(&self) -> bool {
        matches!(self, Self::Load(_))
    }

    pub fn is_generation_failure(&self) -> bool {
        matches!(self, Self::Generation(_))
    }
}
