//! Error types shared across the Taskmill workspace.

/// Errors from core facilities (config, serialization, io).
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for core results.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors from callback resolution and dispatch.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("Callback failed to resolve: {0}")]
    Resolve(String),
    #[error("Callback processing failed: {0}")]
    Process(String),
}
