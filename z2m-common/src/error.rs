use thiserror::Error;

/// Common error type for the extension host model.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid IEEE address: {0}")]
    InvalidAddress(String),

    #[error("Event handler failed: {0}")]
    Handler(String),

    #[error("Host request failed: {0}")]
    Host(String),
}

impl Error {
    /// Create a handler error from anything displayable.
    pub fn handler(msg: impl std::fmt::Display) -> Self {
        Error::Handler(msg.to_string())
    }
}

/// Result type alias using the host model's Error.
pub type Result<T> = std::result::Result<T, Error>;
