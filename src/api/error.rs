//! API Error Types

use thiserror::Error;

/// Errors raised while running the HTTP server
#[derive(Error, Debug)]
pub enum ApiError {
    /// Listener could not be bound
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Server loop failed
    #[error("Server error: {0}")]
    Server(String),
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;
