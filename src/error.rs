use thiserror::Error;

/// Error taxonomy for the session server
#[derive(Debug, Error)]
pub enum SwapError {
    /// Authentication errors: the only kind that closes a connection
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Authorization failures are silently ignored at the handler boundary
    /// so they do not leak command existence
    #[error("Not permitted")]
    Forbidden,

    /// Room and session lookup errors
    #[error("Invalid Room Code")]
    InvalidRoomCode,

    #[error("This class session has ended.")]
    SessionEnded,

    #[error("{0} not found")]
    NotFound(String),

    /// Command preconditions (empty thought pool, quota exceeded, validation)
    #[error("{0}")]
    Precondition(String),

    /// Integrity conflicts (duplicate join code, duplicate thought)
    #[error("{0}")]
    Conflict(String),

    /// Store / transport failures
    #[error("Store error: {0}")]
    Store(String),

    #[error("Failed to serialize message: {0}")]
    SerializationFailed(#[from] serde_json::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results using SwapError
pub type Result<T> = std::result::Result<T, SwapError>;

impl SwapError {
    /// Helper to create Precondition errors with context
    pub fn precondition(msg: impl Into<String>) -> Self {
        SwapError::Precondition(msg.into())
    }

    /// Helper to create Store errors
    pub fn store(msg: impl Into<String>) -> Self {
        SwapError::Store(msg.into())
    }

    /// Helper to create Internal errors with context
    pub fn internal(msg: impl Into<String>) -> Self {
        SwapError::Internal(msg.into())
    }

    /// The message sent to the originating client as an `ERROR` frame.
    /// Store and internal failures are masked; everything else is
    /// human-readable by construction.
    pub fn client_message(&self) -> String {
        match self {
            SwapError::Store(_) | SwapError::Internal(_) | SwapError::SerializationFailed(_) => {
                "internal error".to_string()
            }
            other => other.to_string(),
        }
    }
}
