use std::time::Duration;

/// Errors surfaced by the feed manager.
///
/// Steady-state connectivity problems never reach a caller as one of these;
/// supervisors absorb them. Only construction, configuration and lifecycle
/// misuse are returned.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Invalid endpoint {id}: {reason}")]
    InvalidEndpoint { id: String, reason: String },

    #[error("Duplicate endpoint id: {0}")]
    DuplicateEndpoint(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Connection manager already started")]
    AlreadyStarted,

    #[error("No tokio runtime available to start the connection manager")]
    NoRuntime,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type FeedResult<T> = Result<T, FeedError>;
