/// Typed errors for the network tools bridge
use thiserror::Error;

/// Result type alias for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors that can occur while serving bridge requests
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Ping count must be at least 1 (got {count})")]
    InvalidPingCount { count: i64 },

    #[error("Ping attempt against {host} was interrupted: {source}")]
    PingInterrupted {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker failed: {0}")]
    WorkerFailed(String),

    #[error("Bridge channel is closed")]
    ChannelClosed,

    #[error("Command `{command}` failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Failed to register broadcast receiver: {0}")]
    ReceiverRegistrationFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed frame: {0}")]
    Frame(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<tokio::task::JoinError> for BridgeError {
    fn from(err: tokio::task::JoinError) -> Self {
        BridgeError::WorkerFailed(err.to_string())
    }
}
