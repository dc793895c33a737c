use thiserror::Error;

/// Unified error type for bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("no outputs could be opened")]
    NoOutputsOpened,
}

/// Convenience Result type alias with `BridgeError`.
pub type Result<T> = std::result::Result<T, BridgeError>;
