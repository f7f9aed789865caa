use thiserror::Error;

/// Errors produced by the tunnel protocol layer.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("tunnel not found: {0}")]
    TunnelNotFound(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("timeout")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for TunnelError {
    fn from(e: serde_json::Error) -> Self {
        TunnelError::Codec(e.to_string())
    }
}

impl From<httparse::Error> for TunnelError {
    fn from(e: httparse::Error) -> Self {
        TunnelError::InvalidMessage(e.to_string())
    }
}

pub type TunnelResult<T> = Result<T, TunnelError>;
