//! Error types for the gateway crate

use crate::messages::{CallStatus, StatusCode};
use thiserror::Error;

/// Transport-level errors
///
/// Cloneable so a channel failure recorded once can be handed to every call
/// that is pending or issued afterwards.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    /// The caller stopped draining a submit stream and it was cancelled
    #[error("Submit stream fell more than {capacity} items behind")]
    StreamOverflow { capacity: usize },

    #[error("Credentials not supported by this transport: {0}")]
    UnsupportedCredentials(String),

    #[error("Rejected by remote: {0}")]
    Rejected(CallStatus),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

impl From<bincode::Error> for TransportError {
    fn from(err: bincode::Error) -> Self {
        TransportError::Serialization(err.to_string())
    }
}

/// Gateway-level errors (builder and call bridge)
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Missing or invalid configuration at connect time. Never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The endpoint returned an explicit error for the call
    #[error("Rejected by gateway: {0}")]
    RemoteRejection(CallStatus),

    /// The submit stream ended abnormally. Events already observed remain valid.
    #[error("Commit stream terminated after {observed} event(s): {source}")]
    StreamTermination {
        observed: usize,
        #[source]
        source: TransportError,
    },

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Response value is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

impl GatewayError {
    /// Whether a caller may reasonably retry the call that produced this error.
    ///
    /// The gateway itself never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Transport(_) | GatewayError::DeadlineExceeded => true,
            GatewayError::RemoteRejection(status) => {
                matches!(status.code, StatusCode::Unavailable | StatusCode::Aborted)
            }
            GatewayError::StreamTermination { source, .. } => {
                !matches!(source, TransportError::Rejected(_))
            }
            GatewayError::Configuration(_) | GatewayError::InvalidUtf8(_) => false,
        }
    }

    /// Map a transport failure of a unary call onto the gateway error kinds
    pub(crate) fn from_call(err: TransportError) -> Self {
        match err {
            TransportError::Rejected(status) if status.code == StatusCode::DeadlineExceeded => {
                GatewayError::DeadlineExceeded
            }
            TransportError::Rejected(status) => GatewayError::RemoteRejection(status),
            other => GatewayError::Transport(other),
        }
    }
}

/// Configuration file errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {error}")]
    Io { path: String, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),
}
