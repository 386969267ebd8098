//! Errors surfaced to channel observers.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Why a channel failed.
///
/// Every failure reaches the application once, through
/// [`ChannelObserver::on_disconnect`](crate::ChannelObserver::on_disconnect)
/// or [`ChannelObserver::on_server_error`](crate::ChannelObserver::on_server_error),
/// and the channel's resources are already released when it does.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("unknown channel error")]
    Unknown,

    #[error("failed to resolve host `{0}`")]
    DnsFailed(String),

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("{description}: {}", io::Error::from_raw_os_error(*code))]
    SocketError { description: String, code: i32 },

    #[error("peer disconnected")]
    PeerDisconnected,
}

impl ChannelError {
    /// Wraps a failed syscall, keeping its platform error code.
    pub fn socket(description: impl Into<String>, error: &io::Error) -> Self {
        ChannelError::SocketError {
            description: description.into(),
            code: error.raw_os_error().unwrap_or(0),
        }
    }

    /// Platform error code of a [`ChannelError::SocketError`].
    pub fn code(&self) -> Option<i32> {
        match self {
            ChannelError::SocketError { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Failures of the TLS adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TlsError {
    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    #[error("TLS record error: {0}")]
    Protocol(String),

    #[error("invalid TLS configuration: {0}")]
    Config(String),

    #[error("invalid server name `{0}`")]
    InvalidServerName(String),

    #[error("TLS I/O error: {0}")]
    Io(String),
}
