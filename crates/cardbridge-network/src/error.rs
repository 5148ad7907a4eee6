use std::net::SocketAddr;

use thiserror::Error;

/// Errors raised by the real-time server and the peer forwarder.
#[derive(Debug, Error)]
pub enum NetworkError {
    /// The server could not bind its listening socket.
    #[error("Failed to bind to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// WebSocket connection to the upstream peer failed.
    #[error("Peer connection failed: {0}")]
    Peer(String),

    /// Low-level I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for NetworkError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        NetworkError::Peer(err.to_string())
    }
}

/// Why a notification could not be handed to a subscriber.
///
/// A subscriber that fails once is removed from the broadcaster.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Subscriber disconnected")]
    Closed,

    #[error("Subscriber send queue full")]
    QueueFull,
}

pub type Result<T> = std::result::Result<T, NetworkError>;
