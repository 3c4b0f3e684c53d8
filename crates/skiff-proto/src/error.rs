//! Error types for the wire protocol.

use skiff_crypto::CryptoError;
use thiserror::Error;

/// Framing-level errors
#[derive(Debug, Error)]
pub enum WireError {
    /// Peer closed the stream mid-record
    #[error("transport closed")]
    TransportClosed,

    /// Underlying I/O failure
    #[error("i/o error: {0}")]
    Io(std::io::Error),

    /// Record shorter than its fixed layout
    #[error("record too short: expected {expected}, got {actual}")]
    Truncated {
        /// Expected record size
        expected: usize,
        /// Actual size received
        actual: usize,
    },

    /// Status tag not in the protocol's set
    #[error("invalid status tag: {0}")]
    InvalidStatus(u32),

    /// A length field exceeds its layout bound
    #[error("invalid field length")]
    InvalidFieldLength,
}

impl From<std::io::Error> for WireError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            WireError::TransportClosed
        } else {
            WireError::Io(err)
        }
    }
}

/// Session-level errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// Operation requires an established session key
    #[error("session not established")]
    NotEstablished,

    /// AEAD open failure or nonce replay
    #[error("authentication failed")]
    AuthFailed,

    /// Key exchange produced an invalid shared secret
    #[error("invalid peer key")]
    InvalidKey,

    /// Decrypted metadata violates its own constraints
    #[error("malformed metadata")]
    MalformedMetadata,

    /// Primitive failure below the session layer
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}
