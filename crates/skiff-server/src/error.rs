//! Server error kinds and their dispositions.
//!
//! Every error maps to an optional wire status and a close decision; the
//! command loop applies the mapping so handlers just return the kind.

use skiff_crypto::CryptoError;
use skiff_proto::{SessionError, Status, WireError};
use skiff_store::StoreError;
use thiserror::Error;

/// Errors raised while serving a connection
#[derive(Debug, Error)]
pub enum ServerError {
    /// Framing failure, including peer EOF mid-record
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Session-layer failure (AEAD open, replay, key agreement)
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// Metadata store failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Primitive failure outside the session layer
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Filesystem or socket failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// ACL refusal, name validation, or duplicate name
    #[error("permission denied")]
    PermissionDenied,

    /// Download lookup miss
    #[error("file not found")]
    FileNotFound,

    /// Download offset outside the object
    #[error("invalid offset")]
    InvalidOffset,

    /// Declared digest or stored tag did not verify
    #[error("integrity check failed")]
    IntegrityError,

    /// Identity found on the ban list
    #[error("client banned")]
    Banned(String),

    /// No read progress within the inactivity window
    #[error("idle timeout")]
    IdleTimeout,

    /// Repeated records in a state that does not accept them
    #[error("repeated protocol misuse")]
    Misuse,

    /// On-disk object disagrees with its metadata document
    #[error("storage inconsistent with metadata")]
    Inconsistent,
}

impl ServerError {
    /// The status to report to the peer, if any, and whether the connection
    /// closes afterwards.
    #[must_use]
    pub fn disposition(&self) -> (Option<Status>, bool) {
        match self {
            // EOF and timeouts get no response; the stream is already gone
            // or silence is the contract.
            Self::Wire(_) => (None, true),
            Self::IdleTimeout | Self::Misuse => (None, true),

            Self::Session(SessionError::InvalidKey) => (Some(Status::InvalidKey), true),
            Self::Session(_) => (Some(Status::AuthFailed), true),

            Self::Store(StoreError::DuplicateKey(_)) => (Some(Status::PermissionDenied), false),
            Self::Store(_) => (Some(Status::Error), true),

            Self::Crypto(_) | Self::Io(_) | Self::Inconsistent => (Some(Status::Error), true),

            Self::PermissionDenied => (Some(Status::PermissionDenied), false),
            Self::FileNotFound => (Some(Status::FileNotFound), false),
            Self::InvalidOffset => (Some(Status::InvalidOffset), false),
            Self::IntegrityError => (Some(Status::IntegrityError), false),

            // The Banned response (with reason bytes) is written where the
            // ban is detected; the mapping only records the close.
            Self::Banned(_) => (None, true),
        }
    }

    /// Error kind label for log correlation
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Wire(WireError::TransportClosed) => "transport_closed",
            Self::Wire(_) => "wire",
            Self::Session(SessionError::InvalidKey) => "invalid_key",
            Self::Session(_) => "auth_failed",
            Self::Store(_) => "store",
            Self::Crypto(_) => "crypto",
            Self::Io(_) => "io",
            Self::PermissionDenied => "permission_denied",
            Self::FileNotFound => "file_not_found",
            Self::InvalidOffset => "invalid_offset",
            Self::IntegrityError => "integrity_error",
            Self::Banned(_) => "banned",
            Self::IdleTimeout => "idle_timeout",
            Self::Misuse => "misuse",
            Self::Inconsistent => "inconsistent",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keepalive_dispositions() {
        for err in [
            ServerError::PermissionDenied,
            ServerError::FileNotFound,
            ServerError::InvalidOffset,
            ServerError::IntegrityError,
        ] {
            let (status, close) = err.disposition();
            assert!(status.is_some());
            assert!(!close, "{err} should keep the connection");
        }
    }

    #[test]
    fn test_fatal_dispositions() {
        let (status, close) = ServerError::Session(SessionError::AuthFailed).disposition();
        assert_eq!(status, Some(Status::AuthFailed));
        assert!(close);

        let (status, close) = ServerError::Wire(WireError::TransportClosed).disposition();
        assert_eq!(status, None);
        assert!(close);
    }

    #[test]
    fn test_duplicate_key_is_permission_denied() {
        let err = ServerError::Store(StoreError::DuplicateKey("a.txt".into()));
        assert_eq!(err.disposition(), (Some(Status::PermissionDenied), false));
    }
}
