//! Command and status tags.
//!
//! Dispatch is a tagged-variant match on [`Command`]; unknown tags stay raw
//! so the server can answer `UnknownCommand` without guessing.

use crate::WireError;

/// Client commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Command {
    /// Upload an object
    Upload = 0,
    /// Download an object
    Download = 1,
    /// List visible objects
    List = 2,
    /// Enter the administrator approval gate
    Connect = 99,
    /// Keep-alive
    Ping = 105,
    /// Graceful disconnect
    Disconnect = 106,
}

impl Command {
    /// Wire tag for this command
    #[must_use]
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Parse a wire tag; `None` for unknown tags
    #[must_use]
    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            0 => Some(Self::Upload),
            1 => Some(Self::Download),
            2 => Some(Self::List),
            99 => Some(Self::Connect),
            105 => Some(Self::Ping),
            106 => Some(Self::Disconnect),
            _ => None,
        }
    }
}

/// Response statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum Status {
    /// Operation accepted / completed
    Success = 0,
    /// Generic refusal
    Failure = 1,
    /// Download miss
    FileNotFound = 2,
    /// ACL, name validation or duplicate-name refusal
    PermissionDenied = 3,
    /// Internal, store, or filesystem error
    Error = 4,
    /// Download offset outside the object
    InvalidOffset = 5,
    /// Digest mismatch or AEAD tag failure
    IntegrityError = 6,
    /// Unrecognised command tag
    UnknownCommand = 7,
    /// Sliding-window rate limit hit
    RateLimited = 50,
    /// Too many connections from one remote
    ConnectionLimit = 51,
    /// Key exchange rejected
    InvalidKey = 52,
    /// AEAD open failure or replayed nonce
    AuthFailed = 53,
    /// Approval gate: still pending
    WaitingApproval = 100,
    /// Approval gate: administrator approved
    Approved = 101,
    /// Approval gate: administrator rejected
    Rejected = 102,
    /// Identity is on the ban list
    Banned = 103,
}

impl Status {
    /// Wire tag for this status
    #[must_use]
    pub fn tag(self) -> u32 {
        self as u32
    }

    /// Parse a wire tag
    pub fn from_tag(tag: u32) -> Result<Self, WireError> {
        match tag {
            0 => Ok(Self::Success),
            1 => Ok(Self::Failure),
            2 => Ok(Self::FileNotFound),
            3 => Ok(Self::PermissionDenied),
            4 => Ok(Self::Error),
            5 => Ok(Self::InvalidOffset),
            6 => Ok(Self::IntegrityError),
            7 => Ok(Self::UnknownCommand),
            50 => Ok(Self::RateLimited),
            51 => Ok(Self::ConnectionLimit),
            52 => Ok(Self::InvalidKey),
            53 => Ok(Self::AuthFailed),
            100 => Ok(Self::WaitingApproval),
            101 => Ok(Self::Approved),
            102 => Ok(Self::Rejected),
            103 => Ok(Self::Banned),
            other => Err(WireError::InvalidStatus(other)),
        }
    }
}
