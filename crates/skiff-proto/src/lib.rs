//! # SKIFF Protocol
//!
//! Wire protocol for the SKIFF exchange: fixed-layout record framing, the
//! per-connection session context (key agreement, metadata sealing, replay
//! protection), and streaming integrity verification.
//!
//! All multi-byte integers on the wire are big-endian. Record layouts are
//! frozen; see the `records` module for the exact byte maps.
//!
//! The record sequence per connection is strictly:
//!
//! ```text
//! Client                          Server
//!   |-------- KxInit ------------->|
//!   |<------- KxResponse ----------|
//!   |-------- SessionKey --------->|
//!   |<------- Response(Success) ---|
//!   |                              |
//!   |-- Command / Response pairs --|   (bulk payloads length-announced)
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod command;
pub mod error;
pub mod framing;
pub mod integrity;
pub mod records;
pub mod session;

pub use command::{Command, Status};
pub use error::{SessionError, WireError};

/// Maximum filename length in bytes
pub const FILENAME_MAX: usize = 256;

/// Fingerprint length: lowercase hex SHA-256 of a leaf certificate
pub const FINGERPRINT_LEN: usize = 64;

/// Default server port
pub const DEFAULT_PORT: u16 = 1512;

/// Maximum object size accepted for upload (1 GiB)
pub const MAX_FILE_SIZE: i64 = 1024 * 1024 * 1024;

/// Transfer chunk size; bounds per-connection buffer usage on the wire
pub const CHUNK_SIZE: usize = 4096;

/// Per-direction replay window depth (distinct nonces remembered)
pub const REPLAY_WINDOW: usize = 1024;

/// Derivation label for the per-connection session key
pub const SESSION_KEY_LABEL: &str = "session-key/v1";

/// Command flag bit: requested public visibility
pub const FLAG_PUBLIC: u8 = 0b0000_0001;

/// Command flag bit: anonymous routing requested (informational)
pub const FLAG_ANONYMOUS: u8 = 0b0000_0010;
