//! # SKIFF Server
//!
//! The exchange server: accepts mutually-authenticated TLS connections,
//! drives the per-connection protocol state machine, and serves the upload,
//! download and list planes against encrypted-at-rest storage.
//!
//! ## Architecture
//!
//! ```text
//! TcpListener -> admission (per-IP cap) -> TLS accept (client cert required)
//!     -> Connection task: KxInit/KxResponse/SessionKey handshake
//!         -> ban check -> command loop (rate limited)
//!             -> upload | download | list | ping | connect gate | disconnect
//! ```
//!
//! One tokio task per connection; the task is the sole reader and writer of
//! its stream, so responses leave in the order commands arrived. Shared
//! state (connection table, rate windows, ban set, approval gate) lives in
//! concurrent maps inside [`ServerContext`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod admin;
pub mod admission;
pub mod config;
pub mod connection;
mod download;
pub mod error;
pub mod server;
pub mod storage;
pub mod transport;
mod upload;

pub use config::ServerConfig;
pub use error::ServerError;
pub use server::{Server, ServerContext};

/// Current wall-clock time as milliseconds since the epoch
#[must_use]
pub(crate) fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
