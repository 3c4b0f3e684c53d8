//! Store adapter errors.

use thiserror::Error;

/// Errors surfaced by a [`crate::DocumentStore`] backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// Insert collided with an existing non-deleted document
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Backend failure (connection, serialization, corruption)
    #[error("store backend error: {0}")]
    Backend(String),
}
