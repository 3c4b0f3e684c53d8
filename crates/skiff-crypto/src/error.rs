//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors from the crypto facade
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD encryption failed
    #[error("encryption failed")]
    EncryptionFailed,

    /// AEAD decryption or tag verification failed
    #[error("decryption failed")]
    DecryptionFailed,

    /// Key exchange produced an invalid shared secret
    #[error("invalid peer key")]
    InvalidKey,

    /// The OS CSPRNG was unavailable
    #[error("random generation failed")]
    RandomFailed,
}
